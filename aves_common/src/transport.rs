//! Byte transports between the controller and a servo module.
//!
//! The link layer wants two independently-owned halves so its reader
//! and writer can live on separate threads. A transport is therefore a
//! pair of boxed `Read`/`Write` handles over the same underlying
//! descriptor: a serial device put into raw mode, or one end of a
//! socketpair for tests and the simulated module.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use nix::sys::termios::{self, BaudRate, ControlFlags, SetArg};
use tracing::debug;

use crate::error::ControllerError;

/// Reader half of a transport.
pub type TransportReader = Box<dyn Read + Send>;

/// Writer half of a transport.
pub type TransportWriter = Box<dyn Write + Send>;

/// A connected byte transport, ready to be split across threads.
pub struct Transport {
    reader: TransportReader,
    writer: TransportWriter,
    description: String,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("description", &self.description)
            .finish()
    }
}

/// Something that can (re-)establish a transport. The link's reconnect
/// supervisor calls this once per second after a drop.
pub type TransportFactory = Box<dyn Fn() -> Result<Transport, ControllerError> + Send>;

impl Transport {
    /// Open a serial device in raw mode at 115200 baud.
    pub fn serial(device: &Path) -> Result<Self, ControllerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|e| {
                ControllerError::TransportError(format!("open {}: {e}", device.display()))
            })?;

        configure_raw(&file)
            .map_err(|e| ControllerError::TransportError(format!("termios setup: {e}")))?;

        let write_half = file.try_clone().map_err(|e| {
            ControllerError::TransportError(format!("clone serial handle: {e}"))
        })?;

        debug!("opened serial device {} at 115200 8N1 raw", device.display());

        Ok(Self {
            reader: Box::new(file),
            writer: Box::new(write_half),
            description: device.display().to_string(),
        })
    }

    /// Connected socketpair, one transport per end. Used by the tests
    /// and by the firmware simulator.
    pub fn pair() -> Result<(Self, Self), ControllerError> {
        let (a, b) = UnixStream::pair()
            .map_err(|e| ControllerError::TransportError(format!("socketpair: {e}")))?;
        Ok((Self::from_stream(a, "pair-a")?, Self::from_stream(b, "pair-b")?))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: UnixStream, description: &str) -> Result<Self, ControllerError> {
        let write_half = stream.try_clone().map_err(|e| {
            ControllerError::TransportError(format!("clone stream handle: {e}"))
        })?;
        Ok(Self {
            reader: Box::new(stream),
            writer: Box::new(write_half),
            description: description.to_string(),
        })
    }

    /// Human-readable name for logs.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Split into independently-owned halves.
    pub fn split(self) -> (TransportReader, TransportWriter) {
        (self.reader, self.writer)
    }
}

fn configure_raw(file: &File) -> nix::Result<()> {
    let mut tio = termios::tcgetattr(file)?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetspeed(&mut tio, BaudRate::B115200)?;
    // Ignore modem control lines, keep the receiver enabled.
    tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    termios::tcsetattr(file, SetArg::TCSANOW, &tio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    #[test]
    fn pair_carries_lines_both_ways() {
        let (a, b) = Transport::pair().unwrap();
        let (a_read, mut a_write) = a.split();
        let (b_read, mut b_write) = b.split();

        a_write.write_all(b"PING 1\n").unwrap();
        let mut line = String::new();
        BufReader::new(b_read).read_line(&mut line).unwrap();
        assert_eq!(line, "PING 1\n");

        b_write.write_all(b"PONG 1\n").unwrap();
        let mut line = String::new();
        BufReader::new(a_read).read_line(&mut line).unwrap();
        assert_eq!(line, "PONG 1\n");
    }

    #[test]
    fn missing_serial_device_is_transport_error() {
        let err = Transport::serial(Path::new("/dev/does-not-exist-aves")).unwrap_err();
        assert!(matches!(err, ControllerError::TransportError(_)));
    }
}
