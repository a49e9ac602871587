//! The workspace error type.
//!
//! Five kinds with a hard split in handling: configuration and safety
//! errors surface to the operator and are fatal; data and transport
//! errors are recovered where they occur (drop the datum, bump a
//! counter, keep going) and never cross the link boundary.

/// Error carried by every fallible operation in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    /// Structural or semantic problem in creature/controller
    /// configuration. Fatal at startup, never recovered automatically.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A runtime input violated a contract (position out of range,
    /// checksum mismatch, malformed message). Recovered locally.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A logic invariant broke. On the firmware this drops the safety
    /// gate pending reinitialization.
    #[error("internal error: {0}")]
    InternalError(String),

    /// The physical link dropped. The link reconnects on its own.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A thermal or electrical threshold stayed exceeded past its grace
    /// period. Triggers ESTOP. Terminal.
    #[error("safety violation: {0}")]
    SafetyViolation(String),
}

impl ControllerError {
    /// Whether this error should take the process down.
    ///
    /// Only configuration and safety problems reach the operator;
    /// everything else is handled where it happens.
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_) | Self::SafetyViolation(_)
        )
    }
}

impl From<std::io::Error> for ControllerError {
    fn from(e: std::io::Error) -> Self {
        Self::TransportError(e.to_string())
    }
}
