//! Line checksumming.
//!
//! The sum is accumulated into a u32 and reduced mod 65536 before it is
//! rendered, so long position batches cannot overflow the field. The
//! summed portion runs through the tab that separates the payload from
//! the `CS` token.

use crate::error::ControllerError;

/// Token that introduces the checksum field.
const CS_MARKER: &str = "\tCS ";

/// Byte sum of `payload` reduced mod 2¹⁶.
pub fn checksum(payload: &str) -> u16 {
    payload.bytes().fold(0u32, |acc, b| acc + b as u32) as u16
}

/// Render `payload` with its trailing checksum field appended.
///
/// The tab before `CS` is part of the summed portion.
pub fn with_checksum(payload: &str) -> String {
    let sum = checksum(&format!("{payload}\t"));
    format!("{payload}{CS_MARKER}{sum}")
}

/// Validate a received line and strip the checksum field.
///
/// Returns the payload (everything before the `\tCS` tab) on success.
/// A missing field, an unparsable value, or a sum mismatch all come
/// back as `InvalidData`; the caller drops the line and bumps the
/// relevant counter.
pub fn strip_and_verify(line: &str) -> Result<&str, ControllerError> {
    let at = line
        .rfind(CS_MARKER)
        .ok_or_else(|| ControllerError::InvalidData(format!("no checksum field: {line:?}")))?;

    let expected: u16 = line[at + CS_MARKER.len()..]
        .trim_end()
        .parse()
        .map_err(|_| ControllerError::InvalidData(format!("bad checksum field: {line:?}")))?;

    // Sum everything up to and including the tab before "CS".
    let calculated = checksum(&line[..at + 1]);
    if calculated != expected {
        return Err(ControllerError::InvalidData(format!(
            "checksum mismatch: {expected} != {calculated}"
        )));
    }

    Ok(&line[..at])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_is_plain_byte_addition() {
        // 'A' = 65, 'B' = 66
        assert_eq!(checksum("AB"), 131);
        assert_eq!(checksum(""), 0);
    }

    #[test]
    fn sum_wraps_at_sixteen_bits() {
        // 540 'z' bytes sum to 65880, just past the 16-bit boundary.
        let long = "z".repeat(540);
        assert_eq!(checksum(&long), (540u32 * 122 % 65536) as u16);
    }

    #[test]
    fn roundtrip() {
        let line = with_checksum("POS\tA0 1500");
        assert_eq!(strip_and_verify(&line).unwrap(), "POS\tA0 1500");
    }

    #[test]
    fn tab_before_cs_is_summed() {
        // Manually build the expected wire form and compare.
        let payload = "PING 12345";
        let sum = checksum("PING 12345\t");
        assert_eq!(with_checksum(payload), format!("PING 12345\tCS {sum}"));
    }

    #[test]
    fn wrong_sum_is_rejected() {
        assert!(strip_and_verify("POS\tA0 1500\tCS 12345").is_err());
    }

    #[test]
    fn missing_field_is_rejected() {
        assert!(strip_and_verify("POS\tA0 1500").is_err());
        assert!(strip_and_verify("").is_err());
    }

    #[test]
    fn garbage_value_is_rejected() {
        assert!(strip_and_verify("PING 1\tCS banana").is_err());
    }

    #[test]
    fn trailing_newline_is_tolerated() {
        let line = format!("{}\n", with_checksum("PING 7"));
        assert_eq!(strip_and_verify(&line).unwrap(), "PING 7");
    }
}
