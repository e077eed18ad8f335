//! BLE adapter error types.
//!
//! The taxonomy mirrors how failures are handled: crypto and protocol
//! errors point at configuration or firmware mismatch, link and timeout
//! errors are transient radio conditions retried next interval, and auth
//! errors are surfaced distinctly because they mean a wrong PIN, not a bad
//! radio day.

use ecotrv_app::ports::LinkError;

/// Failure inside the XXTEA codec.
///
/// Key length cannot fail here — `SecretKey` guarantees 16 bytes at
/// construction — so only payload geometry remains.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Payload length is not a multiple of the 4-byte word size.
    #[error("payload length {actual} is not a multiple of 4")]
    NotBlockAligned {
        /// Actual payload length.
        actual: usize,
    },

    /// XXTEA needs at least two 32-bit words.
    #[error("payload must be at least 8 bytes, got {actual}")]
    TooShort {
        /// Actual payload length.
        actual: usize,
    },
}

/// Failure decoding or encoding a protocol frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A frame had the wrong size for its characteristic.
    #[error("{frame} frame must be {expected} bytes, got {actual}")]
    WrongLength {
        /// Frame name (e.g. `"temperature"`).
        frame: &'static str,
        /// Expected byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },

    /// The settings frame carried a mode byte the firmware never emits.
    #[error("unknown device mode byte {0:#04x}")]
    UnknownMode(u8),

    /// A field value was outside its documented domain.
    #[error("battery level {0} out of range (0-100)")]
    BatteryOutOfRange(u8),
}

/// Failure of one poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The identity has no secret key; encrypted characteristics cannot be
    /// read. Configuration-level defect, not a radio condition.
    #[error("no secret key configured for this device")]
    MissingSecretKey,

    /// The BLE link failed (connect, read, write, or peripheral lookup).
    #[error("link failure")]
    Link(#[from] LinkError),

    /// The device rejected the PIN handshake. Distinct from [`Link`](Self::Link)
    /// and [`Timeout`](Self::Timeout): this points at a wrong PIN in the
    /// configuration, not a transient radio issue.
    #[error("authentication rejected by device")]
    Auth(#[source] LinkError),

    /// The cycle deadline was exceeded; the in-flight operation was
    /// cancelled.
    #[error("cycle deadline exceeded")]
    Timeout,

    /// A response frame could not be decoded.
    #[error("protocol violation")]
    Protocol(#[from] ProtocolError),

    /// Encryption or decryption failed.
    #[error("crypto failure")]
    Crypto(#[from] CryptoError),
}

impl SessionError {
    /// Whether this failure indicates a configuration problem that will not
    /// heal by itself (wrong PIN, missing key).
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::MissingSecretKey)
    }
}

/// Failure of the passive scan loop.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// BLE scan or adapter operation failed.
    #[error("BLE scan error")]
    Scan(#[from] btleplug::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_crypto_alignment_error() {
        let err = CryptoError::NotBlockAligned { actual: 7 };
        assert_eq!(err.to_string(), "payload length 7 is not a multiple of 4");
    }

    #[test]
    fn should_display_protocol_length_error() {
        let err = ProtocolError::WrongLength {
            frame: "temperature",
            expected: 8,
            actual: 3,
        };
        assert_eq!(err.to_string(), "temperature frame must be 8 bytes, got 3");
    }

    #[test]
    fn should_display_unknown_mode_in_hex() {
        assert_eq!(
            ProtocolError::UnknownMode(0x0a).to_string(),
            "unknown device mode byte 0x0a"
        );
    }

    #[test]
    fn should_classify_auth_as_configuration_error() {
        let err = SessionError::Auth(LinkError::Write("nack".into()));
        assert!(err.is_configuration());
        assert!(!SessionError::Timeout.is_configuration());
    }

    #[test]
    fn should_convert_protocol_error_into_session_error() {
        let err: SessionError = ProtocolError::UnknownMode(9).into();
        assert!(matches!(err, SessionError::Protocol(_)));
    }

    #[test]
    fn should_keep_auth_distinct_from_timeout() {
        let auth = SessionError::Auth(LinkError::Write("nack".into()));
        assert!(matches!(auth, SessionError::Auth(_)));
        assert!(!matches!(auth, SessionError::Timeout));
    }
}
