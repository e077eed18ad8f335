//! Domain validation errors.
//!
//! These surface at configuration time only — a malformed address, key, or
//! PIN is a startup-fatal misconfiguration, never a runtime condition.

/// Failure to construct one of the identity value types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    /// BLE address was not six colon-separated hex octets.
    #[error("invalid BLE address, expected `AA:BB:CC:DD:EE:FF`")]
    Address,

    /// Secret key was not exactly 32 hex characters (16 bytes).
    #[error("secret key must be 32 hex characters, got {actual}")]
    SecretKeyLength {
        /// Number of hex characters received.
        actual: usize,
    },

    /// Secret key contained a non-hex character.
    #[error("secret key contains a non-hex character")]
    SecretKeyDigit,

    /// PIN code was not exactly four ASCII digits.
    #[error("PIN code must be exactly 4 ASCII digits")]
    Pin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_address_error() {
        assert_eq!(
            IdentityError::Address.to_string(),
            "invalid BLE address, expected `AA:BB:CC:DD:EE:FF`"
        );
    }

    #[test]
    fn should_display_key_length_error_with_actual() {
        let err = IdentityError::SecretKeyLength { actual: 30 };
        assert_eq!(err.to_string(), "secret key must be 32 hex characters, got 30");
    }

    #[test]
    fn should_display_pin_error() {
        assert_eq!(
            IdentityError::Pin.to_string(),
            "PIN code must be exactly 4 ASCII digits"
        );
    }
}
