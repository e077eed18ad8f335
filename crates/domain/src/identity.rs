//! Device identity value types — BLE address, secret key, PIN code.
//!
//! All three enforce their invariants at construction so the rest of the
//! system never sees a malformed address, a key that is not 16 bytes, or a
//! PIN that is not four digits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// A 48-bit BLE device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BleAddress([u8; 6]);

impl BleAddress {
    /// Wrap raw address octets (most significant first).
    #[must_use]
    pub fn from_octets(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Access the raw address octets.
    #[must_use]
    pub fn octets(self) -> [u8; 6] {
        self.0
    }

    /// Lowercase hex slug without separators (e.g. `"001b638f2a01"`),
    /// suitable for entity identifiers.
    #[must_use]
    pub fn slug(self) -> String {
        format!(
            "{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for BleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for BleAddress {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or(IdentityError::Address)?;
            if part.len() != 2 {
                return Err(IdentityError::Address);
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| IdentityError::Address)?;
        }
        if parts.next().is_some() {
            return Err(IdentityError::Address);
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for BleAddress {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BleAddress> for String {
    fn from(value: BleAddress) -> Self {
        value.to_string()
    }
}

/// The 16-byte XXTEA secret key protecting encrypted characteristics.
///
/// The `Debug` impl redacts the key material; use [`SecretKey::to_hex`]
/// when the operator explicitly asks for it (e.g. the scanner's
/// "add this to your config" hint).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecretKey([u8; 16]);

impl SecretKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse a 32-character hex string as distributed by the vendor app.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::SecretKeyLength`] or
    /// [`IdentityError::SecretKeyDigit`] on malformed input.
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        if s.len() != 32 {
            return Err(IdentityError::SecretKeyLength { actual: s.len() });
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| IdentityError::SecretKeyDigit)?;
        }
        Ok(Self(bytes))
    }

    /// Access the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex rendering of the key.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(****)")
    }
}

impl FromStr for SecretKey {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// A four-digit numeric PIN code (`0000`–`9999`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinCode(u16);

impl PinCode {
    /// Numeric value of the PIN.
    #[must_use]
    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for PinCode {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdentityError::Pin);
        }
        // Four ASCII digits always fit in u16.
        s.parse().map(Self).map_err(|_| IdentityError::Pin)
    }
}

/// Everything needed to talk to one physical thermostat.
///
/// Owned by the configuring entity, one per device, alive for the process
/// lifetime. The secret key is optional only for scanner-only setups; the
/// configuration layer rejects polled devices without one.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// BLE address of the peripheral.
    pub address: BleAddress,
    /// XXTEA key for encrypted characteristics.
    pub secret_key: Option<SecretKey>,
    /// PIN for the authentication handshake, when the device mandates one.
    pub pin: Option<PinCode>,
}

impl DeviceIdentity {
    /// Build an identity for a polled device.
    #[must_use]
    pub fn new(address: BleAddress, secret_key: Option<SecretKey>, pin: Option<PinCode>) -> Self {
        Self {
            address,
            secret_key,
            pin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── BleAddress ──────────────────────────────────────────────────────

    #[test]
    fn should_parse_uppercase_address() {
        let addr: BleAddress = "00:1B:63:8F:2A:01".parse().unwrap();
        assert_eq!(addr.octets(), [0x00, 0x1B, 0x63, 0x8F, 0x2A, 0x01]);
    }

    #[test]
    fn should_parse_lowercase_address() {
        let addr: BleAddress = "a4:c1:38:5b:0e:df".parse().unwrap();
        assert_eq!(addr.octets(), [0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]);
    }

    #[test]
    fn should_display_address_uppercase_with_colons() {
        let addr = BleAddress::from_octets([0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]);
        assert_eq!(addr.to_string(), "A4:C1:38:5B:0E:DF");
    }

    #[test]
    fn should_format_address_slug() {
        let addr = BleAddress::from_octets([0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]);
        assert_eq!(addr.slug(), "a4c1385b0edf");
    }

    #[test]
    fn should_reject_address_with_too_few_octets() {
        assert_eq!(
            "00:1B:63:8F:2A".parse::<BleAddress>(),
            Err(IdentityError::Address)
        );
    }

    #[test]
    fn should_reject_address_with_too_many_octets() {
        assert_eq!(
            "00:1B:63:8F:2A:01:02".parse::<BleAddress>(),
            Err(IdentityError::Address)
        );
    }

    #[test]
    fn should_reject_address_with_non_hex_octet() {
        assert_eq!(
            "00:1B:63:8F:2A:ZZ".parse::<BleAddress>(),
            Err(IdentityError::Address)
        );
    }

    #[test]
    fn should_reject_address_with_wide_octet() {
        assert_eq!(
            "001:B6:38:F2:A0:1".parse::<BleAddress>(),
            Err(IdentityError::Address)
        );
    }

    #[test]
    fn should_roundtrip_address_through_serde() {
        let addr = BleAddress::from_octets([0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"A4:C1:38:5B:0E:DF\"");
        let parsed: BleAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, addr);
    }

    // ── SecretKey ───────────────────────────────────────────────────────

    #[test]
    fn should_parse_32_hex_chars() {
        let key = SecretKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(key.as_bytes()[0], 0x00);
        assert_eq!(key.as_bytes()[15], 0x0F);
    }

    #[test]
    fn should_parse_mixed_case_hex() {
        let key = SecretKey::from_hex("DEADbeefDEADbeefDEADbeefDEADbeef").unwrap();
        assert_eq!(key.as_bytes()[0], 0xDE);
    }

    #[test]
    fn should_reject_short_key() {
        assert_eq!(
            SecretKey::from_hex("0011"),
            Err(IdentityError::SecretKeyLength { actual: 4 })
        );
    }

    #[test]
    fn should_reject_non_hex_key() {
        assert_eq!(
            SecretKey::from_hex("zz0102030405060708090a0b0c0d0e0f"),
            Err(IdentityError::SecretKeyDigit)
        );
    }

    #[test]
    fn should_roundtrip_key_hex() {
        let hex = "0123456789abcdef0123456789abcdef";
        let key = SecretKey::from_hex(hex).unwrap();
        assert_eq!(key.to_hex(), hex);
    }

    #[test]
    fn should_redact_key_in_debug() {
        let key = SecretKey::from_hex("0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(format!("{key:?}"), "SecretKey(****)");
    }

    // ── PinCode ─────────────────────────────────────────────────────────

    #[test]
    fn should_parse_four_digit_pin() {
        let pin: PinCode = "1234".parse().unwrap();
        assert_eq!(pin.value(), 1234);
    }

    #[test]
    fn should_keep_leading_zeros_in_display() {
        let pin: PinCode = "0042".parse().unwrap();
        assert_eq!(pin.value(), 42);
        assert_eq!(pin.to_string(), "0042");
    }

    #[test]
    fn should_reject_short_pin() {
        assert_eq!("123".parse::<PinCode>(), Err(IdentityError::Pin));
    }

    #[test]
    fn should_reject_long_pin() {
        assert_eq!("12345".parse::<PinCode>(), Err(IdentityError::Pin));
    }

    #[test]
    fn should_reject_non_numeric_pin() {
        assert_eq!("12a4".parse::<PinCode>(), Err(IdentityError::Pin));
    }

    #[test]
    fn should_reject_non_ascii_digit_pin() {
        assert_eq!("١٢٣٤".parse::<PinCode>(), Err(IdentityError::Pin));
    }
}
