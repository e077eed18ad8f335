//! Protocol frame encode/decode and the eTRV GATT attribute map.
//!
//! All functions here operate on **plaintext** buffers — the session
//! decrypts before decoding and encrypts after encoding. Layouts are a
//! fixed firmware contract recovered from the device:
//!
//! | Characteristic | Payload |
//! |---|---|
//! | PIN | 4 bytes plaintext, numeric PIN as u32 BE |
//! | Temperature | 8 bytes: byte 0 target ×2, byte 1 room ×2 |
//! | Settings | 16 bytes: flags, min, max, frost, mode, vacation block |
//! | Errors | 16 bytes: u16 BE fault mask at offset 0 |
//! | Battery | 1 byte plaintext percent (standard `0x2A19`) |

use chrono::{DateTime, Utc};
use uuid::Uuid;

use ecotrv_domain::identity::PinCode;
use ecotrv_domain::state::{DeviceMode, ProblemFlags, Settings, Temperature};

use crate::error::ProtocolError;

/// Vendor settings service.
pub const SERVICE_SETTINGS: Uuid = Uuid::from_u128(0x1002_0000_2749_0001_0000_0080_5F9B_042F);
/// PIN handshake characteristic (write, plaintext).
pub const CHAR_PIN: Uuid = Uuid::from_u128(0x1002_0001_2749_0001_0000_0080_5F9B_042F);
/// Settings characteristic (read/write, encrypted, 16 bytes).
pub const CHAR_SETTINGS: Uuid = Uuid::from_u128(0x1002_0003_2749_0001_0000_0080_5F9B_042F);
/// Temperature characteristic (read/write, encrypted, 8 bytes).
pub const CHAR_TEMPERATURE: Uuid = Uuid::from_u128(0x1002_0005_2749_0001_0000_0080_5F9B_042F);
/// Device name characteristic (read/write, encrypted).
pub const CHAR_NAME: Uuid = Uuid::from_u128(0x1002_0006_2749_0001_0000_0080_5F9B_042F);
/// Errors characteristic (read, encrypted, 16 bytes).
pub const CHAR_ERRORS: Uuid = Uuid::from_u128(0x1002_0009_2749_0001_0000_0080_5F9B_042F);
/// Secret key characteristic (readable only after the hardware button).
pub const CHAR_SECRET: Uuid = Uuid::from_u128(0x1002_000B_2749_0001_0000_0080_5F9B_042F);

/// Standard battery service.
pub const SERVICE_BATTERY: Uuid = Uuid::from_u128(0x0000_180F_0000_1000_8000_0080_5F9B_34FB);
/// Standard battery level characteristic (read, plaintext, 1 byte).
pub const CHAR_BATTERY: Uuid = Uuid::from_u128(0x0000_2A19_0000_1000_8000_0080_5F9B_34FB);

const TEMPERATURE_LEN: usize = 8;
const SETTINGS_LEN: usize = 16;
const ERRORS_LEN: usize = 16;
const BATTERY_LEN: usize = 1;

/// Target and room temperature as carried by the temperature frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Temperatures {
    /// Set-point temperature.
    pub target: Temperature,
    /// Measured room temperature.
    pub room: Temperature,
}

/// Decode an 8-byte temperature frame.
///
/// # Errors
///
/// Returns [`ProtocolError::WrongLength`] when the slice is not 8 bytes.
pub fn decode_temperatures(frame: &[u8]) -> Result<Temperatures, ProtocolError> {
    check_len(frame, TEMPERATURE_LEN, "temperature")?;
    Ok(Temperatures {
        target: Temperature::from_half_degrees(frame[0]),
        room: Temperature::from_half_degrees(frame[1]),
    })
}

/// Encode an 8-byte temperature frame. The device only honours the target
/// byte on write; the room byte echoes the last reading.
#[must_use]
pub fn encode_temperatures(temperatures: Temperatures) -> [u8; TEMPERATURE_LEN] {
    let mut frame = [0u8; TEMPERATURE_LEN];
    frame[0] = temperatures.target.half_degrees();
    frame[1] = temperatures.room.half_degrees();
    frame
}

/// Decode a 16-byte settings frame.
///
/// # Errors
///
/// Returns [`ProtocolError::WrongLength`] on a short frame and
/// [`ProtocolError::UnknownMode`] when byte 4 is not a known mode.
pub fn decode_settings(frame: &[u8]) -> Result<Settings, ProtocolError> {
    check_len(frame, SETTINGS_LEN, "settings")?;
    let mode = DeviceMode::from_byte(frame[4]).ok_or(ProtocolError::UnknownMode(frame[4]))?;
    Ok(Settings {
        feature_flags: frame[0],
        temperature_min: Temperature::from_half_degrees(frame[1]),
        temperature_max: Temperature::from_half_degrees(frame[2]),
        frost_protection: Temperature::from_half_degrees(frame[3]),
        mode,
        vacation_temperature: Temperature::from_half_degrees(frame[5]),
        vacation_from: decode_timestamp(&frame[6..10]),
        vacation_to: decode_timestamp(&frame[10..14]),
    })
}

/// Encode a 16-byte settings frame (inverse of [`decode_settings`]).
#[must_use]
pub fn encode_settings(settings: &Settings) -> [u8; SETTINGS_LEN] {
    let mut frame = [0u8; SETTINGS_LEN];
    frame[0] = settings.feature_flags;
    frame[1] = settings.temperature_min.half_degrees();
    frame[2] = settings.temperature_max.half_degrees();
    frame[3] = settings.frost_protection.half_degrees();
    frame[4] = settings.mode.as_byte();
    frame[5] = settings.vacation_temperature.half_degrees();
    frame[6..10].copy_from_slice(&encode_timestamp(settings.vacation_from));
    frame[10..14].copy_from_slice(&encode_timestamp(settings.vacation_to));
    frame
}

/// Decode a 16-byte errors frame into fault flags.
///
/// # Errors
///
/// Returns [`ProtocolError::WrongLength`] when the slice is not 16 bytes.
pub fn decode_problems(frame: &[u8]) -> Result<ProblemFlags, ProtocolError> {
    check_len(frame, ERRORS_LEN, "errors")?;
    Ok(ProblemFlags::from_bits(u16::from_be_bytes([
        frame[0], frame[1],
    ])))
}

/// Decode the 1-byte battery level.
///
/// # Errors
///
/// Returns [`ProtocolError::WrongLength`] on a wrong-sized frame and
/// [`ProtocolError::BatteryOutOfRange`] above 100 %.
pub fn decode_battery(frame: &[u8]) -> Result<u8, ProtocolError> {
    check_len(frame, BATTERY_LEN, "battery")?;
    let level = frame[0];
    if level > 100 {
        return Err(ProtocolError::BatteryOutOfRange(level));
    }
    Ok(level)
}

/// Encode the plaintext PIN handshake frame: the numeric PIN, zero-padded,
/// as a big-endian u32.
#[must_use]
pub fn encode_pin(pin: PinCode) -> [u8; 4] {
    u32::from(pin.value()).to_be_bytes()
}

fn check_len(frame: &[u8], expected: usize, name: &'static str) -> Result<(), ProtocolError> {
    if frame.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::WrongLength {
            frame: name,
            expected,
            actual: frame.len(),
        })
    }
}

/// Vacation timestamps are i32 BE unix seconds; zero means "not planned".
fn decode_timestamp(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let raw = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if raw == 0 {
        return None;
    }
    DateTime::from_timestamp(i64::from(raw), 0)
}

fn encode_timestamp(timestamp: Option<DateTime<Utc>>) -> [u8; 4] {
    let raw = timestamp
        .map(|ts| ts.timestamp())
        .and_then(|secs| i32::try_from(secs).ok())
        .unwrap_or(0);
    raw.to_be_bytes()
}
