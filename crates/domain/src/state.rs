//! Thermostat state model — temperatures, modes, problem flags, deltas.
//!
//! The device reports temperatures in half-degree steps; [`Temperature`]
//! keeps the raw fixed-point value so encode/decode round-trips are exact.

use chrono::{DateTime, Utc};

use crate::identity::SecretKey;

/// A temperature in half-degree Celsius fixed point, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Temperature(u8);

impl Temperature {
    /// Wrap a raw wire value (half degrees, e.g. `43` → 21.5 °C).
    #[must_use]
    pub fn from_half_degrees(raw: u8) -> Self {
        Self(raw)
    }

    /// Convert from degrees Celsius, rounding to the nearest half degree
    /// and clamping to the representable range (0–127.5 °C).
    #[must_use]
    pub fn from_celsius(value: f32) -> Self {
        let raw = (value * 2.0).round().clamp(0.0, 255.0);
        // Rounded and clamped to 0..=255 above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self(raw as u8)
    }

    /// Temperature in degrees Celsius (one-decimal precision).
    #[must_use]
    pub fn celsius(self) -> f32 {
        f32::from(self.0) / 2.0
    }

    /// Raw wire value.
    #[must_use]
    pub fn half_degrees(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.celsius())
    }
}

/// Operating mode reported by the settings characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// Constant target temperature.
    Manual,
    /// Following the programmed weekly schedule.
    Scheduled,
    /// Vacation setback, either active or planned with from/to dates.
    Vacation,
    /// Temporary hold of the scheduled temperature.
    Hold,
}

impl DeviceMode {
    /// Decode the wire byte; `None` for values the firmware never emits.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Manual),
            1 => Some(Self::Scheduled),
            3 => Some(Self::Vacation),
            5 => Some(Self::Hold),
            _ => None,
        }
    }

    /// Encode back to the wire byte.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Manual => 0,
            Self::Scheduled => 1,
            Self::Vacation => 3,
            Self::Hold => 5,
        }
    }
}

/// Active fault codes from the errors characteristic, kept as the raw
/// 16-bit mask so unknown bits survive a decode/encode cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProblemFlags(u16);

impl ProblemFlags {
    /// Wrap a raw error bitmask.
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw error bitmask.
    #[must_use]
    pub fn bits(self) -> u16 {
        self.0
    }

    /// E9 — the valve does not close.
    #[must_use]
    pub fn valve_does_not_close(self) -> bool {
        self.0 & (1 << 9) != 0
    }

    /// E10 — device clock is invalid.
    #[must_use]
    pub fn invalid_time(self) -> bool {
        self.0 & (1 << 10) != 0
    }

    /// E14 — battery is low.
    #[must_use]
    pub fn low_battery(self) -> bool {
        self.0 & (1 << 14) != 0
    }

    /// E15 — battery is critically low.
    #[must_use]
    pub fn very_low_battery(self) -> bool {
        self.0 & (1 << 15) != 0
    }

    /// Whether any known fault bit is set.
    #[must_use]
    pub fn any(self) -> bool {
        self.valve_does_not_close()
            || self.invalid_time()
            || self.low_battery()
            || self.very_low_battery()
    }

    /// Human-readable codes for the active faults.
    #[must_use]
    pub fn active_codes(self) -> Vec<&'static str> {
        let mut codes = Vec::new();
        if self.valve_does_not_close() {
            codes.push("E9_VALVE_DOES_NOT_CLOSE");
        }
        if self.invalid_time() {
            codes.push("E10_INVALID_TIME");
        }
        if self.low_battery() {
            codes.push("E14_LOW_BATTERY");
        }
        if self.very_low_battery() {
            codes.push("E15_VERY_LOW_BATTERY");
        }
        codes
    }
}

/// Settings block decoded from the settings characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    /// Feature bit flags (adaptable regulation, display flip, …), raw.
    pub feature_flags: u8,
    /// Lower bound of the adjustable range.
    pub temperature_min: Temperature,
    /// Upper bound of the adjustable range.
    pub temperature_max: Temperature,
    /// Frost-protection setback temperature.
    pub frost_protection: Temperature,
    /// Current operating mode.
    pub mode: DeviceMode,
    /// Vacation setback temperature.
    pub vacation_temperature: Temperature,
    /// Planned vacation start (UTC), when scheduled.
    pub vacation_from: Option<DateTime<Utc>>,
    /// Planned vacation end (UTC), when scheduled.
    pub vacation_to: Option<DateTime<Utc>>,
}

/// Current knowledge about one thermostat.
///
/// Mutated only through [`ThermostatState::apply`] — by the GATT session
/// after a successful read, or by the advertisement scanner on a decoded
/// broadcast. The presentation layer sees read-only snapshots. Last-known
/// sensor values are retained while the device is unavailable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThermostatState {
    /// Measured room temperature.
    pub room_temperature: Option<Temperature>,
    /// Set-point temperature.
    pub target_temperature: Option<Temperature>,
    /// Battery level, percent.
    pub battery_level: Option<u8>,
    /// Active fault codes.
    pub problems: ProblemFlags,
    /// Last decoded settings block.
    pub settings: Option<Settings>,
    /// Whether the last poll cycle succeeded.
    pub available: bool,
    /// Flags octet from the latest advertisement: the device is ready to
    /// transmit its secret key (hardware button pressed).
    pub key_transmit_enabled: bool,
    /// When this state was last refreshed from the radio.
    pub last_update: Option<DateTime<Utc>>,
}

impl ThermostatState {
    /// Merge a delta into the state. Returns `true` when any field other
    /// than the refresh timestamp changed.
    pub fn apply(&mut self, delta: &StateDelta) -> bool {
        let before = self.clone();

        if let Some(temperature) = delta.room_temperature {
            self.room_temperature = Some(temperature);
        }
        if let Some(temperature) = delta.target_temperature {
            self.target_temperature = Some(temperature);
        }
        if let Some(level) = delta.battery_level {
            self.battery_level = Some(level);
        }
        if let Some(problems) = delta.problems {
            self.problems = problems;
        }
        if let Some(settings) = delta.settings {
            self.settings = Some(settings);
        }
        if let Some(available) = delta.available {
            self.available = available;
        }
        if let Some(enabled) = delta.key_transmit_enabled {
            self.key_transmit_enabled = enabled;
        }
        if delta.observed_at.is_some() {
            self.last_update = delta.observed_at;
        }

        let mut comparable = self.clone();
        comparable.last_update = before.last_update;
        comparable != before
    }
}

/// Partial state update produced by one poll cycle or one decoded
/// advertisement. Every field is optional; absent fields leave the current
/// state untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    /// Measured room temperature.
    pub room_temperature: Option<Temperature>,
    /// Set-point temperature.
    pub target_temperature: Option<Temperature>,
    /// Battery level, percent.
    pub battery_level: Option<u8>,
    /// Fault codes.
    pub problems: Option<ProblemFlags>,
    /// Settings block.
    pub settings: Option<Settings>,
    /// Availability change.
    pub available: Option<bool>,
    /// Key-transmit readiness from the advertisement flags octet.
    pub key_transmit_enabled: Option<bool>,
    /// Secret key announced by the device (scanner `read_secret` mode).
    /// Not merged into [`ThermostatState`]; surfaced as an event instead.
    pub secret_key: Option<SecretKey>,
    /// Timestamp of the observation behind this delta.
    pub observed_at: Option<DateTime<Utc>>,
}

impl StateDelta {
    /// Whether the delta carries no information at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
