//! Event — an immutable record published toward the presentation sink.
//!
//! Events are produced when a poll cycle refreshes sensor values, when
//! availability flips, or when the scanner decodes something noteworthy.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::identity::BleAddress;

/// Unique event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EventId(uuid::Uuid);

impl EventId {
    /// Generate a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Sensor or settings values changed.
    StateChanged,
    /// The device became reachable or unreachable.
    AvailabilityChanged,
    /// The scanner decoded a secret key announced by the device.
    SecretKeyDiscovered,
    /// A matching peripheral was seen on the air.
    DeviceDetected,
}

/// An immutable event record.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Unique identifier.
    pub id: EventId,
    /// Event kind.
    pub event_type: EventType,
    /// Which device this event concerns.
    pub address: BleAddress,
    /// Kind-specific payload.
    pub data: serde_json::Value,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, address: BleAddress, data: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            address,
            data,
            timestamp: Utc::now(),
        }
    }
}
