//! Link port — the connection-oriented BLE surface the session drives.
//!
//! The host platform provides the actual BLE central stack; this trait is
//! the narrow slice of it the thermostat session needs: connect, read and
//! write characteristics by UUID, disconnect. Implementations must not
//! enforce their own timeouts — the session owns the cycle deadline and
//! wraps every call.

use std::future::Future;

use ecotrv_domain::identity::BleAddress;

/// Failure reported by the BLE link layer.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No peripheral with the requested address is known to the central.
    #[error("peripheral {address} not found")]
    PeripheralNotFound {
        /// Address that could not be resolved.
        address: BleAddress,
    },

    /// No BLE adapter available on the host.
    #[error("no BLE adapter available")]
    AdapterUnavailable,

    /// Connection establishment failed.
    #[error("failed to connect")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The peripheral does not expose the requested characteristic.
    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound {
        /// UUID that was looked up.
        uuid: uuid::Uuid,
    },

    /// A characteristic read failed at the GATT layer.
    #[error("characteristic read failed")]
    Read(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A characteristic write was rejected or failed at the GATT layer.
    #[error("characteristic write failed")]
    Write(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Disconnect failed; the link may already be gone.
    #[error("failed to disconnect")]
    Disconnect(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// One connected (or connectable) thermostat peripheral.
///
/// The session calls the lifecycle in order: [`connect`](Self::connect),
/// any number of [`read`](Self::read)/[`write`](Self::write), then
/// [`disconnect`](Self::disconnect). `disconnect` must be safe to call on
/// a link that never connected.
pub trait ThermostatLink: Send + Sync {
    /// Establish the connection and discover services.
    fn connect(&self) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Read the value of the characteristic with the given UUID.
    fn read(&self, uuid: uuid::Uuid) -> impl Future<Output = Result<Vec<u8>, LinkError>> + Send;

    /// Write a value to the characteristic with the given UUID, with
    /// response (the device acks or rejects the write).
    fn write(
        &self,
        uuid: uuid::Uuid,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Tear the connection down. Best effort; errors are reported but the
    /// link must be considered closed afterwards.
    fn disconnect(&self) -> impl Future<Output = Result<(), LinkError>> + Send;
}

/// Resolves a peripheral for a device address at the start of a poll cycle.
///
/// The polling controller does not hold links across cycles; it asks the
/// provider for a fresh one each tick so a peripheral that dropped off the
/// air is re-resolved rather than reused.
pub trait LinkProvider: Send + Sync {
    /// The link type this provider hands out.
    type Link: ThermostatLink;

    /// Resolve the peripheral with the given address.
    fn open(
        &self,
        address: BleAddress,
    ) -> impl Future<Output = Result<Self::Link, LinkError>> + Send;
}
