//! btleplug-backed implementations of the link ports.
//!
//! [`BtleplugProvider`] resolves a peripheral by address through the first
//! available adapter; [`PeripheralLink`] wraps it behind
//! [`ThermostatLink`]. No timeouts here — the session owns the cycle
//! deadline and wraps every call.

use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, WriteType};
use btleplug::platform::{Manager, Peripheral};

use ecotrv_app::ports::{LinkError, LinkProvider, ThermostatLink};
use ecotrv_domain::identity::BleAddress;

/// Resolves peripherals through the host's first BLE adapter.
pub struct BtleplugProvider;

impl LinkProvider for BtleplugProvider {
    type Link = PeripheralLink;

    async fn open(&self, address: BleAddress) -> Result<Self::Link, LinkError> {
        let manager = Manager::new()
            .await
            .map_err(|_| LinkError::AdapterUnavailable)?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|_| LinkError::AdapterUnavailable)?;
        let central = adapters
            .into_iter()
            .next()
            .ok_or(LinkError::AdapterUnavailable)?;

        let peripherals = central
            .peripherals()
            .await
            .map_err(|err| LinkError::Connect(Box::new(err)))?;

        for peripheral in peripherals {
            if peripheral.address().into_inner() == address.octets() {
                return Ok(PeripheralLink { peripheral });
            }
        }
        Err(LinkError::PeripheralNotFound { address })
    }
}

/// One btleplug peripheral behind the [`ThermostatLink`] port.
pub struct PeripheralLink {
    peripheral: Peripheral,
}

impl PeripheralLink {
    /// Characteristic lookup on a peripheral whose services have been
    /// discovered during [`connect`](ThermostatLink::connect).
    fn find_characteristic(&self, uuid: uuid::Uuid) -> Result<Characteristic, LinkError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(LinkError::CharacteristicNotFound { uuid })
    }
}

impl ThermostatLink for PeripheralLink {
    async fn connect(&self) -> Result<(), LinkError> {
        self.peripheral
            .connect()
            .await
            .map_err(|err| LinkError::Connect(Box::new(err)))?;
        self.peripheral
            .discover_services()
            .await
            .map_err(|err| LinkError::Connect(Box::new(err)))
    }

    async fn read(&self, uuid: uuid::Uuid) -> Result<Vec<u8>, LinkError> {
        let characteristic = self.find_characteristic(uuid)?;
        self.peripheral
            .read(&characteristic)
            .await
            .map_err(|err| LinkError::Read(Box::new(err)))
    }

    async fn write(&self, uuid: uuid::Uuid, payload: &[u8]) -> Result<(), LinkError> {
        let characteristic = self.find_characteristic(uuid)?;
        self.peripheral
            .write(&characteristic, payload, WriteType::WithResponse)
            .await
            .map_err(|err| LinkError::Write(Box::new(err)))
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.peripheral
            .disconnect()
            .await
            .map_err(|err| LinkError::Disconnect(Box::new(err)))
    }
}
