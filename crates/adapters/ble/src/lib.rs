//! # ecotrv-adapter-ble
//!
//! Radio-facing adapter for Danfoss Eco eTRV thermostats — XXTEA framing,
//! GATT sessions, periodic polling and passive advertisement scanning.
//!
//! ## How it works
//!
//! The eTRV keeps its interesting attributes behind encrypted GATT
//! characteristics, so reading one means connecting, optionally writing a
//! PIN, reading ciphertext and decrypting it with the device's 128-bit
//! key. Each configured device gets a [`poller::PollingController`] that
//! runs one bounded [`session::GattSession`] cycle per interval. In
//! parallel, [`scanner::AdvertisementScanner`] listens for the broadcasts
//! the device emits anyway and for secret-key announcements during
//! pairing.
//!
//! ## Dependency rule
//!
//! Depends on `ecotrv-app` (ports, shared state) and `ecotrv-domain`.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gatt;
pub mod poller;
pub mod scanner;
pub mod session;

pub use config::{PollingConfig, ScannerConfig};
pub use error::{CryptoError, ProtocolError, ScanError, SessionError};
