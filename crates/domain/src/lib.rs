//! # ecotrv-domain
//!
//! Pure domain model for the ecotrv thermostat hub.
//!
//! ## Responsibilities
//! - Foundational value types with construction-time invariants:
//!   [`identity::BleAddress`], [`identity::SecretKey`], [`identity::PinCode`]
//! - The thermostat state model: [`state::ThermostatState`] and the
//!   all-optional [`state::StateDelta`] that session and scanner produce
//! - Fixed-point [`state::Temperature`] guaranteeing exact wire round-trips
//! - [`event::Event`] records consumed by the presentation/reporting sink
//!
//! ## Dependency rule
//! This crate has **no internal dependencies** and no IO. All radio and
//! scheduling boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod event;
pub mod identity;
pub mod state;
