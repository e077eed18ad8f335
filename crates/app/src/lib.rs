//! # ecotrv-app
//!
//! Application layer — **port definitions** (traits) and in-process
//! infrastructure shared by the adapters and the binary.
//!
//! ## Responsibilities
//! - Define the radio-facing ports the BLE adapter implements:
//!   [`ports::ThermostatLink`] (one connected peripheral) and
//!   [`ports::LinkProvider`] (peripheral lookup by address)
//! - Define the outward [`ports::EventPublisher`] port and provide the
//!   in-process [`event_bus::InProcessEventBus`] implementation
//! - Provide [`state::StateHandle`], the mutex-guarded shared
//!   [`ThermostatState`](ecotrv_domain::state::ThermostatState) with
//!   read-only snapshots for the presentation layer
//!
//! ## Dependency rule
//! Depends on `ecotrv-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the
//! reverse.

pub mod event_bus;
pub mod ports;
pub mod state;
