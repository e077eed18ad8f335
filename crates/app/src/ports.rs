//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside
//! world. They are defined here (in `app`) so that both the session logic
//! and the adapter layer can depend on them without creating circular
//! dependencies — and so tests can substitute simulated radios.

pub mod event_bus;
pub mod link;

pub use event_bus::EventPublisher;
pub use link::{LinkError, LinkProvider, ThermostatLink};
