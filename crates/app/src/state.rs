//! Shared thermostat state with snapshot semantics.
//!
//! Update frequency is low — roughly once per polling interval plus
//! sporadic advertisements — so a plain mutex is enough to keep per-field
//! updates atomic. The presentation layer only ever receives clones, never
//! a reference into the guarded state.

use std::sync::{Arc, Mutex};

use ecotrv_domain::identity::BleAddress;
use ecotrv_domain::state::{StateDelta, ThermostatState};

/// Cheap-to-clone handle to one device's shared [`ThermostatState`].
///
/// The session and the scanner both apply deltas through the same handle;
/// whichever observation arrives first wins that field until the next one.
#[derive(Clone)]
pub struct StateHandle {
    address: BleAddress,
    inner: Arc<Mutex<ThermostatState>>,
}

impl StateHandle {
    /// Create a handle with default (all-unknown) state.
    #[must_use]
    pub fn new(address: BleAddress) -> Self {
        Self {
            address,
            inner: Arc::new(Mutex::new(ThermostatState::default())),
        }
    }

    /// Which device this handle belongs to.
    #[must_use]
    pub fn address(&self) -> BleAddress {
        self.address
    }

    /// Merge a delta into the state. Returns `true` when anything changed.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    pub fn apply(&self, delta: &StateDelta) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.apply(delta)
    }

    /// Read-only snapshot of the current state.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    #[must_use]
    pub fn snapshot(&self) -> ThermostatState {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecotrv_domain::state::Temperature;

    fn handle() -> StateHandle {
        StateHandle::new(BleAddress::from_octets([0, 4, 0x2F, 1, 2, 3]))
    }

    #[test]
    fn should_start_with_default_state() {
        let handle = handle();
        assert_eq!(handle.snapshot(), ThermostatState::default());
    }

    #[test]
    fn should_apply_delta_visible_in_snapshot() {
        let handle = handle();
        let changed = handle.apply(&StateDelta {
            target_temperature: Some(Temperature::from_half_degrees(43)),
            ..StateDelta::default()
        });
        assert!(changed);
        assert_eq!(
            handle.snapshot().target_temperature,
            Some(Temperature::from_half_degrees(43))
        );
    }

    #[test]
    fn should_share_state_between_clones() {
        let handle = handle();
        let other = handle.clone();
        other.apply(&StateDelta {
            battery_level: Some(55),
            ..StateDelta::default()
        });
        assert_eq!(handle.snapshot().battery_level, Some(55));
    }

    #[test]
    fn should_not_mutate_state_through_snapshot() {
        let handle = handle();
        let mut snapshot = handle.snapshot();
        snapshot.battery_level = Some(1);
        assert_eq!(handle.snapshot().battery_level, None);
    }
}
