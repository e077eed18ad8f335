//! Polling controller — periodic GATT cycles for one configured device.
//!
//! One controller per device, all of them sharing a single radio mutex so
//! only one GATT connection is in flight at a time. A tick that finds the
//! previous cycle still running is skipped rather than queued; overlapping
//! cycles against the same peripheral confuse the firmware.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

use ecotrv_app::ports::{EventPublisher, LinkProvider};
use ecotrv_app::state::StateHandle;
use ecotrv_domain::event::{Event, EventType};
use ecotrv_domain::identity::DeviceIdentity;
use ecotrv_domain::state::{DeviceMode, StateDelta, ThermostatState};

use crate::session::{Command, GattSession};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A full cycle ran and the state was refreshed.
    Completed,
    /// The previous cycle was still in flight; nothing was done.
    Skipped,
    /// The cycle ran and failed; the device is marked unavailable.
    Failed,
}

/// Periodic poller for one thermostat.
///
/// Queued commands are drained at the start of each cycle and executed
/// before the reads, so the state published afterwards already reflects
/// them. When a cycle fails its commands go back to the front of the
/// queue and are retried on the next tick.
pub struct PollingController<P, B> {
    provider: P,
    bus: B,
    identity: DeviceIdentity,
    state: StateHandle,
    radio: Arc<tokio::sync::Mutex<()>>,
    poll_interval: Duration,
    session_timeout: Duration,
    in_flight: AtomicBool,
    commands: std::sync::Mutex<Vec<Command>>,
}

impl<P, B> PollingController<P, B>
where
    P: LinkProvider + 'static,
    B: EventPublisher + 'static,
{
    /// Create a controller for one device.
    pub fn new(
        provider: P,
        bus: B,
        identity: DeviceIdentity,
        radio: Arc<tokio::sync::Mutex<()>>,
        poll_interval: Duration,
        session_timeout: Duration,
    ) -> Self {
        let state = StateHandle::new(identity.address);
        Self {
            provider,
            bus,
            identity,
            state,
            radio,
            poll_interval,
            session_timeout,
            in_flight: AtomicBool::new(false),
            commands: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Handle to this device's shared state.
    #[must_use]
    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    /// Queue a command for the next cycle.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the queue lock panicked.
    pub fn queue_command(&self, command: Command) {
        self.commands
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(command);
    }

    /// Spawn the tick loop.
    ///
    /// Ticks land on a fixed cadence: a slow cycle does not push the next
    /// tick back, it just leaves less idle time before it.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// Run one tick: drain the command queue, take the radio, run a cycle,
    /// merge the result and publish events for what changed.
    pub async fn tick(&self) -> TickOutcome {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!(mac = %self.identity.address, "previous poll cycle still running, skipping tick");
            return TickOutcome::Skipped;
        }

        let commands = std::mem::take(
            &mut *self
                .commands
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );

        let outcome = self.run_cycle(&commands).await;
        if outcome == TickOutcome::Failed && !commands.is_empty() {
            self.requeue(commands);
        }

        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_cycle(&self, commands: &[Command]) -> TickOutcome {
        let _radio = self.radio.lock().await;

        let link = match self.provider.open(self.identity.address).await {
            Ok(link) => link,
            Err(err) => {
                tracing::warn!(mac = %self.identity.address, %err, "failed to resolve peripheral");
                self.mark_unavailable().await;
                return TickOutcome::Failed;
            }
        };

        let mut session = GattSession::new(&link, &self.identity);
        match session.run_cycle(self.session_timeout, commands).await {
            Ok(delta) => {
                self.merge_and_publish(&delta).await;
                TickOutcome::Completed
            }
            Err(err) if err.is_configuration() => {
                tracing::error!(mac = %self.identity.address, %err, "poll cycle failed, check device configuration");
                self.mark_unavailable().await;
                TickOutcome::Failed
            }
            Err(err) => {
                tracing::warn!(mac = %self.identity.address, %err, "poll cycle failed");
                self.mark_unavailable().await;
                TickOutcome::Failed
            }
        }
    }

    /// Failed commands go back ahead of anything queued meanwhile, so the
    /// original order is preserved.
    fn requeue(&self, commands: Vec<Command>) {
        let mut queue = self
            .commands
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let queued_meanwhile = std::mem::replace(&mut *queue, commands);
        queue.extend(queued_meanwhile);
    }

    async fn merge_and_publish(&self, delta: &StateDelta) {
        let was_available = self.state.snapshot().available;
        let changed = self.state.apply(delta);
        let snapshot = self.state.snapshot();

        if snapshot.available != was_available {
            self.bus
                .publish(Event::new(
                    EventType::AvailabilityChanged,
                    self.identity.address,
                    serde_json::json!({ "available": snapshot.available }),
                ))
                .await;
        }

        if changed {
            self.bus
                .publish(Event::new(
                    EventType::StateChanged,
                    self.identity.address,
                    state_payload(&snapshot),
                ))
                .await;
        }
    }

    async fn mark_unavailable(&self) {
        let delta = StateDelta {
            available: Some(false),
            ..StateDelta::default()
        };
        self.merge_and_publish(&delta).await;
    }
}

fn mode_label(mode: DeviceMode) -> &'static str {
    match mode {
        DeviceMode::Manual => "manual",
        DeviceMode::Scheduled => "scheduled",
        DeviceMode::Vacation => "vacation",
        DeviceMode::Hold => "hold",
    }
}

fn state_payload(state: &ThermostatState) -> serde_json::Value {
    serde_json::json!({
        "room_temperature": state.room_temperature.map(ecotrv_domain::state::Temperature::celsius),
        "target_temperature": state.target_temperature.map(ecotrv_domain::state::Temperature::celsius),
        "battery_level": state.battery_level,
        "mode": state.settings.map(|settings| mode_label(settings.mode)),
        "problems": state.problems.active_codes(),
        "available": state.available,
        "key_transmit_enabled": state.key_transmit_enabled,
        "last_update": state.last_update.map(|at| at.to_rfc3339()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    use ecotrv_app::ports::{LinkError, ThermostatLink};
    use ecotrv_domain::identity::{BleAddress, SecretKey};
    use ecotrv_domain::state::Temperature;

    use crate::codec;
    use crate::crypto;

    fn key() -> SecretKey {
        SecretKey::from_hex("00112233445566778899aabbccddeeff").unwrap()
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new(
            BleAddress::from_octets([0x00, 0x04, 0x2F, 0x0A, 0x0B, 0x0C]),
            Some(key()),
            None,
        )
    }

    #[derive(Default)]
    struct Shared {
        fail_open: AtomicBool,
        fail_reads: AtomicU32,
        battery: Mutex<u8>,
        opens: AtomicU32,
        stall_reads: AtomicBool,
        stall_gate: tokio::sync::Notify,
        read_delay_secs: AtomicU32,
    }

    struct FakeLink(Arc<Shared>);

    impl ThermostatLink for FakeLink {
        async fn connect(&self) -> Result<(), LinkError> {
            Ok(())
        }

        async fn read(&self, uuid: uuid::Uuid) -> Result<Vec<u8>, LinkError> {
            if self.0.stall_reads.load(Ordering::SeqCst) {
                self.0.stall_gate.notified().await;
            }
            let delay = self.0.read_delay_secs.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_secs(u64::from(delay))).await;
            }
            if self.0.fail_reads.load(Ordering::SeqCst) > 0 {
                self.0.fail_reads.fetch_sub(1, Ordering::SeqCst);
                return Err(LinkError::Read("interference".into()));
            }
            let frame = if uuid == codec::CHAR_BATTERY {
                vec![*self.0.battery.lock().unwrap()]
            } else if uuid == codec::CHAR_TEMPERATURE {
                crypto::encrypt(&[44, 41, 0, 0, 0, 0, 0, 0], &key()).unwrap()
            } else if uuid == codec::CHAR_SETTINGS {
                let mut frame = [0u8; 16];
                frame[1] = 12;
                frame[2] = 56;
                frame[3] = 9;
                frame[5] = 30;
                crypto::encrypt(&frame, &key()).unwrap()
            } else if uuid == codec::CHAR_ERRORS {
                crypto::encrypt(&[0u8; 16], &key()).unwrap()
            } else {
                panic!("unexpected read of {uuid}")
            };
            Ok(frame)
        }

        async fn write(&self, _uuid: uuid::Uuid, _payload: &[u8]) -> Result<(), LinkError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), LinkError> {
            Ok(())
        }
    }

    struct FakeProvider(Arc<Shared>);

    impl LinkProvider for FakeProvider {
        type Link = FakeLink;

        async fn open(&self, address: BleAddress) -> Result<Self::Link, LinkError> {
            if self.0.fail_open.load(Ordering::SeqCst) {
                return Err(LinkError::PeripheralNotFound { address });
            }
            self.0.opens.fetch_add(1, Ordering::SeqCst);
            Ok(FakeLink(Arc::clone(&self.0)))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingBus {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl EventPublisher for RecordingBus {
        async fn publish(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn controller(
        shared: Arc<Shared>,
        bus: RecordingBus,
    ) -> PollingController<FakeProvider, RecordingBus> {
        PollingController::new(
            FakeProvider(shared),
            bus,
            identity(),
            Arc::new(tokio::sync::Mutex::new(())),
            Duration::from_secs(300),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn should_refresh_state_and_publish_on_successful_tick() {
        let shared = Arc::new(Shared {
            battery: Mutex::new(80),
            ..Shared::default()
        });
        let bus = RecordingBus::default();
        let controller = controller(shared, bus.clone());

        assert_eq!(controller.tick().await, TickOutcome::Completed);

        let snapshot = controller.state().snapshot();
        assert!(snapshot.available);
        assert_eq!(snapshot.battery_level, Some(80));
        assert_eq!(snapshot.target_temperature, Some(Temperature::from_half_degrees(44)));

        let events = bus.events.lock().unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::AvailabilityChanged));
        let state_event = events
            .iter()
            .find(|e| e.event_type == EventType::StateChanged)
            .unwrap();
        assert_eq!(state_event.data["battery_level"], 80);
        assert_eq!(state_event.data["mode"], "manual");
    }

    #[tokio::test]
    async fn should_skip_tick_while_cycle_in_flight() {
        let shared = Arc::new(Shared::default());
        shared.stall_reads.store(true, Ordering::SeqCst);
        let bus = RecordingBus::default();
        let controller = Arc::new(controller(Arc::clone(&shared), bus.clone()));

        let running = Arc::clone(&controller);
        let first = tokio::spawn(async move { running.tick().await });
        // let the first cycle progress until it parks on the stalled read
        tokio::task::yield_now().await;

        assert_eq!(controller.tick().await, TickOutcome::Skipped);
        assert!(bus.events.lock().unwrap().is_empty());

        shared.stall_reads.store(false, Ordering::SeqCst);
        shared.stall_gate.notify_one();
        assert_eq!(first.await.unwrap(), TickOutcome::Completed);

        // guard released, the next tick runs
        assert_eq!(controller.tick().await, TickOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_a_fixed_cadence_when_cycles_take_time() {
        let shared = Arc::new(Shared::default());
        // four reads of 40 s each: every cycle burns 160 s of the interval
        shared.read_delay_secs.store(40, Ordering::SeqCst);
        let controller = Arc::new(PollingController::new(
            FakeProvider(Arc::clone(&shared)),
            RecordingBus::default(),
            identity(),
            Arc::new(tokio::sync::Mutex::new(())),
            Duration::from_secs(300),
            Duration::from_secs(250),
        ));
        let ticker = Arc::clone(&controller).start();

        tokio::time::sleep(Duration::from_secs(650)).await;
        ticker.abort();

        // cycles start at 0, 300 and 600, not 0, 460 and 920
        assert_eq!(shared.opens.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn should_mark_unavailable_and_requeue_commands_on_failure() {
        let shared = Arc::new(Shared {
            battery: Mutex::new(75),
            ..Shared::default()
        });
        let bus = RecordingBus::default();
        let controller = controller(Arc::clone(&shared), bus.clone());

        assert_eq!(controller.tick().await, TickOutcome::Completed);
        assert!(controller.state().snapshot().available);

        shared.fail_reads.store(u32::MAX, Ordering::SeqCst);
        controller.queue_command(Command::SetTargetTemperature(Temperature::from_celsius(22.0)));

        assert_eq!(controller.tick().await, TickOutcome::Failed);
        assert!(!controller.state().snapshot().available);
        // sensor values are stale but retained
        assert_eq!(controller.state().snapshot().battery_level, Some(75));
        // the command survived for the next tick
        assert_eq!(controller.commands.lock().unwrap().len(), 1);

        let events = bus.events.lock().unwrap();
        let last_availability = events
            .iter()
            .rev()
            .find(|e| e.event_type == EventType::AvailabilityChanged)
            .unwrap();
        assert_eq!(last_availability.data["available"], false);
    }

    #[tokio::test]
    async fn should_not_publish_when_nothing_changed() {
        let shared = Arc::new(Shared {
            battery: Mutex::new(80),
            ..Shared::default()
        });
        let bus = RecordingBus::default();
        let controller = controller(shared, bus.clone());

        assert_eq!(controller.tick().await, TickOutcome::Completed);
        let after_first = bus.events.lock().unwrap().len();

        assert_eq!(controller.tick().await, TickOutcome::Completed);
        assert_eq!(bus.events.lock().unwrap().len(), after_first);
    }

    #[tokio::test]
    async fn should_report_failure_when_peripheral_cannot_be_resolved() {
        let shared = Arc::new(Shared::default());
        shared.fail_open.store(true, Ordering::SeqCst);
        let bus = RecordingBus::default();
        let controller = controller(shared, bus.clone());

        assert_eq!(controller.tick().await, TickOutcome::Failed);
        // never was available, so no availability transition to report
        assert!(bus.events.lock().unwrap().is_empty());
    }
}
