//! Passive advertisement scanner.
//!
//! eTRV thermostats broadcast a local name whose first byte is a flags
//! octet; bit 2 set means the hardware button was pressed and the device
//! will transmit its secret key. The scanner listens for those broadcasts
//! without connecting: it never touches the shared radio lock, so it can
//! run alongside the polling controllers.

use std::collections::HashMap;
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::Manager;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;

use ecotrv_app::ports::EventPublisher;
use ecotrv_app::state::StateHandle;
use ecotrv_domain::event::{Event, EventType};
use ecotrv_domain::identity::{BleAddress, DeviceIdentity, SecretKey};
use ecotrv_domain::state::StateDelta;

use crate::codec;
use crate::crypto;
use crate::error::ScanError;

/// Suffix of the local name advertised by eTRV peripherals.
const ETRV_NAME_SUFFIX: &str = ";eTRV";

/// Bit 2 of the name-flags octet: secret-key transmit is active.
const FLAG_KEY_TRANSMIT: u8 = 1 << 2;

/// One raw broadcast, as handed over by the BLE central. Transient —
/// decoded into a [`StateDelta`] and dropped.
#[derive(Debug, Clone)]
pub struct AdvertisementFrame {
    /// Advertiser address.
    pub address: BleAddress,
    /// Advertised local name, when present.
    pub local_name: Option<String>,
    /// Service data payloads keyed by service UUID.
    pub service_data: HashMap<uuid::Uuid, Vec<u8>>,
}

/// Decodes eTRV advertisements and feeds the shared device states.
///
/// Frames from foreign devices, malformed names and truncated service data
/// all decode to `None` without an error: the airwaves are full of noise
/// and none of it is worth a log line.
pub struct AdvertisementScanner<B> {
    bus: B,
    allowlist: Vec<BleAddress>,
    read_secret: bool,
    keys: HashMap<BleAddress, SecretKey>,
    states: HashMap<BleAddress, StateHandle>,
    scan_duration: Duration,
    interval: Duration,
}

impl<B: EventPublisher + 'static> AdvertisementScanner<B> {
    /// Create a scanner. Devices are attached with [`register`](Self::register).
    #[must_use]
    pub fn new(
        bus: B,
        allowlist: Vec<BleAddress>,
        read_secret: bool,
        scan_duration: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            bus,
            allowlist,
            read_secret,
            keys: HashMap::new(),
            states: HashMap::new(),
            scan_duration,
            interval,
        }
    }

    /// Attach a configured device so its broadcasts update `state`.
    pub fn register(&mut self, identity: &DeviceIdentity, state: StateHandle) {
        if let Some(key) = identity.secret_key {
            self.keys.insert(identity.address, key);
        }
        self.states.insert(identity.address, state);
    }

    /// Spawn the continuous scan loop.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(err) = self.iterate().await {
                    tracing::warn!(%err, "advertisement scan failed, retrying next interval");
                }
                tokio::time::sleep(self.interval).await;
            }
        })
    }

    /// Decode one broadcast into a state delta.
    ///
    /// Returns `None` for anything that is not an allowlisted eTRV frame.
    #[must_use]
    pub fn decode_advertisement(&self, frame: &AdvertisementFrame) -> Option<StateDelta> {
        let name = frame.local_name.as_deref()?;
        // The flags octet precedes the suffix, so a bare ";eTRV" is no frame.
        if name.len() <= ETRV_NAME_SUFFIX.len() || !name.ends_with(ETRV_NAME_SUFFIX) {
            return None;
        }
        if !self.allowlist.is_empty() && !self.allowlist.contains(&frame.address) {
            return None;
        }

        let flags = *name.as_bytes().first()?;
        let key_transmit = flags & FLAG_KEY_TRANSMIT != 0;

        let mut delta = StateDelta {
            key_transmit_enabled: Some(key_transmit),
            observed_at: Some(Utc::now()),
            ..StateDelta::default()
        };

        if self.read_secret && key_transmit {
            delta.secret_key = frame
                .service_data
                .get(&codec::SERVICE_SETTINGS)
                .and_then(|blob| self.decode_secret(frame.address, blob));
        }

        Some(delta)
    }

    /// A 16-byte service-data blob under the settings service carries the
    /// announced key: encrypted with the configured key when we have one,
    /// plaintext during first-time pairing.
    fn decode_secret(&self, address: BleAddress, blob: &[u8]) -> Option<SecretKey> {
        if blob.len() != 16 {
            return None;
        }
        let plain = match self.keys.get(&address) {
            Some(key) => crypto::decrypt(blob, key).ok()?,
            None => blob.to_vec(),
        };
        <[u8; 16]>::try_from(plain.as_slice())
            .ok()
            .map(SecretKey::from_bytes)
    }

    /// Decode one frame and propagate what it carries: state updates for
    /// registered devices, a detection event for unknown eTRVs, a
    /// key-discovery event when a secret was announced.
    pub async fn process(&self, frame: &AdvertisementFrame) {
        let Some(delta) = self.decode_advertisement(frame) else {
            return;
        };

        if let Some(key) = delta.secret_key {
            tracing::info!(mac = %frame.address, "device announced its secret key");
            self.bus
                .publish(Event::new(
                    EventType::SecretKeyDiscovered,
                    frame.address,
                    serde_json::json!({ "secret_key": key.to_hex() }),
                ))
                .await;
        }

        match self.states.get(&frame.address) {
            Some(state) => {
                state.apply(&delta);
            }
            None => {
                tracing::debug!(mac = %frame.address, "unconfigured eTRV detected");
                self.bus
                    .publish(Event::new(
                        EventType::DeviceDetected,
                        frame.address,
                        serde_json::json!({
                            "name": frame.local_name,
                            "key_transmit_enabled": delta.key_transmit_enabled,
                        }),
                    ))
                    .await;
            }
        }
    }

    /// One scan window: subscribe to central events, feed every
    /// advertisement through [`process`](Self::process).
    async fn iterate(&self) -> Result<(), ScanError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let central = adapters.into_iter().next().ok_or(ScanError::NotAvailable)?;

        let mut events = central.events().await?;
        central.start_scan(ScanFilter::default()).await?;

        let deadline = tokio::time::Instant::now() + self.scan_duration;
        while tokio::time::Instant::now() < deadline {
            let remaining = deadline - tokio::time::Instant::now();
            match tokio::time::timeout(remaining, events.next()).await {
                Ok(Some(CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id))) => {
                    let Ok(peripheral) = central.peripheral(&id).await else {
                        continue;
                    };
                    let Ok(Some(props)) = peripheral.properties().await else {
                        continue;
                    };
                    let frame = AdvertisementFrame {
                        address: BleAddress::from_octets(props.address.into_inner()),
                        local_name: props.local_name,
                        service_data: props.service_data,
                    };
                    self.process(&frame).await;
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }

        central.stop_scan().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingBus {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl EventPublisher for RecordingBus {
        async fn publish(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn address() -> BleAddress {
        BleAddress::from_octets([0x00, 0x04, 0x2F, 0xC0, 0xFF, 0xEE])
    }

    fn key() -> SecretKey {
        SecretKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap()
    }

    fn etrv_name(flags: u8) -> String {
        let mut name = String::new();
        name.push(flags as char);
        name.push_str("0;eTRV");
        name
    }

    fn frame(name: Option<String>) -> AdvertisementFrame {
        AdvertisementFrame {
            address: address(),
            local_name: name,
            service_data: HashMap::new(),
        }
    }

    fn scanner(read_secret: bool) -> AdvertisementScanner<RecordingBus> {
        AdvertisementScanner::new(
            RecordingBus::default(),
            Vec::new(),
            read_secret,
            Duration::from_secs(10),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn should_ignore_noise_silently() {
        let scanner = scanner(false);
        assert!(scanner.decode_advertisement(&frame(None)).is_none());
        assert!(
            scanner
                .decode_advertisement(&frame(Some("LYWSD03MMC".to_owned())))
                .is_none()
        );
        assert!(
            scanner
                .decode_advertisement(&frame(Some(String::new())))
                .is_none()
        );
    }

    #[test]
    fn should_reject_bare_suffix_without_flags_octet() {
        let scanner = scanner(false);
        assert!(
            scanner
                .decode_advertisement(&frame(Some(ETRV_NAME_SUFFIX.to_owned())))
                .is_none()
        );
    }

    #[test]
    fn should_decode_key_transmit_flag_from_name() {
        let scanner = scanner(false);

        let ready = scanner
            .decode_advertisement(&frame(Some(etrv_name(FLAG_KEY_TRANSMIT))))
            .unwrap();
        assert_eq!(ready.key_transmit_enabled, Some(true));
        assert!(ready.observed_at.is_some());

        let idle = scanner.decode_advertisement(&frame(Some(etrv_name(0)))).unwrap();
        assert_eq!(idle.key_transmit_enabled, Some(false));
    }

    #[test]
    fn should_filter_by_allowlist() {
        let mut scanner = scanner(false);
        scanner.allowlist = vec![BleAddress::from_octets([1, 2, 3, 4, 5, 6])];
        assert!(
            scanner
                .decode_advertisement(&frame(Some(etrv_name(0))))
                .is_none()
        );

        scanner.allowlist = vec![address()];
        assert!(
            scanner
                .decode_advertisement(&frame(Some(etrv_name(0))))
                .is_some()
        );
    }

    #[test]
    fn should_accept_plaintext_secret_announce_when_unpaired() {
        let scanner = scanner(true);
        let mut frame = frame(Some(etrv_name(FLAG_KEY_TRANSMIT)));
        frame
            .service_data
            .insert(codec::SERVICE_SETTINGS, vec![7u8; 16]);

        let delta = scanner.decode_advertisement(&frame).unwrap();
        assert_eq!(delta.secret_key, Some(SecretKey::from_bytes([7u8; 16])));
    }

    #[test]
    fn should_decrypt_secret_announce_with_configured_key() {
        let mut scanner = scanner(true);
        let identity = DeviceIdentity::new(address(), Some(key()), None);
        scanner.register(&identity, StateHandle::new(address()));

        let announced = [0xA5u8; 16];
        let blob = crypto::encrypt(&announced, &key()).unwrap();
        let mut frame = frame(Some(etrv_name(FLAG_KEY_TRANSMIT)));
        frame.service_data.insert(codec::SERVICE_SETTINGS, blob);

        let delta = scanner.decode_advertisement(&frame).unwrap();
        assert_eq!(delta.secret_key, Some(SecretKey::from_bytes(announced)));
    }

    #[test]
    fn should_ignore_truncated_secret_blob() {
        let scanner = scanner(true);
        let mut frame = frame(Some(etrv_name(FLAG_KEY_TRANSMIT)));
        frame
            .service_data
            .insert(codec::SERVICE_SETTINGS, vec![7u8; 8]);

        let delta = scanner.decode_advertisement(&frame).unwrap();
        assert_eq!(delta.secret_key, None);
    }

    #[test]
    fn should_not_read_secret_when_disabled() {
        let scanner = scanner(false);
        let mut frame = frame(Some(etrv_name(FLAG_KEY_TRANSMIT)));
        frame
            .service_data
            .insert(codec::SERVICE_SETTINGS, vec![7u8; 16]);

        let delta = scanner.decode_advertisement(&frame).unwrap();
        assert_eq!(delta.secret_key, None);
    }

    #[tokio::test]
    async fn should_apply_delta_to_registered_device_state() {
        let mut scanner = scanner(false);
        let identity = DeviceIdentity::new(address(), Some(key()), None);
        let state = StateHandle::new(address());
        scanner.register(&identity, state.clone());

        scanner.process(&frame(Some(etrv_name(FLAG_KEY_TRANSMIT)))).await;

        assert!(state.snapshot().key_transmit_enabled);
        assert!(scanner.bus.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_publish_detection_for_unconfigured_device() {
        let scanner = scanner(false);

        scanner.process(&frame(Some(etrv_name(0)))).await;

        let events = scanner.bus.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::DeviceDetected);
        assert_eq!(events[0].address, address());
    }

    #[tokio::test]
    async fn should_publish_discovered_secret_key() {
        let scanner = scanner(true);
        let mut frame = frame(Some(etrv_name(FLAG_KEY_TRANSMIT)));
        frame
            .service_data
            .insert(codec::SERVICE_SETTINGS, vec![0x2Au8; 16]);

        scanner.process(&frame).await;

        let events = scanner.bus.events.lock().unwrap();
        let key_event = events
            .iter()
            .find(|e| e.event_type == EventType::SecretKeyDiscovered)
            .unwrap();
        assert_eq!(key_event.data["secret_key"], "2a".repeat(16));
    }
}
