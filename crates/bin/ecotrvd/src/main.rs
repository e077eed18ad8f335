//! # ecotrvd — ecotrv daemon
//!
//! Composition root that wires the BLE adapter into a running daemon.
//!
//! ## Responsibilities
//! - Load and validate configuration (`ecotrvd.toml` + env overrides)
//! - Initialize tracing
//! - Spawn one polling controller per configured device, all sharing one
//!   radio lock
//! - Spawn the advertisement scanner, feeding the same device states
//! - Log every bus event as structured output
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use ecotrv_adapter_ble::gatt::BtleplugProvider;
use ecotrv_adapter_ble::poller::PollingController;
use ecotrv_adapter_ble::scanner::AdvertisementScanner;
use ecotrv_app::event_bus::InProcessEventBus;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.logging.filter))
        .init();

    let bus = InProcessEventBus::new(256);
    let radio = Arc::new(tokio::sync::Mutex::new(()));

    let mut scanner = AdvertisementScanner::new(
        bus.clone(),
        config.scanner_allowlist(),
        config.scanner.read_secret,
        Duration::from_secs(u64::from(config.scanner.scan_duration_secs)),
        Duration::from_secs(u64::from(config.scanner.interval_secs)),
    );

    let mut tasks = Vec::new();
    for device in config.resolved_devices() {
        tracing::info!(
            mac = %device.identity.address,
            poll_interval_secs = device.polling.poll_interval_secs,
            unit = %device.unit,
            "starting polling controller"
        );

        let controller = Arc::new(PollingController::new(
            BtleplugProvider,
            bus.clone(),
            device.identity.clone(),
            Arc::clone(&radio),
            Duration::from_secs(u64::from(device.polling.poll_interval_secs)),
            Duration::from_secs(u64::from(device.polling.session_timeout_secs)),
        ));
        scanner.register(&device.identity, controller.state());
        tasks.push(controller.start());
    }

    if config.scanner.enabled {
        tracing::info!(
            read_secret = config.scanner.read_secret,
            "starting advertisement scanner"
        );
        tasks.push(scanner.start());
    }

    // Structured event log — the daemon's outward surface.
    let mut events = bus.subscribe();
    tasks.push(tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    event_type = ?event.event_type,
                    mac = %event.address,
                    data = %event.data,
                    "bus event"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event log fell behind the bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }));

    tracing::info!("ecotrvd running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    for task in tasks {
        task.abort();
    }

    Ok(())
}
