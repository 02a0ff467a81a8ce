//! EssNode firmware entry point
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  BleLink (Bluedroid)            log_sink                 │
//! │  LinkController                 StateChangedFn           │
//! │                                                          │
//! │  ──────────────── Port Trait Boundary ─────────────────  │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  ConnectionManager · EventQueue · GAP worker       │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use essnode::adapters::ble::BleLink;
use essnode::adapters::log_sink;
use essnode::config::NodeConfig;
use essnode::gap::{AdvertisingPayload, ConnectionManager};

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("EssNode v{} starting", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::default();
    config.validate().context("invalid node configuration")?;

    let payload = AdvertisingPayload::ess_sensor(&config.device_name)
        .map_err(|e| anyhow::anyhow!("advertising payload: {e}"))?;

    let link = Arc::new(BleLink::new(config.device_name.clone()));
    BleLink::start(Arc::clone(&link)).context("BLE stack")?;

    let manager = ConnectionManager::new(
        link,
        payload,
        config.gap,
        Some(log_sink::state_changed_sink(config.gap.max_slots)),
    );

    // Advertising failures are retried by the worker on the next event.
    if let Err(e) = manager.initialize() {
        warn!("GAP: initialization: {}", e);
    }

    loop {
        std::thread::park();
    }
}
