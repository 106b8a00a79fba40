//! CloudLink firmware — main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  NvsZoneStore   WifiRadio     MqttBroker    LogEventSink     │
//! │  (ZoneStore)    (RadioDriver) (BrokerClient)(EventSink)      │
//! │                                             LogUsageReporter │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │             CloudLink (owning context)                 │  │
//! │  │  Credentials · LinkManager · MessageSession            │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Single-threaded loop: (re)connect Wi-Fi, (re)bootstrap the session,
//! pump, send telemetry.  Every failure is logged and retried after
//! `retry_interval_ms`; nothing here halts the device.

#![deny(unused_must_use)]

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::peripherals::Peripherals;

use cloudlink::adapters::broker::MqttBroker;
use cloudlink::adapters::log_sink::LogEventSink;
use cloudlink::adapters::radio::WifiRadio;
use cloudlink::adapters::usage::LogUsageReporter;
use cloudlink::adapters::zone_store::NvsZoneStore;
use cloudlink::app::service::CloudLink;
use cloudlink::config::LinkConfig;
use cloudlink::session::LoggingHandler;
use cloudlink::trust::TrustBundle;
use cloudlink::{Error, Zone};

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  CloudLink v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    // ── 2. Storage, config, trust ─────────────────────────────
    let store = NvsZoneStore::new().map_err(|e| anyhow!("NVS init failed: {e}"))?;
    let config = LinkConfig::load(&store);
    let mut trust = load_trust(&store);

    // ── 3. Connectivity core ──────────────────────────────────
    let mut cloud = CloudLink::new(config.clone(), store, LoggingHandler);
    let mut sink = LogEventSink::new();
    let mut usage = LogUsageReporter::new();

    let modem = peripherals.modem;
    cloud.init_wifi(move || WifiRadio::new(modem, sysloop, None))?;

    // ── 4. Main loop ──────────────────────────────────────────
    let boot = Instant::now();
    let retry = Duration::from_millis(u64::from(config.retry_interval_ms));
    let telemetry = Duration::from_millis(u64::from(config.telemetry_interval_ms));
    let sas_ttl = config.sas_ttl_secs;
    let mut next_attempt = boot;
    let mut next_telemetry = boot + telemetry;

    info!("System ready. Entering main loop.");
    loop {
        let now = Instant::now();

        if !cloud.is_session_ready() && now >= next_attempt {
            next_attempt = now + retry;

            if !cloud.link().is_connected() {
                match cloud.connect_wifi(&mut usage, &mut sink) {
                    Ok(()) => info!("Wi-Fi {} connected, RSSI {:?}", cloud.ssid(), cloud.rssi()),
                    Err(Error::ConfigMissing(zone)) => warn!("{} missing, waiting for configuration", zone),
                    Err(e) => error!("Failed to connect Wi-Fi: {}", e),
                }
            }

            if trust.is_none() {
                trust = load_trust(cloud.credentials().store());
            }

            match trust.as_ref() {
                Some(bundle) if cloud.link().is_connected() => {
                    let result = cloud.bootstrap_session(
                        bundle,
                        |cs, protocol| MqttBroker::connect(cs, protocol, sas_ttl),
                        &mut sink,
                    );
                    if let Err(e) = result {
                        warn!("Session bootstrap failed ({}), retrying in {:?}", e, retry);
                    }
                }
                _ => {}
            }
        }

        if cloud.is_session_ready() {
            if let Err(e) = cloud.pump() {
                error!("Pump failed: {}", e);
            }

            if now >= next_telemetry {
                next_telemetry = now + telemetry;
                if let Err(e) = cloud.send_telemetry(now.duration_since(boot).as_secs()) {
                    warn!("Telemetry not sent: {}", e);
                }
            }
        }

        FreeRtos::delay_ms(config.pump_interval_ms);
    }
}

fn load_trust(store: &NvsZoneStore) -> Option<TrustBundle> {
    match TrustBundle::load(store) {
        Ok(bundle) => Some(bundle),
        Err(Error::ConfigMissing(Zone::TrustedCerts)) => {
            warn!("No trusted certificates provisioned, the session stays down");
            None
        }
        Err(e) => {
            error!("Trusted certificates unusable: {}", e);
            None
        }
    }
}
