//! Link and session configuration parameters.
//!
//! Tunables for the connectivity core.  Credentials are *not* part of
//! this struct — they live in their own storage zones and are re-read on
//! every bootstrap attempt.  The config itself may be persisted in
//! [`Zone::LinkConfig`]; an empty zone yields the defaults.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::ZoneStore;
use crate::error::{Error, Result, Zone};
use crate::session::outbox::OUTBOX_CAPACITY;

/// Largest serialized config accepted from the zone.
const MAX_CONFIG_BYTES: usize = 128;

/// Connectivity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    // --- Radio ---
    /// Station connect timeout handed to the radio (0 = driver default)
    pub connect_timeout_ms: u32,

    // --- Broker ---
    /// Verbose protocol tracing in the broker client
    pub log_trace: bool,
    /// Maximum unconfirmed outbound messages
    pub max_in_flight: u16,
    /// Lifetime of generated shared-access tokens (seconds)
    pub sas_ttl_secs: u32,

    // --- Timing (firmware main loop) ---
    /// Work-pump cadence (milliseconds)
    pub pump_interval_ms: u32,
    /// Telemetry send interval (milliseconds)
    pub telemetry_interval_ms: u32,
    /// Delay before the caller retries a failed bootstrap (milliseconds)
    pub retry_interval_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            // Radio
            connect_timeout_ms: 0,

            // Broker
            log_trace: false,
            max_in_flight: 8,
            sas_ttl_secs: 3600,

            // Timing
            pump_interval_ms: 100,      // 10 Hz
            telemetry_interval_ms: 5000, // 1 per 5 s
            retry_interval_ms: 10_000,
        }
    }
}

impl LinkConfig {
    /// Range-check every field.
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 || usize::from(self.max_in_flight) > OUTBOX_CAPACITY {
            return Err(Error::Config("max_in_flight must be 1..=16"));
        }
        if !(60..=86_400).contains(&self.sas_ttl_secs) {
            return Err(Error::Config("sas_ttl_secs must be 60-86400"));
        }
        if !(10..=1000).contains(&self.pump_interval_ms) {
            return Err(Error::Config("pump_interval_ms must be 10-1000"));
        }
        if self.telemetry_interval_ms < self.pump_interval_ms {
            return Err(Error::Config("telemetry_interval_ms must be >= pump_interval_ms"));
        }
        if self.retry_interval_ms < 1000 {
            return Err(Error::Config("retry_interval_ms must be >= 1000"));
        }
        Ok(())
    }

    /// Load the persisted config, falling back to defaults when the zone is
    /// empty, unreadable or fails validation.
    pub fn load(store: &impl ZoneStore) -> Self {
        let mut buf = [0u8; MAX_CONFIG_BYTES];
        match store.read(Zone::LinkConfig, 0, &mut buf) {
            Ok(0) => {
                info!("Config: no stored link config, using defaults");
                Self::default()
            }
            Ok(len) => match postcard::from_bytes::<Self>(&buf[..len.min(MAX_CONFIG_BYTES)]) {
                Ok(cfg) if cfg.validate().is_ok() => {
                    info!("Config: loaded link config ({} bytes)", len);
                    cfg
                }
                Ok(_) => {
                    warn!("Config: stored link config out of range, using defaults");
                    Self::default()
                }
                Err(_) => {
                    warn!("Config: stored link config corrupted, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Config: link config read failed ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Validate and persist.
    pub fn save(&self, store: &mut impl ZoneStore) -> Result<()> {
        self.validate()?;
        let bytes = postcard::to_allocvec(self).map_err(|_| Error::Config("serialize failed"))?;
        store
            .write(Zone::LinkConfig, &bytes)
            .map_err(|e| Error::StorageFailure(Zone::LinkConfig, e))?;
        info!("Config: link config saved ({} bytes)", bytes.len());
        Ok(())
    }
}
