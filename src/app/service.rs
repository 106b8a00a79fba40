//! Application service — the single owning context of the connectivity core.
//!
//! [`CloudLink`] replaces every process-wide handle (interface object,
//! session handle, SSID buffer) with one value the caller owns and passes
//! around explicitly.  All I/O flows through port traits, so the whole
//! bootstrap path is testable with mock adapters.
//!
//! ```text
//!  ZoneStore ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                │          CloudLink            │
//! RadioDriver ◀──│ Credentials · Link · Session  │──▶ UsageReporter
//!                └──────────────────────────────┘
//!                               │
//!                        BrokerClient
//! ```
//!
//! Bootstrap order is Wi-Fi first, then the session.  Every step aborts
//! only itself; retrying is the caller's decision.

use log::{error, info, warn};

use crate::config::LinkConfig;
use crate::connection_string::ConnectionString;
use crate::credentials::CredentialStore;
use crate::error::{Error, Result, Zone};
use crate::link::{LinkManager, LinkStatus};
use crate::session::message::TrackingId;
use crate::session::{MessageSession, SessionHandler, SessionStats};
use crate::trust::TrustBundle;

use super::events::{LinkEvent, TelemetryData};
use super::ports::{
    AccessPoint, BrokerClient, BrokerError, EventSink, Protocol, RadioDriver, RadioError, UsageReporter,
    ZoneStore,
};

// ───────────────────────────────────────────────────────────────
// CloudLink
// ───────────────────────────────────────────────────────────────

pub struct CloudLink<S, R, C: BrokerClient, H> {
    config: LinkConfig,
    credentials: CredentialStore<S>,
    link: LinkManager<R>,
    session: MessageSession<C, H>,
    device_id: heapless::String<64>,
}

impl<S, R, C, H> CloudLink<S, R, C, H>
where
    S: ZoneStore,
    R: RadioDriver,
    C: BrokerClient,
    H: SessionHandler,
{
    /// Nothing is touched until the first `init_wifi`.
    pub fn new(config: LinkConfig, store: S, handler: H) -> Self {
        let link = LinkManager::new(config.connect_timeout_ms);
        let session = MessageSession::new(&config, handler);
        Self {
            config,
            credentials: CredentialStore::new(store),
            link,
            session,
            device_id: heapless::String::new(),
        }
    }

    // ── Link ──────────────────────────────────────────────────

    /// Construct the network interface.  Idempotent.
    pub fn init_wifi<F>(&mut self, make: F) -> Result<()>
    where
        F: FnOnce() -> core::result::Result<R, RadioError>,
    {
        self.link.initialize(make)
    }

    /// Read the Wi-Fi credentials and join the network.
    ///
    /// An empty SSID zone fails with [`Error::ConfigMissing`] before the
    /// radio is touched.
    pub fn connect_wifi(&mut self, usage: &mut impl UsageReporter, sink: &mut impl EventSink) -> Result<()> {
        let credentials = self.credentials.wifi_credentials()?;
        self.link.connect(&credentials, usage, sink)
    }

    /// Configuration-mode access point.
    pub fn start_access_point(&mut self, ssid: &str, passphrase: &str, sink: &mut impl EventSink) -> Result<()> {
        self.link.start_access_point(ssid, passphrase, sink)
    }

    // ── Session ───────────────────────────────────────────────

    /// Read the connection string and bring up the broker session.
    ///
    /// Emits [`LinkEvent::SessionReady`] or [`LinkEvent::SessionFailed`]
    /// once per attempt.  A ready session returns immediately.
    pub fn bootstrap_session<F>(&mut self, trust: &TrustBundle, connect: F, sink: &mut impl EventSink) -> Result<()>
    where
        F: FnOnce(&ConnectionString, Protocol) -> core::result::Result<C, BrokerError>,
    {
        if self.session.is_ready() {
            return Ok(());
        }
        match self.try_bootstrap(trust, connect) {
            Ok(()) => {
                sink.emit(&LinkEvent::SessionReady);
                Ok(())
            }
            Err(e) => {
                sink.emit(&LinkEvent::SessionFailed(e));
                Err(e)
            }
        }
    }

    fn try_bootstrap<F>(&mut self, trust: &TrustBundle, connect: F) -> Result<()>
    where
        F: FnOnce(&ConnectionString, Protocol) -> core::result::Result<C, BrokerError>,
    {
        let status = self.link.station_status();
        if status != LinkStatus::Connected {
            warn!("CloudLink: session bootstrap needs a Wi-Fi connection ({:?})", status);
            return Err(Error::LinkNotConnected);
        }

        let raw = self
            .credentials
            .connection_string()
            .into_result(Zone::ConnectionString)
            .inspect_err(|e| error!("Store: failed to get the connection string ({})", e))?;
        let connection = ConnectionString::parse(raw.as_str()?)
            .inspect_err(|e| error!("Store: connection string rejected ({})", e))?;

        self.session.bootstrap(status, &connection, trust, connect)?;

        self.device_id.clear();
        if self.device_id.push_str(connection.device_id()).is_err() {
            warn!("CloudLink: device id longer than 64 bytes, telemetry will omit it");
        }
        Ok(())
    }

    /// Submit an application message.  See [`MessageSession::send`].
    pub fn send(&mut self, payload: &[u8]) -> Result<TrackingId> {
        self.session.send(payload)
    }

    /// Serialize a [`TelemetryData`] snapshot and send it.
    pub fn send_telemetry(&mut self, uptime_secs: u64) -> Result<TrackingId> {
        let payload = self.telemetry(uptime_secs).to_json();
        let tracking = self.session.send(&payload)?;
        info!("CloudLink: telemetry {} queued ({}B)", tracking, payload.len());
        Ok(tracking)
    }

    /// Drive broker I/O.  Call on a steady cadence.
    pub fn pump(&mut self) -> Result<()> {
        self.session.pump()
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn telemetry(&self, uptime_secs: u64) -> TelemetryData {
        let mut ssid = heapless::String::new();
        // Bounded by the link's own buffer.
        let _ = ssid.push_str(self.link.ssid());
        TelemetryData {
            device_id: self.device_id.clone(),
            ssid,
            rssi: self.rssi(),
            uptime_secs,
            in_flight: self.session.stats().in_flight,
        }
    }

    pub fn link_status(&self) -> LinkStatus {
        self.link.status()
    }

    pub fn is_session_ready(&self) -> bool {
        self.session.is_ready()
    }

    pub fn ssid(&self) -> &str {
        self.link.ssid()
    }

    pub fn rssi(&self) -> Option<i32> {
        self.link.rssi()
    }

    pub fn scan(&mut self, out: &mut [AccessPoint]) -> usize {
        self.link.scan(out)
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Persist `config`.  Takes effect on the next boot.
    pub fn save_config(&mut self, config: &LinkConfig) -> Result<()> {
        config.save(self.credentials.store_mut())
    }

    pub fn link(&self) -> &LinkManager<R> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut LinkManager<R> {
        &mut self.link
    }

    pub fn session(&self) -> &MessageSession<C, H> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MessageSession<C, H> {
        &mut self.session
    }

    pub fn credentials(&self) -> &CredentialStore<S> {
        &self.credentials
    }
}
