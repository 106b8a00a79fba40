//! Link manager — owns the Wi-Fi interface and drives its lifecycle.
//!
//! ```text
//!                 ┌──▶ Connecting ──▶ Connected
//! Uninitialized ──▶ Initialized ─┤          └──▶ Failed
//!                 └──▶ ApStarting ──▶ ApActive
//!                               └──▶ Failed
//! ```
//!
//! Station and soft-AP are mutually exclusive.  `Failed` accepts a new
//! attempt in either mode; retry policy belongs to the caller.
//!
//! The interface object is created once by [`LinkManager::initialize`]
//! and lives for the rest of the process.

use log::{error, info, warn};

use crate::app::events::LinkEvent;
use crate::app::ports::{AccessPoint, EventSink, RadioDriver, RadioError, Security, UsageReporter};
use crate::credentials::{WIFI_SSID_MAX_LEN, WifiCredentials};
use crate::error::{Error, LinkFailure, Result};

// ───────────────────────────────────────────────────────────────
// State
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Uninitialized,
    Initialized,
    Connecting,
    Connected,
    ApStarting,
    ApActive,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Uninitialized,
    Station,
    SoftAp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// 802.11 SSIDs are 1–32 octets of any value; only the length is checked.
fn validate_ssid(ssid: &str) -> core::result::Result<(), LinkFailure> {
    if ssid.is_empty() || ssid.len() > WIFI_SSID_MAX_LEN {
        return Err(LinkFailure::InvalidSsid);
    }
    Ok(())
}

/// WPA/WPA2: 8–63 printable characters, or a raw 64-hex-digit PSK.
/// An empty passphrase is never valid under this policy.
fn validate_passphrase(passphrase: &str) -> core::result::Result<(), LinkFailure> {
    let len = passphrase.len();
    if (8..=63).contains(&len) && is_printable_ascii(passphrase) {
        return Ok(());
    }
    if len == 64 && passphrase.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Ok(());
    }
    Err(LinkFailure::InvalidPassword)
}

// ───────────────────────────────────────────────────────────────
// Link manager
// ───────────────────────────────────────────────────────────────

pub struct LinkManager<R> {
    radio: Option<R>,
    state: LinkState,
    mode: LinkMode,
    ssid: heapless::String<WIFI_SSID_MAX_LEN>,
    connect_timeout_ms: u32,
}

impl<R: RadioDriver> LinkManager<R> {
    pub fn new(connect_timeout_ms: u32) -> Self {
        Self {
            radio: None,
            state: LinkState::Uninitialized,
            mode: LinkMode::Uninitialized,
            ssid: heapless::String::new(),
            connect_timeout_ms,
        }
    }

    /// Create the interface object.  Idempotent: once an interface
    /// exists, `make` is not called again.
    pub fn initialize<F>(&mut self, make: F) -> Result<()>
    where
        F: FnOnce() -> core::result::Result<R, RadioError>,
    {
        if self.radio.is_some() {
            return Ok(());
        }
        match make() {
            Ok(radio) => {
                self.radio = Some(radio);
                self.state = LinkState::Initialized;
                info!("WiFi: interface initialized");
                Ok(())
            }
            Err(e) => {
                error!("WiFi: interface construction failed ({})", e);
                Err(Error::LinkInit(e))
            }
        }
    }

    /// Join the configured network in station mode.
    ///
    /// On success the usage side channel is initialized, one
    /// "Wi-Fi connected" record is sent through it and one
    /// [`LinkEvent::WifiConnected`] is emitted.
    pub fn connect(
        &mut self,
        credentials: &WifiCredentials,
        usage: &mut impl UsageReporter,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        match self.state {
            LinkState::Uninitialized => return Err(LinkFailure::NotInitialized.into()),
            LinkState::Connected => return Err(LinkFailure::AlreadyConnected.into()),
            LinkState::ApStarting | LinkState::ApActive => {
                warn!("WiFi: station connect refused, soft-AP is active");
                return Err(LinkFailure::ModeConflict.into());
            }
            LinkState::Initialized | LinkState::Connecting | LinkState::Failed => {}
        }

        let ssid = credentials.ssid.as_str();
        validate_ssid(ssid).inspect_err(|_| {
            if ssid.is_empty() {
                info!("WiFi: the SSID is empty, please set the value in configuration mode");
            } else {
                error!("WiFi: SSID '{}' is longer than {} bytes", ssid, WIFI_SSID_MAX_LEN);
            }
        })?;
        validate_passphrase(&credentials.password).inspect_err(|_| {
            error!("WiFi: password for '{}' does not satisfy WPA/WPA2", ssid);
        })?;

        let Some(radio) = self.radio.as_mut() else {
            return Err(LinkFailure::NotInitialized.into());
        };

        self.ssid.clone_from(&credentials.ssid);
        self.mode = LinkMode::Station;
        self.state = LinkState::Connecting;
        info!("WiFi: connecting to '{}'", ssid);

        match radio.connect_station(
            ssid,
            &credentials.password,
            Security::WpaWpa2,
            self.connect_timeout_ms,
        ) {
            Ok(()) => {
                self.state = LinkState::Connected;
                info!("WiFi: {} connected", self.ssid);

                // Usage telemetry only once the link is up.
                usage.init();
                usage.send_sync("", "wifi", "Wi-Fi connected");
                sink.emit(&LinkEvent::WifiConnected {
                    ssid: self.ssid.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.state = LinkState::Failed;
                error!("WiFi: failed to connect Wi-Fi {} ({})", self.ssid, e);
                sink.emit(&LinkEvent::WifiFailed {
                    ssid: self.ssid.clone(),
                });
                Err(LinkFailure::Radio(e).into())
            }
        }
    }

    /// Bring up a soft access point.  Mutually exclusive with station mode.
    pub fn start_access_point(
        &mut self,
        ssid: &str,
        passphrase: &str,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        match self.state {
            LinkState::Uninitialized => return Err(LinkFailure::NotInitialized.into()),
            LinkState::Connecting | LinkState::Connected => {
                warn!("WiFi: soft-AP refused, station mode is active");
                return Err(LinkFailure::ModeConflict.into());
            }
            LinkState::ApActive => return Err(LinkFailure::AlreadyConnected.into()),
            LinkState::Initialized | LinkState::ApStarting | LinkState::Failed => {}
        }

        validate_ssid(ssid)?;
        validate_passphrase(passphrase)?;

        let Some(radio) = self.radio.as_mut() else {
            return Err(LinkFailure::NotInitialized.into());
        };

        self.ssid.clear();
        // Length already validated against the buffer.
        let _ = self.ssid.push_str(ssid);
        self.mode = LinkMode::SoftAp;
        self.state = LinkState::ApStarting;

        match radio.start_access_point(ssid, passphrase, Security::WpaWpa2) {
            Ok(()) => {
                self.state = LinkState::ApActive;
                info!("WiFi: AP mode {} started", self.ssid);
                sink.emit(&LinkEvent::AccessPointStarted {
                    ssid: self.ssid.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.state = LinkState::Failed;
                error!("WiFi: failed to start AP for {} ({})", self.ssid, e);
                Err(LinkFailure::Radio(e).into())
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    pub fn status(&self) -> LinkStatus {
        match self.state {
            LinkState::Uninitialized | LinkState::Initialized => LinkStatus::Disconnected,
            LinkState::Connecting | LinkState::ApStarting => LinkStatus::Connecting,
            LinkState::Connected | LinkState::ApActive => LinkStatus::Connected,
            LinkState::Failed => LinkStatus::Failed,
        }
    }

    /// Status of the station branch; `Disconnected` while in soft-AP mode.
    pub fn station_status(&self) -> LinkStatus {
        match self.mode {
            LinkMode::Station => self.status(),
            LinkMode::Uninitialized | LinkMode::SoftAp => LinkStatus::Disconnected,
        }
    }

    /// Station mode is associated.
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// SSID of the current (or last attempted) network; empty while
    /// disconnected.
    pub fn ssid(&self) -> &str {
        if self.status() == LinkStatus::Disconnected {
            return "";
        }
        &self.ssid
    }

    /// RSSI in dBm, `None` before the interface exists.
    pub fn rssi(&self) -> Option<i32> {
        self.radio.as_ref().map(RadioDriver::rssi)
    }

    /// Scan for networks.  Returns 0 before the interface exists.
    pub fn scan(&mut self, out: &mut [AccessPoint]) -> usize {
        match self.radio.as_mut() {
            Some(radio) => radio.scan(out).min(out.len()),
            None => 0,
        }
    }

    /// The interface object, once initialized.
    pub fn interface(&self) -> Option<&R> {
        self.radio.as_ref()
    }

    pub fn interface_mut(&mut self) -> Option<&mut R> {
        self.radio.as_mut()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
