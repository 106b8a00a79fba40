//! Port traits — the hexagonal boundary between the connectivity core and
//! the platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ CloudLink (domain)
//! ```
//!
//! Driven adapters (zone storage, radio, broker client, usage reporting,
//! event sinks) implement these traits.  [`CloudLink`](super::service::CloudLink)
//! consumes them via generics, so the core never touches ESP-IDF directly
//! and every path is testable with host mocks.
//!
//! All port errors are small `Copy` types; the core converts them into
//! [`crate::Error`] and logs them.  Nothing structured crosses back out.

use core::fmt;

use crate::error::Zone;
use crate::session::message::{ConfirmationResult, Disposition, InboundMessage, TrackingId};
use crate::trust::TrustBundle;

// ───────────────────────────────────────────────────────────────
// Zone store (driven adapter: domain ↔ secure storage)
// ───────────────────────────────────────────────────────────────

/// Persistent storage split into fixed, named zones.
///
/// Contract:
/// - `read` copies at most `buf.len()` bytes and never writes past it.
/// - An absent or blank zone reads as `Ok(0)`, never as an error.
/// - `Err` is reserved for media / driver failures.
pub trait ZoneStore {
    /// Read `zone` starting at `offset` into `buf`.  Returns bytes copied.
    fn read(&self, zone: Zone, offset: usize, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Replace the content of `zone` atomically.
    fn write(&mut self, zone: Zone, data: &[u8]) -> Result<(), StorageError>;
}

/// Errors from [`ZoneStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Driver-level I/O failure with the platform error code.
    Io(i32),
    /// Data does not fit the zone or the caller's buffer.
    OutOfBounds,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(code) => write!(f, "I/O error ({code})"),
            Self::OutOfBounds => write!(f, "out of bounds"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Radio driver (driven adapter: domain → Wi-Fi hardware)
// ───────────────────────────────────────────────────────────────

/// Link-layer security policy.  The core only ever requests
/// [`Security::WpaWpa2`]; the other values describe scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    #[default]
    Open,
    Wep,
    WpaWpa2,
    Wpa3,
    Unknown,
}

/// One scan result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: heapless::String<32>,
    pub bssid: [u8; 6],
    pub rssi: i8,
    pub channel: u8,
    pub security: Security,
}

/// The Wi-Fi interface object.  Exactly one exists per process; the
/// [`LinkManager`](crate::link::LinkManager) owns it.
pub trait RadioDriver {
    /// Join `ssid` in station mode.  `timeout_ms == 0` means the driver default.
    fn connect_station(
        &mut self,
        ssid: &str,
        password: &str,
        security: Security,
        timeout_ms: u32,
    ) -> Result<(), RadioError>;

    /// Bring up a soft access point.
    fn start_access_point(
        &mut self,
        ssid: &str,
        passphrase: &str,
        security: Security,
    ) -> Result<(), RadioError>;

    /// Fill `out` with visible networks.  Returns the number written.
    fn scan(&mut self, out: &mut [AccessPoint]) -> usize;

    /// Signal strength of the current association in dBm.
    fn rssi(&self) -> i32;
}

/// Errors from [`RadioDriver`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// Driver returned a non-zero status code.
    Driver(i32),
    /// The association did not complete within the timeout.
    Timeout,
    /// The driver cannot represent the request (e.g. SSID encoding).
    Unsupported,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(code) => write!(f, "driver error {code}"),
            Self::Timeout => write!(f, "timed out"),
            Self::Unsupported => write!(f, "unsupported request"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Broker client (driven adapter: domain ↔ message broker)
// ───────────────────────────────────────────────────────────────

/// Transport protocol selector passed when the client is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Mqtt,
}

/// Options understood by [`BrokerClient::set_option`].
#[derive(Debug, Clone, Copy)]
pub enum ClientOption<'a> {
    /// Verbose protocol tracing in the client library.
    LogTrace(bool),
    /// CA bundle used to authenticate the broker.
    TrustedCerts(&'a TrustBundle),
}

impl ClientOption<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LogTrace(_) => "logtrace",
            Self::TrustedCerts(_) => "TrustedCerts",
        }
    }
}

/// The broker client library, single-threaded "lower layer" style: no
/// work happens except inside [`do_work`](Self::do_work).
pub trait BrokerClient {
    /// Library-owned message handle.  Dropping it releases the message.
    type Message;

    fn set_option(&mut self, option: ClientOption<'_>) -> Result<(), BrokerError>;

    /// Enable delivery of cloud-to-device messages to
    /// [`BrokerEvents::on_message`].
    fn set_message_callback(&mut self) -> Result<(), BrokerError>;

    /// Build a message handle from raw payload bytes.
    fn create_message(&mut self, payload: &[u8]) -> Result<Self::Message, BrokerError>;

    /// Queue `message` for transmission.  `tracking` is handed back in
    /// [`BrokerEvents::on_confirmation`] exactly once if this returns `Ok`,
    /// and never if it returns `Err`.
    fn send_event_async(
        &mut self,
        message: &Self::Message,
        tracking: TrackingId,
    ) -> Result<(), BrokerError>;

    /// Advance transport I/O and dispatch due callbacks into `events`.
    /// Must not block.
    fn do_work(&mut self, events: &mut dyn BrokerEvents);
}

/// Callback surface the broker client drives from inside `do_work`.
pub trait BrokerEvents {
    fn on_confirmation(&mut self, tracking: TrackingId, result: ConfirmationResult);

    /// Called once per inbound message.  The message is only valid for the
    /// duration of the call.
    fn on_message(&mut self, message: &InboundMessage<'_>) -> Disposition;
}

/// Errors from [`BrokerClient`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    InvalidArg,
    OutOfMemory,
    /// The library reported an error with the given code.
    Library(i32),
    NotConnected,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg => write!(f, "invalid argument"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Library(code) => write!(f, "client error {code}"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Usage reporter (driven adapter: domain → telemetry side channel)
// ───────────────────────────────────────────────────────────────

/// Product usage telemetry, separate from application messages.
/// Fire-and-forget: implementations swallow their own failures.
pub trait UsageReporter {
    fn init(&mut self);

    fn send_sync(&mut self, event: &str, category: &str, message: &str);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / UI)
// ───────────────────────────────────────────────────────────────

/// The core emits [`LinkEvent`](super::events::LinkEvent)s through this
/// port.  Adapters decide where they go (serial log, status LED, ...).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::LinkEvent);
}
