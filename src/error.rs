//! Unified error types for the connectivity core.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! bootstrap sequence and the caller's main loop handle failures uniformly.
//! All variants are `Copy`: errors are logged and dropped, never carried
//! across the external interfaces.

use core::fmt;

use crate::app::ports::{BrokerError, RadioError, StorageError};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
///
/// Each variant aborts only the operation that produced it (bootstrap,
/// connect or send). None of them is a reason to stop the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A credential zone is empty. The user must configure the device.
    ConfigMissing(Zone),
    /// A configuration value is present but unusable.
    Config(&'static str),
    /// Persistent storage failed while reading a zone.
    StorageFailure(Zone, StorageError),
    /// The network interface could not be constructed.
    LinkInit(RadioError),
    /// Station connect or soft-AP start failed.
    LinkConnect(LinkFailure),
    /// The session requires a connected link.
    LinkNotConnected,
    /// The trust bundle could not be installed on the broker client.
    TrustConfig(BrokerError),
    /// The broker client could not be created or wired.
    SessionInit(BrokerError),
    /// A session operation was attempted before a successful bootstrap.
    NotReady,
    /// An outbound message was not accepted. No confirmation follows.
    Send(SendFailure),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigMissing(zone) => write!(f, "{zone} is not configured"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::StorageFailure(zone, e) => write!(f, "storage: reading {zone} failed: {e}"),
            Self::LinkInit(e) => write!(f, "link init: {e}"),
            Self::LinkConnect(e) => write!(f, "link connect: {e}"),
            Self::LinkNotConnected => write!(f, "link is not connected"),
            Self::TrustConfig(e) => write!(f, "trusted certs: {e}"),
            Self::SessionInit(e) => write!(f, "session init: {e}"),
            Self::NotReady => write!(f, "session is not ready"),
            Self::Send(e) => write!(f, "send: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Storage zones
// ---------------------------------------------------------------------------

/// Named persistent storage regions, one configuration value each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    WifiSsid,
    WifiPassword,
    ConnectionString,
    LinkConfig,
    TrustedCerts,
}

impl Zone {
    /// Zone index as laid out in the device's secure storage.
    pub const fn index(self) -> u8 {
        match self {
            Self::WifiSsid => 0x03,
            Self::ConnectionString => 0x05,
            Self::WifiPassword => 0x0A,
            Self::LinkConfig => 0x0C,
            Self::TrustedCerts => 0x0D,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WifiSsid => write!(f, "Wi-Fi SSID"),
            Self::WifiPassword => write!(f, "Wi-Fi password"),
            Self::ConnectionString => write!(f, "connection string"),
            Self::LinkConfig => write!(f, "link config"),
            Self::TrustedCerts => write!(f, "trusted certificates"),
        }
    }
}

// ---------------------------------------------------------------------------
// Link failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
    /// `initialize()` has not succeeded yet.
    NotInitialized,
    /// SSID empty or longer than 32 bytes.
    InvalidSsid,
    /// WPA/WPA2 requires an 8–63 character passphrase.
    InvalidPassword,
    /// The other mode (station / soft-AP) is already active.
    ModeConflict,
    /// Station mode is already connected.
    AlreadyConnected,
    /// The radio driver rejected the request.
    Radio(RadioError),
}

impl fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "interface not initialized"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 bytes)"),
            Self::InvalidPassword => write!(f, "passphrase invalid (WPA/WPA2 needs 8-63 characters)"),
            Self::ModeConflict => write!(f, "interface busy in the other mode"),
            Self::AlreadyConnected => write!(f, "already connected"),
            Self::Radio(e) => write!(f, "radio: {e}"),
        }
    }
}

impl From<LinkFailure> for Error {
    fn from(e: LinkFailure) -> Self {
        Self::LinkConnect(e)
    }
}

// ---------------------------------------------------------------------------
// Send failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The message could not be constructed (e.g. out of memory).
    Create(BrokerError),
    /// The broker client refused the submission.
    Submit(BrokerError),
    /// Too many messages are still awaiting confirmation.
    OutboxFull,
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(e) => write!(f, "message create failed: {e}"),
            Self::Submit(e) => write!(f, "send_event_async failed: {e}"),
            Self::OutboxFull => write!(f, "too many unconfirmed messages"),
        }
    }
}

impl From<SendFailure> for Error {
    fn from(e: SendFailure) -> Self {
        Self::Send(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
