//! CloudLink connectivity core.
//!
//! Brings a device online from persisted credentials (Wi-Fi, then a
//! broker session) and exchanges telemetry and cloud-to-device messages
//! over that session.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each adapter; every other target
//! gets simulation backends so the core is testable on the host.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod connection_string;
pub mod credentials;
pub mod error;
pub mod link;
pub mod sas;
pub mod session;
pub mod trust;

pub mod adapters;

pub use error::{Error, Result, Zone};
