//! Application core — connectivity orchestration, zero platform I/O.
//!
//! All interaction with storage, radio and broker happens through the
//! **port traits** in [`ports`]; [`service::CloudLink`] ties the credential
//! store, link manager and message session together.

pub mod events;
pub mod ports;
pub mod service;
