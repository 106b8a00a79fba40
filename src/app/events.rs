//! Outbound lifecycle events.
//!
//! [`CloudLink`](super::service::CloudLink) and the
//! [`LinkManager`](crate::link::LinkManager) emit these through the
//! [`EventSink`](super::ports::EventSink) port.

use crate::error::Error;

/// Structured events emitted by the connectivity core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Station mode joined the network.  Emitted once per successful connect.
    WifiConnected { ssid: heapless::String<32> },

    /// Station connect was attempted and failed.
    WifiFailed { ssid: heapless::String<32> },

    /// Soft access point is up.
    AccessPointStarted { ssid: heapless::String<32> },

    /// The broker session finished bootstrap and accepts sends.
    SessionReady,

    /// Bootstrap of the broker session was aborted.
    SessionFailed(Error),
}

/// A point-in-time link snapshot, serialized as the device-to-cloud
/// telemetry payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TelemetryData {
    #[serde(rename = "deviceId")]
    pub device_id: heapless::String<64>,
    pub ssid: heapless::String<32>,
    /// dBm, absent while the interface is down.
    pub rssi: Option<i32>,
    #[serde(rename = "uptimeSecs")]
    pub uptime_secs: u64,
    /// Messages still awaiting confirmation.
    #[serde(rename = "inFlight")]
    pub in_flight: u16,
}

impl TelemetryData {
    pub fn to_json(&self) -> Vec<u8> {
        // Serializing plain strings and integers cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}
