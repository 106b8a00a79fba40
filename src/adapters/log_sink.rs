//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing link lifecycle events to the
//! console logger (UART / USB-CDC on the device).

use log::{error, info, warn};

use crate::app::events::LinkEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`LinkEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &LinkEvent) {
        match event {
            LinkEvent::WifiConnected { ssid } => info!("WIFI  | {} connected", ssid),
            LinkEvent::WifiFailed { ssid } => warn!("WIFI  | {} failed", ssid),
            LinkEvent::AccessPointStarted { ssid } => info!("AP    | {} started", ssid),
            LinkEvent::SessionReady => info!("CLOUD | session ready"),
            LinkEvent::SessionFailed(e) => error!("CLOUD | session failed: {}", e),
        }
    }
}
