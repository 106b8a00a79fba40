//! Mock platform adapters for integration tests.
//!
//! Every port call is recorded so tests can assert on the full call
//! history without touching flash, the radio or the network.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use cloudlink::Zone;
use cloudlink::app::events::LinkEvent;
use cloudlink::app::ports::{
    AccessPoint, BrokerClient, BrokerError, BrokerEvents, ClientOption, EventSink, RadioDriver, RadioError,
    Security, StorageError, UsageReporter, ZoneStore,
};
use cloudlink::session::message::{
    ConfirmationResult, Disposition, InboundMessage, Property, ReceivedMessage, TrackingId,
};
use cloudlink::session::SessionHandler;

pub const CONNECTION_STRING: &str = "HostName=hub.example.net;DeviceId=sensor-01;SharedAccessKey=c2VjcmV0a2V5";

pub const CA_PEM: &[u8] = b"-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIUQ2xvdWRMaW5r\n-----END CERTIFICATE-----\n";

// ── MockZones ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockZones {
    pub data: HashMap<Zone, Vec<u8>>,
    pub failing: HashMap<Zone, i32>,
    pub reads: RefCell<Vec<Zone>>,
}

#[allow(dead_code)]
impl MockZones {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fully provisioned device.
    pub fn provisioned() -> Self {
        Self::new()
            .with(Zone::WifiSsid, b"HomeNet")
            .with(Zone::WifiPassword, b"password1")
            .with(Zone::ConnectionString, CONNECTION_STRING.as_bytes())
    }

    pub fn with(mut self, zone: Zone, value: &[u8]) -> Self {
        self.data.insert(zone, value.to_vec());
        self
    }

    pub fn failing(mut self, zone: Zone, code: i32) -> Self {
        self.failing.insert(zone, code);
        self
    }

    pub fn reads_of(&self, zone: Zone) -> usize {
        self.reads.borrow().iter().filter(|z| **z == zone).count()
    }
}

impl ZoneStore for MockZones {
    fn read(&self, zone: Zone, offset: usize, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.reads.borrow_mut().push(zone);
        if let Some(code) = self.failing.get(&zone) {
            return Err(StorageError::Io(*code));
        }
        let Some(value) = self.data.get(&zone) else {
            return Ok(0);
        };
        let tail = value.get(offset..).unwrap_or(&[]);
        let n = tail.len().min(buf.len());
        buf[..n].copy_from_slice(&tail[..n]);
        Ok(n)
    }

    fn write(&mut self, zone: Zone, data: &[u8]) -> Result<(), StorageError> {
        self.data.insert(zone, data.to_vec());
        Ok(())
    }
}

// ── MockRadio ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Connect { ssid: String, password: String, security: Security },
    StartAp { ssid: String },
    Scan,
}

#[derive(Default)]
pub struct MockRadio {
    pub calls: Rc<RefCell<Vec<RadioCall>>>,
    pub fail_with: Option<RadioError>,
    pub visible: Vec<AccessPoint>,
    pub rssi: i32,
}

#[allow(dead_code)]
impl MockRadio {
    pub fn new() -> Self {
        Self {
            rssi: -50,
            ..Self::default()
        }
    }

    /// Shared call log, readable after the radio moved into the link.
    pub fn log(&self) -> Rc<RefCell<Vec<RadioCall>>> {
        Rc::clone(&self.calls)
    }

    pub fn failing(mut self, e: RadioError) -> Self {
        self.fail_with = Some(e);
        self
    }

    pub fn with_visible(mut self, ssid: &str, rssi: i8) -> Self {
        let mut ap = AccessPoint {
            rssi,
            security: Security::WpaWpa2,
            ..AccessPoint::default()
        };
        ap.ssid.push_str(ssid).unwrap();
        self.visible.push(ap);
        self
    }
}

impl RadioDriver for MockRadio {
    fn connect_station(
        &mut self,
        ssid: &str,
        password: &str,
        security: Security,
        _timeout_ms: u32,
    ) -> Result<(), RadioError> {
        self.calls.borrow_mut().push(RadioCall::Connect {
            ssid: ssid.into(),
            password: password.into(),
            security,
        });
        self.fail_with.map_or(Ok(()), Err)
    }

    fn start_access_point(&mut self, ssid: &str, _passphrase: &str, _security: Security) -> Result<(), RadioError> {
        self.calls.borrow_mut().push(RadioCall::StartAp { ssid: ssid.into() });
        self.fail_with.map_or(Ok(()), Err)
    }

    fn scan(&mut self, out: &mut [AccessPoint]) -> usize {
        self.calls.borrow_mut().push(RadioCall::Scan);
        let n = self.visible.len().min(out.len());
        out[..n].clone_from_slice(&self.visible[..n]);
        n
    }

    fn rssi(&self) -> i32 {
        self.rssi
    }
}

// ── MockBroker ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    SetOption(&'static str),
    SetMessageCallback,
    Create(Vec<u8>),
    Send(TrackingId),
}

/// Scripted inbound message.
#[derive(Debug, Clone, Default)]
pub struct Inject {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub body: Option<Vec<u8>>,
    pub properties: Vec<(String, String)>,
}

/// Shared view of what the broker did, kept alive after the broker moves
/// into the session.
#[derive(Default)]
pub struct BrokerLog {
    pub calls: RefCell<Vec<BrokerCall>>,
    /// Message handles released (dropped) so far, by tracking id.
    pub released: RefCell<Vec<u32>>,
    pub live: Cell<i32>,
    pub dispositions: RefCell<Vec<Disposition>>,
}

#[allow(dead_code)]
impl BrokerLog {
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.borrow().clone()
    }

    pub fn released(&self) -> Vec<u32> {
        self.released.borrow().clone()
    }

    pub fn count(&self, call: &BrokerCall) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }
}

/// Message handle that records its own release.
pub struct MockMessage {
    pub payload: Vec<u8>,
    tracking: Cell<Option<u32>>,
    log: Rc<BrokerLog>,
}

impl Drop for MockMessage {
    fn drop(&mut self) {
        self.log.live.set(self.log.live.get() - 1);
        if let Some(t) = self.tracking.get() {
            self.log.released.borrow_mut().push(t);
        }
    }
}

pub struct MockBroker {
    pub log: Rc<BrokerLog>,
    pub fail_trust: bool,
    pub fail_logtrace: bool,
    pub fail_callback: bool,
    pub fail_create: bool,
    pub fail_submit: bool,
    /// Ids the client accepted and has not confirmed yet.
    pub unconfirmed: Vec<TrackingId>,
    /// Confirmations released on the next `do_work`, in this order.
    pub script: VecDeque<(TrackingId, ConfirmationResult)>,
    pub inbound: VecDeque<Inject>,
    /// Automatically confirm everything accepted, in submission order.
    pub auto_confirm: bool,
}

#[allow(dead_code)]
impl MockBroker {
    pub fn new() -> Self {
        Self {
            log: Rc::new(BrokerLog::default()),
            fail_trust: false,
            fail_logtrace: false,
            fail_callback: false,
            fail_create: false,
            fail_submit: false,
            unconfirmed: Vec::new(),
            script: VecDeque::new(),
            inbound: VecDeque::new(),
            auto_confirm: false,
        }
    }

    pub fn log(&self) -> Rc<BrokerLog> {
        Rc::clone(&self.log)
    }
}

impl BrokerClient for MockBroker {
    type Message = MockMessage;

    fn set_option(&mut self, option: ClientOption<'_>) -> Result<(), BrokerError> {
        self.log.calls.borrow_mut().push(BrokerCall::SetOption(option.name()));
        match option {
            ClientOption::TrustedCerts(_) if self.fail_trust => Err(BrokerError::Library(-3)),
            ClientOption::LogTrace(_) if self.fail_logtrace => Err(BrokerError::InvalidArg),
            _ => Ok(()),
        }
    }

    fn set_message_callback(&mut self) -> Result<(), BrokerError> {
        self.log.calls.borrow_mut().push(BrokerCall::SetMessageCallback);
        if self.fail_callback {
            return Err(BrokerError::Library(-4));
        }
        Ok(())
    }

    fn create_message(&mut self, payload: &[u8]) -> Result<MockMessage, BrokerError> {
        self.log.calls.borrow_mut().push(BrokerCall::Create(payload.to_vec()));
        if self.fail_create {
            return Err(BrokerError::OutOfMemory);
        }
        self.log.live.set(self.log.live.get() + 1);
        Ok(MockMessage {
            payload: payload.to_vec(),
            tracking: Cell::new(None),
            log: Rc::clone(&self.log),
        })
    }

    fn send_event_async(&mut self, message: &MockMessage, tracking: TrackingId) -> Result<(), BrokerError> {
        self.log.calls.borrow_mut().push(BrokerCall::Send(tracking));
        message.tracking.set(Some(tracking.0));
        if self.fail_submit {
            return Err(BrokerError::NotConnected);
        }
        self.unconfirmed.push(tracking);
        if self.auto_confirm {
            self.script.push_back((tracking, ConfirmationResult::Ok));
        }
        Ok(())
    }

    fn do_work(&mut self, events: &mut dyn BrokerEvents) {
        while let Some((tracking, result)) = self.script.pop_front() {
            self.unconfirmed.retain(|t| *t != tracking);
            events.on_confirmation(tracking, result);
        }
        while let Some(msg) = self.inbound.pop_front() {
            let props: Vec<Property<'_>> = msg
                .properties
                .iter()
                .map(|(k, v)| Property { key: k, value: v })
                .collect();
            let disposition = events.on_message(&InboundMessage {
                message_id: msg.message_id.as_deref(),
                correlation_id: msg.correlation_id.as_deref(),
                body: msg.body.as_deref().ok_or(BrokerError::Library(-7)),
                properties: Some(&props),
            });
            self.log.dispositions.borrow_mut().push(disposition);
        }
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<LinkEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &LinkEvent) {
        self.events.push(event.clone());
    }
}

// ── MockReporter ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockReporter {
    pub inits: usize,
    pub records: Vec<(String, String, String)>,
}

impl UsageReporter for MockReporter {
    fn init(&mut self) {
        self.inits += 1;
    }

    fn send_sync(&mut self, event: &str, category: &str, message: &str) {
        self.records.push((event.into(), category.into(), message.into()));
    }
}

// ── RecordingHandler ──────────────────────────────────────────

/// What the handler saw of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub message_id: String,
    pub correlation_id: String,
    pub payload: Option<Vec<u8>>,
    pub properties: Vec<(String, String)>,
}

#[derive(Default)]
pub struct RecordingHandler {
    pub confirmations: Vec<(TrackingId, ConfirmationResult)>,
    pub messages: Vec<Seen>,
    /// Verdict returned for every message.
    pub verdict: Disposition,
}

impl SessionHandler for RecordingHandler {
    fn on_confirmation(&mut self, tracking: TrackingId, result: ConfirmationResult) {
        self.confirmations.push((tracking, result));
    }

    fn on_message(&mut self, message: &ReceivedMessage<'_>) -> Disposition {
        self.messages.push(Seen {
            message_id: message.message_id.into(),
            correlation_id: message.correlation_id.into(),
            payload: message.payload.map(<[u8]>::to_vec),
            properties: message
                .properties
                .iter()
                .map(|p| (p.key.to_owned(), p.value.to_owned()))
                .collect(),
        });
        self.verdict
    }
}
