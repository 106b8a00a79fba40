//! MQTT broker adapter.
//!
//! Implements [`BrokerClient`] for an IoT-hub style MQTT broker:
//!
//! | Direction       | Topic                                             | QoS |
//! |-----------------|---------------------------------------------------|-----|
//! | device → cloud  | `devices/{id}/messages/events/`                   | 1   |
//! | cloud → device  | `devices/{id}/messages/devicebound/{property-bag}`| 1   |
//!
//! The property bag is a URL-encoded `k=v&k=v` list; `$.mid` and `$.cid`
//! carry the message and correlation ids.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspMqttClient` over TLS.  The client
//!   task delivers events through a bounded channel that [`do_work`]
//!   drains, so every callback still runs in the caller's context.  When
//!   the channel is full the event is dropped and logged; an unconfirmed
//!   publish then resolves as a timeout.
//! - **all other targets**: a loopback broker that acknowledges every
//!   publish on the next `do_work` and lets tests inject cloud-to-device
//!   messages.
//!
//! [`do_work`]: BrokerClient::do_work

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info, warn};

use crate::app::ports::{BrokerClient, BrokerError, BrokerEvents, ClientOption, Protocol};
use crate::connection_string::ConnectionString;
use crate::sas;
use crate::session::message::{Disposition, InboundMessage, Property, TrackingId};

#[cfg(not(target_os = "espidf"))]
use std::collections::VecDeque;

#[cfg(target_os = "espidf")]
use crate::session::message::ConfirmationResult;
#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    mqtt::client::{Details, EspMqttClient, EventPayload, MqttClientConfiguration, MqttProtocolVersion, QoS},
    tls::X509,
};
#[cfg(target_os = "espidf")]
use std::sync::Arc;
#[cfg(target_os = "espidf")]
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Callbacks dispatched per `do_work` call.
const MAX_EVENTS_PER_WORK: usize = 8;

/// Events buffered between the client task and `do_work`.
pub const EVENT_QUEUE_DEPTH: usize = 16;

type EventQueue<T> = Channel<CriticalSectionRawMutex, T, EVENT_QUEUE_DEPTH>;

/// Application properties kept per inbound message.
pub const MAX_PROPERTIES: usize = 16;

/// Largest device-to-cloud payload the broker accepts.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

#[cfg(target_os = "espidf")]
const MQTT_PORT: u16 = 8883;

/// Unacknowledged publishes older than this are confirmed as timed out.
#[cfg(target_os = "espidf")]
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound message handle.  Dropping it releases the payload.
#[derive(Debug)]
pub struct MqttMessage {
    payload: Vec<u8>,
}

impl MqttMessage {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

// ───────────────────────────────────────────────────────────────
// Property bag
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq, Eq)]
struct PropertyBag {
    message_id: Option<String>,
    correlation_id: Option<String>,
    /// Application properties in topic order, keys unique.
    properties: Vec<(String, String)>,
}

fn parse_property_bag(topic: &str) -> PropertyBag {
    const MARKER: &str = "/messages/devicebound/";
    let mut bag = PropertyBag::default();
    let Some(start) = topic.find(MARKER) else {
        return bag;
    };
    for pair in topic[start + MARKER.len()..].split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let key = sas::url_decode(k);
        let value = sas::url_decode(v);
        match key.as_str() {
            "$.mid" => bag.message_id = Some(value),
            "$.cid" => bag.correlation_id = Some(value),
            // Remaining system properties ($.to, $.ct, ...) are not surfaced.
            k if k.starts_with("$.") => {}
            _ if bag.properties.iter().any(|(existing, _)| *existing == key) => {}
            _ if bag.properties.len() >= MAX_PROPERTIES => {
                warn!("Broker: property '{}' dropped, more than {} on one message", key, MAX_PROPERTIES);
            }
            _ => bag.properties.push((key, value)),
        }
    }
    bag
}

/// Hand one inbound publish to the session.
fn deliver(
    topic: &str,
    body: Result<&[u8], BrokerError>,
    events: &mut dyn BrokerEvents,
) -> Disposition {
    let bag = parse_property_bag(topic);
    let properties: Vec<Property<'_>> = bag
        .properties
        .iter()
        .map(|(key, value)| Property { key, value })
        .collect();
    events.on_message(&InboundMessage {
        message_id: bag.message_id.as_deref(),
        correlation_id: bag.correlation_id.as_deref(),
        body,
        properties: Some(&properties),
    })
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
enum MqttEvent {
    Connected,
    Disconnected,
    Published(u32),
    Received {
        topic: String,
        data: Result<Vec<u8>, BrokerError>,
    },
    Error,
}

#[cfg(target_os = "espidf")]
pub struct MqttBroker {
    url: String,
    client_id: String,
    username: String,
    password: String,
    telemetry_topic: String,
    c2d_filter: String,
    log_trace: bool,
    client: Option<EspMqttClient<'static>>,
    /// NUL-terminated CA PEM.  mbedTLS keeps a pointer into it while the
    /// client runs, so it is declared after `client` and dropped after it.
    trust: Option<Box<[u8]>>,
    events: Arc<EventQueue<MqttEvent>>,
    /// MQTT packet id → tracking id, with submission time.
    awaiting_ack: Vec<(u32, TrackingId, Instant)>,
    connected: bool,
}

#[cfg(target_os = "espidf")]
impl MqttBroker {
    /// Prepare a client for `connection`.  Nothing touches the network
    /// until [`BrokerClient::set_message_callback`].
    pub fn connect(connection: &ConnectionString, protocol: Protocol, sas_ttl_secs: u32) -> Result<Self, BrokerError> {
        let Protocol::Mqtt = protocol;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let password = connection
            .password(now + u64::from(sas_ttl_secs))
            .map_err(|_| BrokerError::InvalidArg)?;
        Ok(Self {
            url: format!("mqtts://{}:{}", connection.host_name(), MQTT_PORT),
            client_id: connection.device_id().to_owned(),
            username: connection.mqtt_username(),
            password,
            telemetry_topic: connection.telemetry_topic(),
            c2d_filter: connection.c2d_topic_filter(),
            log_trace: false,
            client: None,
            trust: None,
            events: Arc::new(Channel::new()),
            awaiting_ack: Vec::new(),
            connected: false,
        })
    }

    /// Transport session is up (the library reconnects on its own).
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn handle(&mut self, event: MqttEvent, events: &mut dyn BrokerEvents) {
        match event {
            MqttEvent::Connected => {
                self.connected = true;
                info!("Broker: connected to {}", self.url);
                if let Some(client) = self.client.as_mut() {
                    if let Err(e) = client.subscribe(&self.c2d_filter, QoS::AtLeastOnce) {
                        warn!("Broker: subscribe to {} failed ({})", self.c2d_filter, e);
                    }
                }
            }
            MqttEvent::Disconnected => {
                self.connected = false;
                warn!("Broker: disconnected, the client will reconnect");
            }
            MqttEvent::Published(id) => {
                if let Some(idx) = self.awaiting_ack.iter().position(|(m, _, _)| *m == id) {
                    let (_, tracking, _) = self.awaiting_ack.swap_remove(idx);
                    events.on_confirmation(tracking, ConfirmationResult::Ok);
                }
            }
            MqttEvent::Received { topic, data } => {
                let body = data.as_deref().map_err(|e| *e);
                let disposition = deliver(&topic, body, events);
                // QoS 1 is acknowledged by the client library; MQTT has no
                // reject or abandon.
                if disposition != Disposition::Accepted {
                    debug!("Broker: {:?} has no MQTT equivalent, message acknowledged", disposition);
                }
            }
            MqttEvent::Error => warn!("Broker: transport error reported"),
        }
    }
}

#[cfg(target_os = "espidf")]
impl BrokerClient for MqttBroker {
    type Message = MqttMessage;

    fn set_option(&mut self, option: ClientOption<'_>) -> Result<(), BrokerError> {
        match option {
            ClientOption::LogTrace(on) => {
                self.log_trace = on;
                if on {
                    log::set_max_level(log::LevelFilter::Trace);
                }
                Ok(())
            }
            ClientOption::TrustedCerts(bundle) => {
                if self.client.is_some() {
                    return Err(BrokerError::InvalidArg);
                }
                self.trust = Some(bundle.as_bytes_with_nul().into());
                Ok(())
            }
        }
    }

    fn set_message_callback(&mut self) -> Result<(), BrokerError> {
        if self.client.is_some() {
            return Ok(());
        }
        let Some(pem) = self.trust.as_deref() else {
            warn!("Broker: refusing to connect without trusted certificates");
            return Err(BrokerError::InvalidArg);
        };

        let conf = MqttClientConfiguration {
            protocol_version: Some(MqttProtocolVersion::V3_1_1),
            client_id: Some(&self.client_id),
            username: Some(&self.username),
            password: Some(&self.password),
            server_certificate: Some(X509::pem_until_nul(pem)),
            keep_alive_interval: Some(Duration::from_secs(240)),
            ..Default::default()
        };

        let queue = Arc::clone(&self.events);
        let client = EspMqttClient::new_cb(&self.url, &conf, move |event| {
            let mapped = match event.payload() {
                EventPayload::Connected(_) => Some(MqttEvent::Connected),
                EventPayload::Disconnected => Some(MqttEvent::Disconnected),
                EventPayload::Published(id) => Some(MqttEvent::Published(id)),
                EventPayload::Received { topic, data, details, .. } => match details {
                    Details::Complete => Some(MqttEvent::Received {
                        topic: topic.unwrap_or_default().to_owned(),
                        data: Ok(data.to_vec()),
                    }),
                    Details::InitialChunk(_) => Some(MqttEvent::Received {
                        topic: topic.unwrap_or_default().to_owned(),
                        data: Err(BrokerError::OutOfMemory),
                    }),
                    Details::SubsequentChunk(_) => None,
                },
                EventPayload::Error(_) => Some(MqttEvent::Error),
                _ => None,
            };
            if let Some(ev) = mapped {
                if queue.try_send(ev).is_err() {
                    warn!("Broker: event queue full ({}), event dropped", EVENT_QUEUE_DEPTH);
                }
            }
        })
        .map_err(|e| BrokerError::Library(e.code()))?;

        info!("Broker: client started for {} (trace {})", self.client_id, self.log_trace);
        self.client = Some(client);
        Ok(())
    }

    fn create_message(&mut self, payload: &[u8]) -> Result<MqttMessage, BrokerError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(BrokerError::InvalidArg);
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(payload.len()).map_err(|_| BrokerError::OutOfMemory)?;
        buf.extend_from_slice(payload);
        Ok(MqttMessage { payload: buf })
    }

    fn send_event_async(&mut self, message: &MqttMessage, tracking: TrackingId) -> Result<(), BrokerError> {
        let Some(client) = self.client.as_mut() else {
            return Err(BrokerError::NotConnected);
        };
        let id = client
            .enqueue(&self.telemetry_topic, QoS::AtLeastOnce, false, &message.payload)
            .map_err(|e| BrokerError::Library(e.code()))?;
        self.awaiting_ack.push((id, tracking, Instant::now()));
        Ok(())
    }

    fn do_work(&mut self, events: &mut dyn BrokerEvents) {
        let mut budget = MAX_EVENTS_PER_WORK;
        while budget > 0 {
            let Ok(event) = self.events.try_receive() else {
                break;
            };
            self.handle(event, events);
            budget -= 1;
        }

        let now = Instant::now();
        while budget > 0 {
            let Some(idx) = self
                .awaiting_ack
                .iter()
                .position(|(_, _, at)| now.duration_since(*at) > MESSAGE_TIMEOUT)
            else {
                break;
            };
            let (_, tracking, _) = self.awaiting_ack.swap_remove(idx);
            events.on_confirmation(tracking, ConfirmationResult::MessageTimeout);
            budget -= 1;
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Loopback backend (host)
// ───────────────────────────────────────────────────────────────

/// One publish seen by the loopback broker.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub tracking: TrackingId,
    pub payload: Vec<u8>,
}

#[cfg(not(target_os = "espidf"))]
pub struct MqttBroker {
    device_id: String,
    telemetry_topic: String,
    log_trace: bool,
    trust: Option<Box<[u8]>>,
    subscribed: bool,
    acks: VecDeque<TrackingId>,
    inbound: EventQueue<(String, Vec<u8>)>,
    published: Vec<Published>,
    dispositions: Vec<Disposition>,
}

#[cfg(not(target_os = "espidf"))]
impl MqttBroker {
    pub fn connect(connection: &ConnectionString, protocol: Protocol, sas_ttl_secs: u32) -> Result<Self, BrokerError> {
        let Protocol::Mqtt = protocol;
        // Token generation is exercised even though nobody checks it.
        connection
            .password(u64::from(sas_ttl_secs))
            .map_err(|_| BrokerError::InvalidArg)?;
        info!("Broker(sim): loopback client for {}", connection.device_id());
        Ok(Self {
            device_id: connection.device_id().to_owned(),
            telemetry_topic: connection.telemetry_topic(),
            log_trace: false,
            trust: None,
            subscribed: false,
            acks: VecDeque::new(),
            inbound: Channel::new(),
            published: Vec::new(),
            dispositions: Vec::new(),
        })
    }

    /// Queue a cloud-to-device message.  `property_bag` is the raw,
    /// URL-encoded topic suffix (e.g. `$.mid=7&color=red`).  Returns
    /// `false` when the inbound queue is full and the message was dropped.
    pub fn inject(&mut self, property_bag: &str, payload: &[u8]) -> bool {
        let topic = format!("devices/{}/messages/devicebound/{}", self.device_id, property_bag);
        if self.inbound.try_send((topic, payload.to_vec())).is_err() {
            warn!("Broker(sim): event queue full ({}), message dropped", EVENT_QUEUE_DEPTH);
            return false;
        }
        true
    }

    pub fn published(&self) -> &[Published] {
        &self.published
    }

    /// Dispositions returned for delivered messages, in delivery order.
    pub fn dispositions(&self) -> &[Disposition] {
        &self.dispositions
    }

    pub fn log_trace(&self) -> bool {
        self.log_trace
    }

    pub fn is_connected(&self) -> bool {
        self.subscribed
    }
}

#[cfg(not(target_os = "espidf"))]
impl BrokerClient for MqttBroker {
    type Message = MqttMessage;

    fn set_option(&mut self, option: ClientOption<'_>) -> Result<(), BrokerError> {
        match option {
            ClientOption::LogTrace(on) => self.log_trace = on,
            ClientOption::TrustedCerts(bundle) => {
                if self.subscribed {
                    return Err(BrokerError::InvalidArg);
                }
                debug!("Broker(sim): {:?} installed", bundle);
                self.trust = Some(bundle.as_bytes_with_nul().into());
            }
        }
        Ok(())
    }

    fn set_message_callback(&mut self) -> Result<(), BrokerError> {
        if self.trust.is_none() {
            return Err(BrokerError::InvalidArg);
        }
        self.subscribed = true;
        Ok(())
    }

    fn create_message(&mut self, payload: &[u8]) -> Result<MqttMessage, BrokerError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(BrokerError::InvalidArg);
        }
        Ok(MqttMessage {
            payload: payload.to_vec(),
        })
    }

    fn send_event_async(&mut self, message: &MqttMessage, tracking: TrackingId) -> Result<(), BrokerError> {
        if !self.subscribed {
            return Err(BrokerError::NotConnected);
        }
        self.published.push(Published {
            topic: self.telemetry_topic.clone(),
            tracking,
            payload: message.payload.clone(),
        });
        self.acks.push_back(tracking);
        Ok(())
    }

    fn do_work(&mut self, events: &mut dyn BrokerEvents) {
        let mut budget = MAX_EVENTS_PER_WORK;
        while budget > 0 {
            let Some(tracking) = self.acks.pop_front() else { break };
            events.on_confirmation(tracking, crate::session::message::ConfirmationResult::Ok);
            budget -= 1;
        }
        while budget > 0 && self.subscribed {
            let Ok((topic, payload)) = self.inbound.try_receive() else { break };
            let disposition = deliver(&topic, Ok(payload.as_slice()), events);
            self.dispositions.push(disposition);
            budget -= 1;
        }
    }
}
