//! Fuzz target: inbound publish handling in the loopback broker
//!
//! Feeds arbitrary property-bag suffixes and payloads through
//! `MqttBroker::inject` + `do_work` and checks that every message gets
//! exactly one disposition and a message id (real or placeholder).
//!
//! cargo fuzz run fuzz_inbound_topic

#![no_main]

use cloudlink::adapters::broker::MqttBroker;
use cloudlink::app::ports::{BrokerClient, BrokerEvents, ClientOption, Protocol};
use cloudlink::connection_string::ConnectionString;
use cloudlink::session::message::{
    ConfirmationResult, Disposition, InboundMessage, ReceivedMessage, TrackingId,
};
use cloudlink::trust::TrustBundle;
use libfuzzer_sys::fuzz_target;

const PEM: &[u8] = b"-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

#[derive(Default)]
struct Count(usize);

impl BrokerEvents for Count {
    fn on_confirmation(&mut self, _: TrackingId, _: ConfirmationResult) {}

    fn on_message(&mut self, inbound: &InboundMessage<'_>) -> Disposition {
        let m = ReceivedMessage::extract(inbound);
        assert!(!m.message_id.is_empty() || inbound.message_id == Some(""));
        self.0 += 1;
        Disposition::Accepted
    }
}

fuzz_target!(|data: &[u8]| {
    let split = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let Ok(bag) = core::str::from_utf8(&data[..split]) else {
        return;
    };
    let payload = data.get(split + 1..).unwrap_or(&[]);

    let cs = ConnectionString::parse("HostName=h;DeviceId=d;SharedAccessKey=a2V5").unwrap();
    let trust = TrustBundle::from_pem(PEM).unwrap();
    let mut broker = MqttBroker::connect(&cs, Protocol::Mqtt, 60).unwrap();
    broker.set_option(ClientOption::TrustedCerts(&trust)).unwrap();
    broker.set_message_callback().unwrap();

    broker.inject(bag, payload);
    let mut seen = Count::default();
    broker.do_work(&mut seen);
    assert_eq!(seen.0, 1);
    assert_eq!(broker.dispositions().len(), 1);
});
