//! End-to-end bootstrap through `CloudLink`: Wi-Fi, connection string,
//! trust, broker session, then steady-state traffic.

use cloudlink::adapters::broker::MqttBroker;
use cloudlink::app::events::LinkEvent;
use cloudlink::app::ports::BrokerError;
use cloudlink::app::service::CloudLink;
use cloudlink::config::LinkConfig;
use cloudlink::session::message::{Disposition, TrackingId};
use cloudlink::trust::TrustBundle;
use cloudlink::{Error, Zone};

use crate::mock_hw::{
    BrokerCall, CA_PEM, MockBroker, MockRadio, MockReporter, MockZones, RecordingHandler, RecordingSink,
};

type Cloud = CloudLink<MockZones, MockRadio, MockBroker, RecordingHandler>;

fn trust() -> TrustBundle {
    TrustBundle::from_pem(CA_PEM).unwrap()
}

/// Wi-Fi up, session not yet bootstrapped.
fn online(zones: MockZones) -> Cloud {
    let mut c = CloudLink::new(LinkConfig::default(), zones, RecordingHandler::default());
    c.init_wifi(|| Ok(MockRadio::new())).unwrap();
    c.connect_wifi(&mut MockReporter::default(), &mut RecordingSink::default())
        .unwrap();
    c
}

#[test]
fn session_needs_wifi_first() {
    let mut c: Cloud = CloudLink::new(LinkConfig::default(), MockZones::provisioned(), RecordingHandler::default());
    c.init_wifi(|| Ok(MockRadio::new())).unwrap();

    let mut sink = RecordingSink::default();
    let mut built = false;
    let r = c.bootstrap_session(
        &trust(),
        |_, _| {
            built = true;
            Ok(MockBroker::new())
        },
        &mut sink,
    );

    assert_eq!(r, Err(Error::LinkNotConnected));
    assert!(!built);
    assert_eq!(c.credentials().store().reads_of(Zone::ConnectionString), 0);
    assert!(matches!(sink.events[..], [LinkEvent::SessionFailed(Error::LinkNotConnected)]));
}

#[test]
fn access_point_mode_is_not_a_station_link() {
    let mut c: Cloud = CloudLink::new(LinkConfig::default(), MockZones::provisioned(), RecordingHandler::default());
    c.init_wifi(|| Ok(MockRadio::new())).unwrap();
    c.start_access_point("CloudLink-Setup", "configure-me", &mut RecordingSink::default())
        .unwrap();

    let r = c.bootstrap_session(&trust(), |_, _| Ok(MockBroker::new()), &mut RecordingSink::default());
    assert_eq!(r, Err(Error::LinkNotConnected));
}

#[test]
fn empty_connection_string_is_config_missing() {
    let zones = MockZones::new()
        .with(Zone::WifiSsid, b"HomeNet")
        .with(Zone::WifiPassword, b"password1");
    let mut c = online(zones);

    let mut sink = RecordingSink::default();
    let r = c.bootstrap_session(&trust(), |_, _| Ok(MockBroker::new()), &mut sink);

    assert_eq!(r, Err(Error::ConfigMissing(Zone::ConnectionString)));
    assert!(!c.is_session_ready());
    assert!(matches!(
        sink.events[..],
        [LinkEvent::SessionFailed(Error::ConfigMissing(Zone::ConnectionString))]
    ));
}

#[test]
fn malformed_connection_string_is_config_error() {
    let zones = MockZones::provisioned().with(Zone::ConnectionString, b"HostName=hub.example.net");
    let mut c = online(zones);
    let r = c.bootstrap_session(&trust(), |_, _| Ok(MockBroker::new()), &mut RecordingSink::default());
    assert!(matches!(r, Err(Error::Config(_))));
}

#[test]
fn unreadable_connection_string_is_storage_failure() {
    let mut c = online(MockZones::provisioned().failing(Zone::ConnectionString, -2));
    let r = c.bootstrap_session(&trust(), |_, _| Ok(MockBroker::new()), &mut RecordingSink::default());
    assert!(matches!(r, Err(Error::StorageFailure(Zone::ConnectionString, _))));
}

#[test]
fn trust_failure_stops_before_message_callback() {
    let mut c = online(MockZones::provisioned());
    let mut broker = MockBroker::new();
    broker.fail_trust = true;
    let log = broker.log();

    let mut sink = RecordingSink::default();
    let r = c.bootstrap_session(&trust(), |_, _| Ok(broker), &mut sink);

    assert_eq!(r, Err(Error::TrustConfig(BrokerError::Library(-3))));
    assert_eq!(
        log.calls(),
        vec![BrokerCall::SetOption("logtrace"), BrokerCall::SetOption("TrustedCerts")]
    );
    assert!(!c.is_session_ready());
    assert_eq!(c.send(b"{}"), Err(Error::NotReady));
}

#[test]
fn logtrace_failure_does_not_block_the_session() {
    let mut c = online(MockZones::provisioned());
    let mut broker = MockBroker::new();
    broker.fail_logtrace = true;
    c.bootstrap_session(&trust(), |_, _| Ok(broker), &mut RecordingSink::default())
        .unwrap();
    assert!(c.is_session_ready());
}

#[test]
fn callback_failure_is_session_init() {
    let mut c = online(MockZones::provisioned());
    let mut broker = MockBroker::new();
    broker.fail_callback = true;
    let r = c.bootstrap_session(&trust(), |_, _| Ok(broker), &mut RecordingSink::default());
    assert_eq!(r, Err(Error::SessionInit(BrokerError::Library(-4))));
}

#[test]
fn successful_bootstrap_reports_ready_once() {
    let mut c = online(MockZones::provisioned());
    let mut sink = RecordingSink::default();

    c.bootstrap_session(&trust(), |_, _| Ok(MockBroker::new()), &mut sink)
        .unwrap();
    assert!(c.is_session_ready());
    assert!(matches!(sink.events[..], [LinkEvent::SessionReady]));

    let mut again = false;
    c.bootstrap_session(
        &trust(),
        |_, _| {
            again = true;
            Ok(MockBroker::new())
        },
        &mut sink,
    )
    .unwrap();
    assert!(!again);
    assert_eq!(sink.events.len(), 1);
}

#[test]
fn failed_attempt_rereads_credentials_on_retry() {
    let mut c = online(MockZones::provisioned());
    let mut bad = MockBroker::new();
    bad.fail_trust = true;
    assert!(c.bootstrap_session(&trust(), |_, _| Ok(bad), &mut RecordingSink::default()).is_err());

    c.bootstrap_session(&trust(), |_, _| Ok(MockBroker::new()), &mut RecordingSink::default())
        .unwrap();
    assert!(c.is_session_ready());
    assert_eq!(c.credentials().store().reads_of(Zone::ConnectionString), 2);
}

#[test]
fn telemetry_carries_device_identity() {
    let mut c = online(MockZones::provisioned());
    let broker = MockBroker::new();
    let log = broker.log();
    c.bootstrap_session(&trust(), |_, _| Ok(broker), &mut RecordingSink::default())
        .unwrap();

    assert_eq!(c.send_telemetry(42).unwrap(), TrackingId(1));

    let created = log
        .calls()
        .into_iter()
        .find_map(|call| match call {
            BrokerCall::Create(bytes) => Some(bytes),
            _ => None,
        })
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&created).unwrap();
    assert_eq!(json["deviceId"], "sensor-01");
    assert_eq!(json["ssid"], "HomeNet");
    assert_eq!(json["rssi"], -50);
    assert_eq!(json["uptimeSecs"], 42);
    assert_eq!(json["inFlight"], 0);

    let t = c.telemetry(43);
    assert_eq!(t.in_flight, 1);
}

#[test]
fn config_round_trips_through_storage() {
    let mut c = online(MockZones::provisioned());
    let cfg = LinkConfig {
        max_in_flight: 4,
        log_trace: true,
        ..LinkConfig::default()
    };
    c.save_config(&cfg).unwrap();
    assert_eq!(LinkConfig::load(c.credentials().store()), cfg);

    let bad = LinkConfig {
        max_in_flight: 0,
        ..LinkConfig::default()
    };
    assert!(matches!(c.save_config(&bad), Err(Error::Config(_))));
    assert_eq!(LinkConfig::load(c.credentials().store()), cfg);
}

// ── Loopback broker ───────────────────────────────────────────

#[test]
fn loopback_broker_end_to_end() {
    let mut c: CloudLink<MockZones, MockRadio, MqttBroker, RecordingHandler> =
        CloudLink::new(LinkConfig::default(), MockZones::provisioned(), RecordingHandler::default());
    c.init_wifi(|| Ok(MockRadio::new())).unwrap();
    c.connect_wifi(&mut MockReporter::default(), &mut RecordingSink::default())
        .unwrap();
    c.bootstrap_session(
        &trust(),
        |cs, protocol| MqttBroker::connect(cs, protocol, 3600),
        &mut RecordingSink::default(),
    )
    .unwrap();

    let first = c.send(b"{\"t\":1}").unwrap();
    let second = c.send_telemetry(1).unwrap();
    assert_eq!((first, second), (TrackingId(1), TrackingId(2)));

    c.session_mut()
        .client_mut()
        .unwrap()
        .inject("%24.mid=7&color=red&%24.ct=application%2Fjson", b"on");
    c.pump().unwrap();

    let handler = c.session().handler();
    assert_eq!(
        handler.confirmations.iter().map(|(t, _)| *t).collect::<Vec<_>>(),
        vec![TrackingId(1), TrackingId(2)]
    );
    assert_eq!(handler.messages.len(), 1);
    assert_eq!(handler.messages[0].message_id, "7");
    assert_eq!(handler.messages[0].correlation_id, "<null>");
    assert_eq!(handler.messages[0].properties, vec![("color".to_string(), "red".to_string())]);

    let broker = c.session_mut().client_mut().unwrap();
    assert_eq!(broker.published().len(), 2);
    assert_eq!(broker.published()[0].topic, "devices/sensor-01/messages/events/");
    assert_eq!(broker.dispositions(), &[Disposition::Accepted]);
    assert_eq!(c.stats().in_flight, 0);
}
