//! Message session: bootstrap contract, send/confirm/release lifecycle
//! and inbound dispatch, against the scripted broker mock.

use cloudlink::app::ports::BrokerError;
use cloudlink::config::LinkConfig;
use cloudlink::connection_string::ConnectionString;
use cloudlink::error::SendFailure;
use cloudlink::link::LinkStatus;
use cloudlink::session::MessageSession;
use cloudlink::session::message::{ConfirmationResult, Disposition, TrackingId};
use cloudlink::trust::TrustBundle;
use cloudlink::Error;

use crate::mock_hw::{BrokerCall, CA_PEM, CONNECTION_STRING, Inject, MockBroker, RecordingHandler};

type Session = MessageSession<MockBroker, RecordingHandler>;

fn session() -> Session {
    MessageSession::new(&LinkConfig::default(), RecordingHandler::default())
}

fn bootstrap(s: &mut Session, broker: MockBroker) -> Result<(), Error> {
    let cs = ConnectionString::parse(CONNECTION_STRING).unwrap();
    let trust = TrustBundle::from_pem(CA_PEM).unwrap();
    s.bootstrap(LinkStatus::Connected, &cs, &trust, |_, _| Ok(broker))
}

fn ready() -> (Session, std::rc::Rc<crate::mock_hw::BrokerLog>) {
    let broker = MockBroker::new();
    let log = broker.log();
    let mut s = session();
    bootstrap(&mut s, broker).unwrap();
    (s, log)
}

// ── Bootstrap ─────────────────────────────────────────────────

#[test]
fn bootstrap_sets_options_then_callback() {
    let (s, log) = ready();
    assert!(s.is_ready());
    assert_eq!(
        log.calls(),
        vec![
            BrokerCall::SetOption("logtrace"),
            BrokerCall::SetOption("TrustedCerts"),
            BrokerCall::SetMessageCallback,
        ]
    );
}

#[test]
fn trust_failure_aborts_before_callback_registration() {
    let mut broker = MockBroker::new();
    broker.fail_trust = true;
    let log = broker.log();
    let mut s = session();

    assert_eq!(bootstrap(&mut s, broker), Err(Error::TrustConfig(BrokerError::Library(-3))));
    assert!(!s.is_ready());
    assert_eq!(log.count(&BrokerCall::SetMessageCallback), 0);
    assert_eq!(s.send(b"x"), Err(Error::NotReady));
}

#[test]
fn logtrace_failure_is_not_fatal() {
    let mut broker = MockBroker::new();
    broker.fail_logtrace = true;
    let mut s = session();
    bootstrap(&mut s, broker).unwrap();
    assert!(s.is_ready());
}

#[test]
fn callback_failure_leaves_session_down() {
    let mut broker = MockBroker::new();
    broker.fail_callback = true;
    let mut s = session();
    assert_eq!(bootstrap(&mut s, broker), Err(Error::SessionInit(BrokerError::Library(-4))));
    assert!(!s.is_ready());
    assert_eq!(s.pump(), Err(Error::NotReady));
}

#[test]
fn client_construction_failure() {
    let mut s = session();
    let cs = ConnectionString::parse(CONNECTION_STRING).unwrap();
    let trust = TrustBundle::from_pem(CA_PEM).unwrap();
    let r = s.bootstrap(LinkStatus::Connected, &cs, &trust, |_, _| Err::<MockBroker, _>(BrokerError::OutOfMemory));
    assert_eq!(r, Err(Error::SessionInit(BrokerError::OutOfMemory)));
}

#[test]
fn failed_bootstrap_can_be_retried() {
    let mut bad = MockBroker::new();
    bad.fail_trust = true;
    let mut s = session();
    assert!(bootstrap(&mut s, bad).is_err());
    bootstrap(&mut s, MockBroker::new()).unwrap();
    assert!(s.is_ready());
}

#[test]
fn second_bootstrap_keeps_the_first_client() {
    let (mut s, log) = ready();
    let other = MockBroker::new();
    let other_log = other.log();
    bootstrap(&mut s, other).unwrap();
    assert!(other_log.calls().is_empty());
    assert_eq!(log.count(&BrokerCall::SetMessageCallback), 1);
}

// ── Send / confirm / release ──────────────────────────────────

#[test]
fn three_sends_then_out_of_order_confirmations() {
    let (mut s, log) = ready();
    let ids: Vec<_> = [b"a", b"b", b"c"].iter().map(|p| s.send(*p).unwrap()).collect();
    assert_eq!(ids, vec![TrackingId(1), TrackingId(2), TrackingId(3)]);
    assert_eq!(log.live.get(), 3);
    assert!(log.released().is_empty());

    // Script: 2, then 3, then 1.
    script(&mut s, &[(2, ConfirmationResult::Ok)]);
    s.pump().unwrap();
    assert_eq!(log.released(), vec![2]);

    script(&mut s, &[(3, ConfirmationResult::MessageTimeout), (1, ConfirmationResult::Ok)]);
    s.pump().unwrap();
    assert_eq!(log.released(), vec![2, 3, 1]);
    assert_eq!(log.live.get(), 0);

    let h = s.handler();
    assert_eq!(
        h.confirmations,
        vec![
            (TrackingId(2), ConfirmationResult::Ok),
            (TrackingId(3), ConfirmationResult::MessageTimeout),
            (TrackingId(1), ConfirmationResult::Ok),
        ]
    );
    assert_eq!(s.stats().failed_confirmations, 1);
    assert_eq!(s.stats().confirmations, 3);
}

#[test]
fn nothing_released_before_confirmation() {
    let (mut s, log) = ready();
    s.send(b"payload").unwrap();
    for _ in 0..10 {
        s.pump().unwrap();
    }
    assert!(log.released().is_empty());
    assert_eq!(s.in_flight(), 1);
}

#[test]
fn duplicate_and_unknown_confirmations_are_ignored() {
    let (mut s, log) = ready();
    s.send(b"a").unwrap();
    script(
        &mut s,
        &[
            (1, ConfirmationResult::Ok),
            (1, ConfirmationResult::Ok),
            (99, ConfirmationResult::Error),
        ],
    );
    s.pump().unwrap();

    assert_eq!(log.released(), vec![1]);
    assert_eq!(s.handler().confirmations.len(), 1);
    assert_eq!(s.stats().unmatched_confirmations, 2);
}

#[test]
fn create_failure_reports_synchronously() {
    let (mut s, log) = ready();
    broker(&mut s).fail_create = true;

    assert_eq!(
        s.send(b"a"),
        Err(Error::Send(SendFailure::Create(BrokerError::OutOfMemory)))
    );
    assert_eq!(log.count(&BrokerCall::Send(TrackingId(1))), 0);
    assert_eq!(s.in_flight(), 0);

    // The id is spent; the next send gets the following one.
    broker(&mut s).fail_create = false;
    assert_eq!(s.send(b"b").unwrap(), TrackingId(2));
}

#[test]
fn submit_failure_releases_immediately_and_never_confirms() {
    let (mut s, log) = ready();
    broker(&mut s).fail_submit = true;
    broker(&mut s).auto_confirm = true;

    assert_eq!(
        s.send(b"a"),
        Err(Error::Send(SendFailure::Submit(BrokerError::NotConnected)))
    );
    assert_eq!(log.released(), vec![1]);
    assert_eq!(log.live.get(), 0);

    s.pump().unwrap();
    assert!(s.handler().confirmations.is_empty());
    assert_eq!(s.stats().send_failures, 1);
}

#[test]
fn outbox_limit_applies() {
    let cfg = LinkConfig {
        max_in_flight: 2,
        ..LinkConfig::default()
    };
    let mut s = MessageSession::new(&cfg, RecordingHandler::default());
    bootstrap(&mut s, MockBroker::new()).unwrap();
    s.send(b"1").unwrap();
    s.send(b"2").unwrap();
    assert_eq!(s.send(b"3"), Err(Error::Send(SendFailure::OutboxFull)));
    assert_eq!(s.stats().in_flight, 2);
}

// ── Inbound ───────────────────────────────────────────────────

#[test]
fn inbound_without_ids_gets_placeholder() {
    let (mut s, log) = ready();
    broker(&mut s).inbound.push_back(Inject {
        body: Some(b"{\"led\":true}".to_vec()),
        properties: vec![("b".into(), "2".into()), ("a".into(), "1".into())],
        ..Inject::default()
    });
    s.pump().unwrap();

    let seen = &s.handler().messages[0];
    assert_eq!(seen.message_id, "<null>");
    assert_eq!(seen.correlation_id, "<null>");
    assert_eq!(seen.payload.as_deref(), Some(&b"{\"led\":true}"[..]));
    assert_eq!(seen.properties, vec![("b".to_string(), "2".to_string()), ("a".to_string(), "1".to_string())]);
    assert_eq!(*log.dispositions.borrow(), vec![Disposition::Accepted]);
}

#[test]
fn inbound_payload_error_still_dispositioned() {
    let (mut s, log) = ready();
    broker(&mut s).inbound.push_back(Inject {
        message_id: Some("m-1".into()),
        correlation_id: Some("c-1".into()),
        body: None,
        ..Inject::default()
    });
    s.pump().unwrap();

    let seen = &s.handler().messages[0];
    assert_eq!(seen.message_id, "m-1");
    assert_eq!(seen.payload, None);
    assert_eq!(log.dispositions.borrow().len(), 1);
}

#[test]
fn handler_verdict_is_returned() {
    let (mut s, log) = ready();
    s.handler_mut().verdict = Disposition::Abandoned;
    for _ in 0..3 {
        broker(&mut s).inbound.push_back(Inject::default());
    }
    s.pump().unwrap();
    assert_eq!(*log.dispositions.borrow(), vec![Disposition::Abandoned; 3]);
    assert_eq!(s.stats().received, 3);
    assert_eq!(s.stats().abandoned, 3);
}

// ── helpers ───────────────────────────────────────────────────

fn broker(s: &mut Session) -> &mut MockBroker {
    s.client_mut().expect("session is ready")
}

fn script(s: &mut Session, confirmations: &[(u32, ConfirmationResult)]) {
    let b = broker(s);
    for (id, result) in confirmations {
        b.script.push_back((TrackingId(*id), *result));
    }
}
