//! Message session — the broker client, its outbound message table and
//! inbound dispatch.
//!
//! ```text
//!   send() ──▶ Created ──▶ Sent ──▶ Confirmed(ok | failure) ──▶ Released
//!                                        ▲
//!   pump() ──▶ BrokerClient::do_work ────┤
//!                                        └──▶ on_message ──▶ Disposition
//! ```
//!
//! All progress happens inside [`MessageSession::pump`]; the broker client
//! calls back into [`Dispatch`] from there.  Confirmation is the only
//! place an outbound message handle is released.

pub mod message;
pub mod outbox;

use log::{debug, error, info, warn};

use crate::app::ports::{BrokerClient, BrokerError, BrokerEvents, ClientOption, Protocol};
use crate::config::LinkConfig;
use crate::connection_string::ConnectionString;
use crate::error::{Error, Result, SendFailure};
use crate::link::LinkStatus;
use crate::trust::TrustBundle;

use message::{ConfirmationResult, Disposition, InboundMessage, ReceivedMessage, TrackingId};
use outbox::Outbox;

// ───────────────────────────────────────────────────────────────
// Handler
// ───────────────────────────────────────────────────────────────

/// Application hooks for session callbacks.  Both run synchronously
/// inside [`MessageSession::pump`].
pub trait SessionHandler {
    /// A previously sent message was confirmed.  Its handle has already
    /// been released.
    fn on_confirmation(&mut self, _tracking: TrackingId, _result: ConfirmationResult) {}

    /// Process a cloud-to-device message.  Must always return a verdict.
    fn on_message(&mut self, _message: &ReceivedMessage<'_>) -> Disposition {
        Disposition::Accepted
    }
}

/// Accepts everything and logs the content.
#[derive(Debug, Default)]
pub struct LoggingHandler;

impl SessionHandler for LoggingHandler {
    fn on_message(&mut self, message: &ReceivedMessage<'_>) -> Disposition {
        if let Some(payload) = message.payload {
            info!("  Data: <<<{}>>>", String::from_utf8_lossy(payload));
        }
        for p in message.properties {
            info!("  {}: {}", p.key, p.value);
        }
        Disposition::Accepted
    }
}

// ───────────────────────────────────────────────────────────────
// Diagnostics
// ───────────────────────────────────────────────────────────────

/// Running counters.  Diagnostic only; nothing correlates on them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Messages accepted by `send_event_async`.
    pub sent: u32,
    /// Confirmation callbacks received, matched or not.
    pub confirmations: u32,
    /// Confirmations that reported anything but `Ok`.
    pub failed_confirmations: u32,
    /// Confirmations for ids no longer (or never) pending.
    pub unmatched_confirmations: u32,
    /// Sends rejected synchronously.
    pub send_failures: u32,
    /// Inbound messages dispatched.
    pub received: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub abandoned: u32,
    /// Messages sent but not yet confirmed, at snapshot time.
    pub in_flight: u16,
}

// ───────────────────────────────────────────────────────────────
// Callback dispatch
// ───────────────────────────────────────────────────────────────

/// Borrowed view of the session handed to [`BrokerClient::do_work`].
struct Dispatch<'s, M, H> {
    outbox: &'s mut Outbox<M>,
    handler: &'s mut H,
    stats: &'s mut SessionStats,
}

impl<M, H: SessionHandler> BrokerEvents for Dispatch<'_, M, H> {
    fn on_confirmation(&mut self, tracking: TrackingId, result: ConfirmationResult) {
        self.stats.confirmations = self.stats.confirmations.wrapping_add(1);
        info!(
            "Confirmation[{}] received for message tracking id = {} with result = {}",
            self.stats.confirmations, tracking, result
        );

        // Dropping the handle releases it.
        let Some(message) = self.outbox.resolve(tracking) else {
            self.stats.unmatched_confirmations = self.stats.unmatched_confirmations.wrapping_add(1);
            warn!("Session: confirmation for unknown tracking id {}, ignored", tracking);
            return;
        };
        drop(message);

        if !result.is_success() {
            self.stats.failed_confirmations = self.stats.failed_confirmations.wrapping_add(1);
        }
        self.handler.on_confirmation(tracking, result);
    }

    fn on_message(&mut self, inbound: &InboundMessage<'_>) -> Disposition {
        self.stats.received = self.stats.received.wrapping_add(1);
        let message = ReceivedMessage::extract(inbound);
        info!(
            "Received Message [{}]\n Message ID: {}\n Correlation ID: {}\n Size={}",
            self.stats.received,
            message.message_id,
            message.correlation_id,
            message.size()
        );
        let disposition = self.handler.on_message(&message);
        match disposition {
            Disposition::Accepted => self.stats.accepted = self.stats.accepted.wrapping_add(1),
            Disposition::Rejected => self.stats.rejected = self.stats.rejected.wrapping_add(1),
            Disposition::Abandoned => self.stats.abandoned = self.stats.abandoned.wrapping_add(1),
        }
        debug!("Session: message [{}] -> {:?}", self.stats.received, disposition);
        disposition
    }
}

// ───────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────

pub struct MessageSession<C: BrokerClient, H> {
    /// Present only after a complete bootstrap.
    client: Option<C>,
    outbox: Outbox<C::Message>,
    handler: H,
    stats: SessionStats,
    log_trace: bool,
}

impl<C: BrokerClient, H: SessionHandler> MessageSession<C, H> {
    pub fn new(config: &LinkConfig, handler: H) -> Self {
        Self {
            client: None,
            outbox: Outbox::new(usize::from(config.max_in_flight)),
            handler,
            stats: SessionStats::default(),
            log_trace: config.log_trace,
        }
    }

    /// Create and wire the broker client.
    ///
    /// Requires a connected link.  The trust bundle is mandatory: if it
    /// cannot be installed the client is discarded before the receive
    /// callback is ever registered.  Calling this on a ready session is
    /// a no-op.
    pub fn bootstrap<F>(
        &mut self,
        link: LinkStatus,
        connection: &ConnectionString,
        trust: &TrustBundle,
        connect: F,
    ) -> Result<()>
    where
        F: FnOnce(&ConnectionString, Protocol) -> core::result::Result<C, BrokerError>,
    {
        if self.client.is_some() {
            return Ok(());
        }
        if link != LinkStatus::Connected {
            error!("Session: link is not connected ({:?})", link);
            return Err(Error::LinkNotConnected);
        }

        let mut client = connect(connection, Protocol::Mqtt).map_err(|e| {
            error!("Session: failed to create the broker client for {} ({})", connection.device_id(), e);
            Error::SessionInit(e)
        })?;

        let trace = ClientOption::LogTrace(self.log_trace);
        if let Err(e) = client.set_option(trace) {
            warn!("Session: failure to set option \"{}\" ({})", trace.name(), e);
        }

        client.set_option(ClientOption::TrustedCerts(trust)).map_err(|e| {
            error!("Session: failure to set option \"TrustedCerts\" ({})", e);
            Error::TrustConfig(e)
        })?;

        client.set_message_callback().map_err(|e| {
            error!("Session: unable to register the message callback ({})", e);
            Error::SessionInit(e)
        })?;

        info!(
            "Session: ready for {} on {} ({} trusted cert(s))",
            connection.device_id(),
            connection.host_name(),
            trust.certificate_count()
        );
        self.client = Some(client);
        Ok(())
    }

    /// Submit `payload` asynchronously.
    ///
    /// On `Ok` exactly one confirmation for the returned id will reach the
    /// handler.  On `Err` none ever will.
    pub fn send(&mut self, payload: &[u8]) -> Result<TrackingId> {
        let Some(client) = self.client.as_mut() else {
            error!("Session: send before bootstrap");
            return Err(Error::NotReady);
        };

        if self.outbox.is_full() {
            self.stats.send_failures = self.stats.send_failures.wrapping_add(1);
            warn!("Session: {} message(s) awaiting confirmation, send refused", self.outbox.len());
            return Err(SendFailure::OutboxFull.into());
        }

        let tracking = self.outbox.next_id();
        let message = match client.create_message(payload) {
            Ok(m) => m,
            Err(e) => {
                self.stats.send_failures = self.stats.send_failures.wrapping_add(1);
                error!("Session: unable to create a new message ({})", e);
                return Err(SendFailure::Create(e).into());
            }
        };

        // Parked first: the client may reference it until confirmed.
        if self.outbox.insert(tracking, message).is_err() {
            self.stats.send_failures = self.stats.send_failures.wrapping_add(1);
            return Err(SendFailure::OutboxFull.into());
        }
        let Some(parked) = self.outbox.get(tracking) else {
            self.stats.send_failures = self.stats.send_failures.wrapping_add(1);
            return Err(SendFailure::OutboxFull.into());
        };

        match client.send_event_async(parked, tracking) {
            Ok(()) => {
                self.stats.sent = self.stats.sent.wrapping_add(1);
                debug!("Session: message {} queued ({}B)", tracking, payload.len());
                Ok(tracking)
            }
            Err(e) => {
                // No confirmation will come; release now.
                drop(self.outbox.resolve(tracking));
                self.stats.send_failures = self.stats.send_failures.wrapping_add(1);
                error!("Session: failed to hand over the message to the client ({})", e);
                Err(SendFailure::Submit(e).into())
            }
        }
    }

    /// Drive protocol I/O and dispatch due callbacks.  Never blocks.
    pub fn pump(&mut self) -> Result<()> {
        let Some(client) = self.client.as_mut() else {
            return Err(Error::NotReady);
        };
        let mut dispatch = Dispatch {
            outbox: &mut self.outbox,
            handler: &mut self.handler,
            stats: &mut self.stats,
        };
        client.do_work(&mut dispatch);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    /// Messages sent but not yet confirmed.
    pub fn in_flight(&self) -> usize {
        self.outbox.len()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            in_flight: self.outbox.len() as u16,
            ..self.stats
        }
    }

    /// The broker client, once bootstrapped.
    pub fn client_mut(&mut self) -> Option<&mut C> {
        self.client.as_mut()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}
