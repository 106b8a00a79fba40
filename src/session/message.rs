//! Message-level types shared between the session and the broker port.

use core::fmt;

use log::error;

use crate::app::ports::BrokerError;

/// Literal substituted for an absent message or correlation id.
pub const NULL_PLACEHOLDER: &str = "<null>";

/// Per-process identifier correlating a send with its confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackingId(pub u32);

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome reported by the broker client for one outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    Ok,
    /// The client was torn down before the message was acknowledged.
    BecauseDestroy,
    MessageTimeout,
    Error,
}

impl ConfirmationResult {
    pub fn is_success(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for ConfirmationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::BecauseDestroy => "BECAUSE_DESTROY",
            Self::MessageTimeout => "MESSAGE_TIMEOUT",
            Self::Error => "ERROR",
        })
    }
}

/// Verdict returned to the broker client for an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    #[default]
    Accepted,
    Rejected,
    Abandoned,
}

/// One application property.  Keys are unique within a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

// ───────────────────────────────────────────────────────────────
// Inbound
// ───────────────────────────────────────────────────────────────

/// A cloud-to-device message as the broker client hands it over.
/// Borrowed for the duration of one `on_message` call only.
#[derive(Debug, Clone, Copy)]
pub struct InboundMessage<'a> {
    pub message_id: Option<&'a str>,
    pub correlation_id: Option<&'a str>,
    /// Payload bytes (not NUL-terminated), or the extraction error.
    pub body: Result<&'a [u8], BrokerError>,
    /// Properties in transmission order, `None` if the property map
    /// could not be read.
    pub properties: Option<&'a [Property<'a>]>,
}

/// What a [`SessionHandler`](super::SessionHandler) sees: ids resolved to
/// [`NULL_PLACEHOLDER`] when absent, payload extraction errors already
/// reported.
#[derive(Debug, Clone, Copy)]
pub struct ReceivedMessage<'a> {
    pub message_id: &'a str,
    pub correlation_id: &'a str,
    /// `None` when the payload could not be extracted.
    pub payload: Option<&'a [u8]>,
    pub properties: &'a [Property<'a>],
}

impl<'a> ReceivedMessage<'a> {
    /// Normalize an inbound message.  Never fails: problems with the
    /// payload or the property map are logged and the message is still
    /// handed on for a disposition.
    pub fn extract(msg: &InboundMessage<'a>) -> Self {
        let payload = match msg.body {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!("Session: unable to retrieve the message data ({})", e);
                None
            }
        };
        let properties = msg.properties.unwrap_or_else(|| {
            error!("Session: unable to retrieve the message properties");
            &[]
        });
        Self {
            message_id: msg.message_id.unwrap_or(NULL_PLACEHOLDER),
            correlation_id: msg.correlation_id.unwrap_or(NULL_PLACEHOLDER),
            payload,
            properties,
        }
    }

    pub fn size(&self) -> usize {
        self.payload.map_or(0, <[u8]>::len)
    }

    /// Look up a property by key.
    pub fn property(&self, key: &str) -> Option<&'a str> {
        self.properties.iter().find(|p| p.key == key).map(|p| p.value)
    }
}
