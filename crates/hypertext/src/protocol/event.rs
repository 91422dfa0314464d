use bytes::Bytes;
use http::Method;
use tokio::sync::mpsc;

use crate::protocol::ConnectionId;

/// Sending half of an output channel.
///
/// Ordered, single consumer and never blocking the producer: worker threads post events
/// without waiting for the consumer to catch up.
pub type OutputChannel = mpsc::UnboundedSender<EventEnvelope>;

/// Receiving half of an output channel, held by the consumer.
pub type EventReceiver = mpsc::UnboundedReceiver<EventEnvelope>;

/// Creates a new output channel pair.
pub fn output_channel() -> (OutputChannel, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Wire codes of [`RequestEvent`] variants.
pub mod event_code {
    pub const MESSAGE_BEGIN: u8 = 0;
    pub const MESSAGE_COMPLETE: u8 = 1;
    pub const URL: u8 = 2;
    pub const HEADER_FIELD: u8 = 3;
    pub const HEADER_VALUE: u8 = 4;
    pub const BODY: u8 = 5;
    pub const UPGRADE_DETECTED: u8 = 6;
    pub const RAW_UPGRADE_BYTES: u8 = 7;
}

/// Everything the parser knows once a request has been fully received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageComplete {
    pub method: Method,
    /// Numeric method code, see [`method_code`](crate::protocol::method_code).
    pub method_code: u8,
    pub http_major: u8,
    pub http_minor: u8,
    /// Whether the connection may carry another request after this one.
    pub keep_alive: bool,
    /// Raw peer address octets: 4 for IPv4 listeners, 16 for IPv6 listeners.
    pub peer_address: Bytes,
}

/// A single unit of request progress, posted as soon as the parser recognizes it.
///
/// For one connection, events always arrive in stream order:
/// `MessageBegin`, `Url`, zero or more `HeaderField`/`HeaderValue` pairs, zero or more `Body`
/// fragments, `MessageComplete`; then optionally `UpgradeDetected` followed by
/// `RawUpgradeBytes` until the peer goes away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestEvent {
    MessageBegin,
    MessageComplete(MessageComplete),
    Url(Bytes),
    HeaderField(Bytes),
    HeaderValue(Bytes),
    Body(Bytes),
    UpgradeDetected,
    RawUpgradeBytes(Bytes),
}

impl RequestEvent {
    /// Returns the wire code of this event.
    pub fn code(&self) -> u8 {
        match self {
            RequestEvent::MessageBegin => event_code::MESSAGE_BEGIN,
            RequestEvent::MessageComplete(_) => event_code::MESSAGE_COMPLETE,
            RequestEvent::Url(_) => event_code::URL,
            RequestEvent::HeaderField(_) => event_code::HEADER_FIELD,
            RequestEvent::HeaderValue(_) => event_code::HEADER_VALUE,
            RequestEvent::Body(_) => event_code::BODY,
            RequestEvent::UpgradeDetected => event_code::UPGRADE_DETECTED,
            RequestEvent::RawUpgradeBytes(_) => event_code::RAW_UPGRADE_BYTES,
        }
    }

    /// Returns the byte payload carried by the event, if it carries one.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            RequestEvent::Url(bytes)
            | RequestEvent::HeaderField(bytes)
            | RequestEvent::HeaderValue(bytes)
            | RequestEvent::Body(bytes)
            | RequestEvent::RawUpgradeBytes(bytes) => Some(bytes),
            RequestEvent::MessageBegin | RequestEvent::MessageComplete(_) | RequestEvent::UpgradeDetected => None,
        }
    }
}

/// An event tagged with the connection it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub connection: ConnectionId,
    pub event: RequestEvent,
}

impl EventEnvelope {
    pub fn new(connection: ConnectionId, event: RequestEvent) -> Self {
        Self { connection, event }
    }

    /// Returns the wire code of the wrapped event.
    #[inline]
    pub fn code(&self) -> u8 {
        self.event.code()
    }
}
