//! HTTP request event decoder.
//!
//! [`RequestDecoder`] is the per-connection parser session. It turns a byte stream into the
//! ordered [`RequestEvent`] sequence the consumer sees, without buffering whole requests:
//!
//! ```text
//! MessageBegin, Url, (HeaderField, HeaderValue)*, Body*, MessageComplete
//!     [, UpgradeDetected, RawUpgradeBytes*]
//! ```
//!
//! # State Machine
//!
//! ```text
//! AwaitingRequest --first byte--> ParsingHead --head--> ParsingBody --eof--+--> AwaitingRequest (keep-alive)
//!                                                                           +--> Closed
//!                                                                           +--> Upgraded
//! ```
//!
//! Parsing is pure: the decoder never touches a socket, the connection loop drains it and
//! posts whatever it yields.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_hypertext::codec::RequestDecoder;
//! use micro_hypertext::protocol::RequestEvent;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = RequestDecoder::default();
//! let mut buffer = BytesMut::from("GET /x HTTP/1.1\r\nHost: h\r\n\r\n");
//!
//! assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(RequestEvent::MessageBegin));
//! assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(RequestEvent::Url("/x".into())));
//! ```

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, MessageComplete, ParseError, PayloadItem, RequestEvent, RequestHead};

/// Where the session is in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between messages; leading CR/LF is skipped.
    AwaitingRequest,
    /// `MessageBegin` has been emitted, the head is not complete yet.
    ParsingHead,
    /// The head has been emitted, body bytes are being framed.
    ParsingBody,
    /// A message without keep-alive completed; no more requests are accepted.
    Closed,
    /// The connection switched protocols; every byte is forwarded raw.
    Upgraded,
}

/// The parts of a head still needed once its body is done.
#[derive(Debug)]
struct Completion {
    complete: MessageComplete,
    upgrade: bool,
}

/// Streaming request parser producing [`RequestEvent`]s.
///
/// Internally the head and the body are decoded by [`HeaderDecoder`] and [`PayloadDecoder`],
/// the resulting [`Message`]s are expanded into events and queued in wire order.
#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    state: State,
    pending: VecDeque<RequestEvent>,
    completion: Option<Completion>,
    peer_address: Bytes,
}

impl RequestDecoder {
    /// Creates a decoder for a connection whose peer has the given raw address octets.
    pub fn new(peer_address: Bytes) -> Self {
        Self {
            header_decoder: HeaderDecoder,
            payload_decoder: None,
            state: State::AwaitingRequest,
            pending: VecDeque::new(),
            completion: None,
            peer_address,
        }
    }

    /// Returns true once the connection has switched protocols.
    pub fn is_upgraded(&self) -> bool {
        self.state == State::Upgraded
    }

    /// Decodes the next head or body item of the current message.
    fn decode_message(&mut self, src: &mut BytesMut) -> Result<Option<Message<RequestHead>>, ParseError> {
        // parse payload if have payload_decoder
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    // no need payload decoder in this request now
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some(head) => {
                self.payload_decoder = Some(head.payload_size().into());
                Some(Message::Header(head))
            }
            None => None,
        };

        Ok(message)
    }

    /// Queues the url and field events of a freshly parsed head.
    fn on_head(&mut self, head: RequestHead) {
        let (http_major, http_minor) = head.version_numbers();
        trace!(method = %head.method, url_len = head.url.len(), fields = head.fields.len(), "request head parsed");

        self.completion = Some(Completion {
            complete: MessageComplete {
                method: head.method,
                method_code: head.method_code,
                http_major,
                http_minor,
                keep_alive: head.keep_alive,
                peer_address: self.peer_address.clone(),
            },
            upgrade: head.upgrade,
        });

        self.pending.push_back(RequestEvent::Url(head.url));
        for field in head.fields {
            self.pending.push_back(RequestEvent::HeaderField(field.name));
            self.pending.push_back(RequestEvent::HeaderValue(field.value));
        }
        self.state = State::ParsingBody;
    }

    /// Finishes the current message and picks the next state.
    fn on_complete(&mut self) -> Result<RequestEvent, ParseError> {
        let Completion { complete, upgrade } =
            self.completion.take().ok_or_else(|| ParseError::invalid_body("message completed without a head"))?;

        self.state = if upgrade {
            self.pending.push_back(RequestEvent::UpgradeDetected);
            State::Upgraded
        } else if complete.keep_alive {
            State::AwaitingRequest
        } else {
            State::Closed
        };

        trace!(state = ?self.state, "request complete");
        Ok(RequestEvent::MessageComplete(complete))
    }
}

impl Default for RequestDecoder {
    /// A decoder with an empty peer address.
    fn default() -> Self {
        Self::new(Bytes::new())
    }
}

/// Drops leading CR/LF, which may separate pipelined messages.
fn skip_line_breaks(src: &mut BytesMut) {
    let skip = src.iter().take_while(|b| matches!(b, b'\r' | b'\n')).count();
    src.advance(skip);
}

impl Decoder for RequestDecoder {
    type Item = RequestEvent;
    type Error = ParseError;

    /// Yields the next event recognized in `src`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))`: the next event in stream order
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(_)`: the stream is malformed and the connection must be closed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            match self.state {
                State::AwaitingRequest => {
                    skip_line_breaks(src);
                    if src.is_empty() {
                        return Ok(None);
                    }
                    self.state = State::ParsingHead;
                    return Ok(Some(RequestEvent::MessageBegin));
                }

                State::ParsingHead | State::ParsingBody => match self.decode_message(src)? {
                    Some(Message::Header(head)) => self.on_head(head),
                    Some(Message::Payload(PayloadItem::Chunk(bytes))) => return Ok(Some(RequestEvent::Body(bytes))),
                    Some(Message::Payload(PayloadItem::Eof)) => return self.on_complete().map(Some),
                    None => return Ok(None),
                },

                State::Closed => {
                    skip_line_breaks(src);
                    if src.is_empty() {
                        return Ok(None);
                    }
                    return Err(ParseError::DataAfterClose { len: src.len() });
                }

                State::Upgraded => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(RequestEvent::RawUpgradeBytes(src.split().freeze())));
                }
            }
        }
    }
}
