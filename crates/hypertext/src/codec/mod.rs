//! HTTP codec module for decoding request byte streams into events
//!
//! This module provides the streaming parser session used by every connection. It uses a
//! state machine to handle heads and payload data without buffering whole requests.
//!
//! # Architecture
//!
//! - [`RequestDecoder`]: turns a byte stream into ordered [`RequestEvent`](crate::protocol::RequestEvent)s
//! - [`HeaderDecoder`]: head parsing, see the `header` module
//! - Payload decoding (content-length and chunked) in the `body` module
//!
//! # Features
//!
//! - Streaming processing of HTTP messages
//! - Support for chunked transfer encoding
//! - Content-Length based payload handling
//! - Pipelined keep-alive requests
//! - Protocol upgrades with raw byte forwarding
//! - Zero-copy url, field and body slices

mod body;
mod header;
mod request_decoder;

pub use header::{HeaderDecoder, MAX_HEADER_BYTES, MAX_HEADER_NUM};
pub use request_decoder::RequestDecoder;
