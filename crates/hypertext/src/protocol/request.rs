//! Parsed request head.
//!
//! Unlike a typed `http::Request`, the head keeps the url and every header field and value as
//! raw byte slices of the receive buffer, in wire order, because the consumer wants them as
//! separate events rather than as a header map.

use bytes::Bytes;
use http::{Method, Version};

use crate::protocol::PayloadSize;

/// One `name: value` pair, exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Bytes,
    pub value: Bytes,
}

/// A fully received request line plus header block.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub(crate) method: Method,
    pub(crate) method_code: u8,
    pub(crate) version: Version,
    pub(crate) url: Bytes,
    pub(crate) fields: Vec<HeaderField>,
    pub(crate) payload_size: PayloadSize,
    pub(crate) upgrade: bool,
    pub(crate) keep_alive: bool,
}

impl RequestHead {
    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the numeric method code, see [`method_code`](crate::protocol::method_code).
    pub fn method_code(&self) -> u8 {
        self.method_code
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the raw request target.
    pub fn url(&self) -> &Bytes {
        &self.url
    }

    /// Returns the header fields in the order they were received.
    pub fn fields(&self) -> &[HeaderField] {
        &self.fields
    }

    pub fn payload_size(&self) -> PayloadSize {
        self.payload_size
    }

    /// Returns true if the rest of the stream switches to another protocol after this message.
    pub fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    /// Returns true if the connection may carry another request after this one.
    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Returns the (major, minor) version pair.
    pub fn version_numbers(&self) -> (u8, u8) {
        match self.version {
            Version::HTTP_09 => (0, 9),
            Version::HTTP_10 => (1, 0),
            Version::HTTP_2 => (2, 0),
            Version::HTTP_3 => (3, 0),
            _ => (1, 1),
        }
    }
}
