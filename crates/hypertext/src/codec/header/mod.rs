//! Request head decoding.
//!
//! - [`HeaderDecoder`]: parses the request line and header block with `httparse`, and
//!   works out body framing, keep-alive and upgrade from the fields.

mod header_decoder;

pub use header_decoder::{HeaderDecoder, MAX_HEADER_BYTES, MAX_HEADER_NUM};
