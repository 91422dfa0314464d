//! Request body decoding.
//!
//! - [`LengthDecoder`](length_decoder::LengthDecoder): fixed-length payloads
//! - [`ChunkedDecoder`](chunked_decoder::ChunkedDecoder): chunked transfer encoding
//! - [`PayloadDecoder`]: picks one of the above from the request head
//!
//! All of them hand out body data as slices split off the receive buffer, so body bytes are
//! never copied on their way to the output channel.

mod chunked_decoder;
mod length_decoder;
mod payload_decoder;

pub use payload_decoder::PayloadDecoder;
