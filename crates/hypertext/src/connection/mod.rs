//! Per-connection handling
//!
//! # Components
//!
//! - [`HttpConnection`]: the read loop of one accepted connection, feeding the parser session
//! - [`EventEmitter`]: posts recognized events to the connection's output channel
//! - `ConnectionTable`: the accepted connections that write and close commands can reach
//!
//! # Lifecycle
//!
//! A connection is registered before its first event is posted, so every
//! [`ConnectionId`](crate::protocol::ConnectionId) the consumer sees can be written to. It is
//! shut down and forgotten on a read failure, a malformed request, a failed write, an explicit
//! close, or when its server stops. When the peer simply stops sending the connection stays
//! registered until the consumer closes it.

mod emitter;
mod http_connection;
mod table;

pub use emitter::EventEmitter;
pub use http_connection::HttpConnection;
pub(crate) use table::ConnectionTable;
