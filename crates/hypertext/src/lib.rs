//! The network-facing core of an HTTP server primitive
//!
//! This crate owns listening sockets, distributes accepted connections across worker threads and
//! parses each connection's bytes into request events as they are recognized. The events are
//! posted to an output channel held by a consumer outside this crate, which decides what to do
//! with them and answers through write and close commands.
//!
//! # Features
//!
//! - Streaming HTTP/1.x request parsing: events leave as soon as they are recognized
//! - Chunked transfer encoding and Content-Length bodies
//! - Pipelined keep-alive requests
//! - Protocol upgrades (`Upgrade` and `CONNECT`) with raw byte forwarding
//! - Shared listeners: several participants, each with its own output channel, serving one
//!   socket in round-robin order
//! - Zero-copy url, header and body slices
//! - Generation-checked server and connection handles
//!
//! # Example
//!
//! ```no_run
//! use micro_hypertext::config::ServerOptions;
//! use micro_hypertext::dispatcher::Command;
//! use micro_hypertext::protocol::{RequestEvent, output_channel};
//! use micro_hypertext::server::ServerCore;
//! use bytes::Bytes;
//! use tracing::{error, info};
//!
//! let core = ServerCore::default();
//! let (events, mut receiver) = output_channel();
//!
//! let binding = match core.create_server(&ServerOptions::new("127.0.0.1", 8080), events) {
//!     Ok(binding) => binding,
//!     Err(e) => {
//!         error!(cause = %e, "bind server error");
//!         return;
//!     }
//! };
//! binding.control.send(Command::StartWorker { worker_index: 0 }).unwrap();
//!
//! while let Some(envelope) = receiver.blocking_recv() {
//!     info!(connection = ?envelope.connection, code = envelope.code(), "event");
//!     if let RequestEvent::MessageComplete(_) = envelope.event {
//!         let response = Bytes::from_static(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
//!         binding.control.send(Command::Write { connection: envelope.connection, bytes: response }).unwrap();
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`server`]: socket creation, shared-listener registry and worker accept loops
//! - [`connection`]: per-connection read loop and event emission
//! - [`codec`]: the request parser session, a `tokio_util` [`Decoder`](tokio_util::codec::Decoder)
//! - [`dispatcher`]: the control plane
//! - [`protocol`]: events, handles and errors
//! - [`address`]: rendering raw peer addresses
//! - [`config`]: creation options and tunables
//!
//! # Concurrency
//!
//! Each worker runs on its own OS thread and serves one connection at a time: it accepts the
//! next connection only after the current one stops sending. Commands run on whichever thread
//! sends them. For one connection events arrive in stream order; across connections there is
//! no ordering.
//!
//! # Limitations
//!
//! - HTTP/1.x only (currently HTTP/2 or HTTP/3 is not supported)
//! - No TLS support (use a reverse proxy for HTTPS)
//! - Maximum head size: 80KB
//! - Maximum number of headers: 64
//! - A shared participant that never starts its worker stalls the rotation at its turn

pub mod address;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
