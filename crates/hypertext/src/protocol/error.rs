use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Failure to create or join a listening socket.
///
/// Always surfaced synchronously from [`ServerCore::create_server`](crate::server::ServerCore::create_server),
/// before any worker thread exists, and never leaves a partially registered server behind.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid {family} host: {host}")]
    InvalidHost { host: String, family: &'static str },

    #[error("failed to create socket: {source}")]
    Socket { source: io::Error },

    #[error("cannot reuse address for socket: {source}")]
    ReuseAddress { source: io::Error },

    #[error("cannot reuse port for socket: {source}")]
    ReusePort { source: io::Error },

    #[error("failed to bind socket to {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed to listen to bound socket with backlog {backlog}: {source}")]
    Listen { backlog: i32, source: io::Error },

    #[error("failed to read local address of bound socket: {source}")]
    LocalAddr { source: io::Error },
}

impl ServerError {
    pub fn invalid_host<S: ToString>(host: S, ipv6: bool) -> Self {
        Self::InvalidHost { host: host.to_string(), family: if ipv6 { "IPv6" } else { "IPv4" } }
    }
}

/// Failure to render raw address bytes as text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid {family} address: expected {expected} bytes, got {actual}")]
    InvalidLength { family: &'static str, expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("received {len} bytes after a message that closes the connection")]
    DataAfterClose { len: usize },

    /// Raised by `Decoder::decode_eof` when a stream ends inside a message.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }
}

/// Failure local to a single accepted connection.
///
/// Never propagated past the connection it belongs to: the worker logs it,
/// closes that socket and moves on to the next accept.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("request error: {source}")]
    Request {
        #[from]
        source: ParseError,
    },

    #[error("read error: {source}")]
    Read { source: io::Error },

    #[error("write error: {source}")]
    Write { source: io::Error },
}

impl ConnectionError {
    pub fn read(e: io::Error) -> Self {
        Self::Read { source: e }
    }

    pub fn write(e: io::Error) -> Self {
        Self::Write { source: e }
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("missing argument #{index} for opcode {opcode}")]
    MissingArgument { opcode: i64, index: usize },

    #[error("argument #{index} for opcode {opcode} has the wrong type, expected {expected}")]
    InvalidArgument { opcode: i64, index: usize, expected: &'static str },

    #[error("server handle is stale or unknown")]
    StaleServer,

    #[error("connection handle is stale or unknown")]
    StaleConnection,

    #[error("control channel is closed")]
    ControlClosed,

    #[error("worker index {worker_index} is already running or has no shared channel")]
    WorkerRefused { worker_index: usize },

    #[error("failed to spawn worker thread: {source}")]
    Spawn { source: io::Error },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl CommandError {
    pub fn missing_argument(opcode: i64, index: usize) -> Self {
        Self::MissingArgument { opcode, index }
    }

    pub fn invalid_argument(opcode: i64, index: usize, expected: &'static str) -> Self {
        Self::InvalidArgument { opcode, index, expected }
    }
}
