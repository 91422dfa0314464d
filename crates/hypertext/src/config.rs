//! Server creation options and process-level tunables.

use std::time::Duration;

/// Default listen backlog applied after the kernel maximum.
pub const DEFAULT_BACKLOG: u32 = 128;

/// Size of the per-connection read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 80 * 1024;

/// How long a stop waits for worker threads to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for a single [`create_server`](crate::server::ServerCore::create_server) call.
///
/// # Example
///
/// ```
/// use micro_hypertext::config::ServerOptions;
///
/// let options = ServerOptions::new("127.0.0.1", 8080).shared(true).backlog(1024);
/// assert!(options.is_shared());
/// assert!(!options.is_ipv6());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    host: String,
    port: u16,
    ipv6: bool,
    shared: bool,
    backlog: u32,
}

impl ServerOptions {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self { host: host.into(), port, ipv6: false, shared: false, backlog: DEFAULT_BACKLOG }
    }

    /// Binds an IPv6 socket; `host` must then be an IPv6 literal.
    #[must_use]
    pub fn ipv6(mut self, enable: bool) -> Self {
        self.ipv6 = enable;
        self
    }

    /// Joins (or creates) a listener shared by every server created with the same host and port.
    #[must_use]
    pub fn shared(mut self, enable: bool) -> Self {
        self.shared = enable;
        self
    }

    #[must_use]
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_ipv6(&self) -> bool {
        self.ipv6
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn backlog_size(&self) -> u32 {
        self.backlog
    }
}

/// Tunables shared by every server of one [`ServerCore`](crate::server::ServerCore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Bytes read from a connection per read call.
    pub read_buffer_size: usize,
    /// Join budget for worker threads when a server stops; late workers are detached.
    pub stop_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self { read_buffer_size: DEFAULT_READ_BUFFER_SIZE, stop_timeout: DEFAULT_STOP_TIMEOUT }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ServerOptions::new("::1", 0).ipv6(true);
        assert_eq!(options.host(), "::1");
        assert_eq!(options.port(), 0);
        assert!(options.is_ipv6());
        assert!(!options.is_shared());
        assert_eq!(options.backlog_size(), DEFAULT_BACKLOG);

        let config = CoreConfig::default();
        assert_eq!(config.read_buffer_size, 80 * 1024);
        assert_eq!(config.stop_timeout, Duration::from_secs(5));
    }
}
