//! The listening socket and the routes its connections are handed to.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tracing::{debug, trace};

use crate::config::ServerOptions;
use crate::protocol::{OutputChannel, ServerError};

/// Output channels of one listener and the round-robin cursor over them.
///
/// An unshared listener has exactly one channel, so every connection goes there and any number
/// of workers may accept at once. A shared listener has one channel per participant and only
/// the worker whose index equals the cursor may accept.
#[derive(Debug)]
pub(crate) struct Routes {
    channels: Vec<OutputChannel>,
    cursor: usize,
    shared: bool,
    claimed: Vec<usize>,
}

impl Routes {
    pub(crate) fn new(channel: OutputChannel, shared: bool) -> Self {
        Self { channels: vec![channel], cursor: 0, shared, claimed: Vec::new() }
    }

    /// Appends a participant channel and returns its index.
    pub(crate) fn push(&mut self, channel: OutputChannel) -> usize {
        self.channels.push(channel);
        self.channels.len() - 1
    }

    fn on_turn(&self, index: usize) -> bool {
        !self.shared || self.cursor == index
    }

    /// Reserves `index` for one worker; a shared listener has one worker per channel.
    fn claim(&mut self, index: usize) -> bool {
        if !self.shared {
            return true;
        }
        if index >= self.channels.len() || self.claimed.contains(&index) {
            return false;
        }
        self.claimed.push(index);
        true
    }

    /// Returns the channel for the next accepted connection and advances the cursor.
    pub(crate) fn next(&mut self) -> Option<(usize, OutputChannel)> {
        let index = self.cursor;
        let channel = self.channels.get(index)?.clone();
        self.cursor = (index + 1) % self.channels.len();
        Some((index, channel))
    }
}

/// A connection accepted by [`Listener::accept`], with the channel it was routed to.
#[derive(Debug)]
pub(crate) struct Accepted {
    pub(crate) stream: TcpStream,
    pub(crate) peer: SocketAddr,
    pub(crate) route: usize,
    pub(crate) channel: OutputChannel,
}

/// One bound, listening socket.
#[derive(Debug)]
pub(crate) struct Listener {
    socket: TcpListener,
    local_addr: SocketAddr,
    ipv6: bool,
    routes: Mutex<Routes>,
    turn: Condvar,
    closed: AtomicBool,
}

impl Listener {
    /// Creates, configures, binds and starts listening on a new socket.
    ///
    /// The backlog is applied twice: first the largest value the kernel accepts, then the
    /// requested one.
    pub(crate) fn bind(options: &ServerOptions, channel: OutputChannel) -> Result<Self, ServerError> {
        let ipv6 = options.is_ipv6();
        let ip = parse_host(options.host(), ipv6)?;
        let addr = SocketAddr::new(ip, options.port());

        let domain = if ipv6 { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(|source| ServerError::Socket { source })?;

        socket.set_reuse_address(true).map_err(|source| ServerError::ReuseAddress { source })?;

        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        socket.set_reuse_port(true).map_err(|source| ServerError::ReusePort { source })?;

        socket.bind(&addr.into()).map_err(|source| ServerError::Bind { addr, source })?;

        socket.listen(i32::MAX).map_err(|source| ServerError::Listen { backlog: i32::MAX, source })?;
        let backlog = i32::try_from(options.backlog_size()).unwrap_or(i32::MAX);
        socket.listen(backlog).map_err(|source| ServerError::Listen { backlog, source })?;

        let socket: TcpListener = socket.into();
        let local_addr = socket.local_addr().map_err(|source| ServerError::LocalAddr { source })?;
        debug!(%local_addr, backlog, "listening socket ready");

        Ok(Self {
            socket,
            local_addr,
            ipv6,
            routes: Mutex::new(Routes::new(channel, options.is_shared())),
            turn: Condvar::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn is_ipv6(&self) -> bool {
        self.ipv6
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Adds a shared participant and returns its index.
    pub(crate) fn join(&self, channel: OutputChannel) -> usize {
        self.routes.lock().push(channel)
    }

    pub(crate) fn claim(&self, index: usize) -> bool {
        self.routes.lock().claim(index)
    }

    /// Blocks until worker `index` may accept; returns false once the listener is closed.
    pub(crate) fn wait_turn(&self, index: usize) -> bool {
        let mut routes = self.routes.lock();
        while !self.is_closed() && !routes.on_turn(index) {
            self.turn.wait(&mut routes);
        }
        !self.is_closed()
    }

    /// Accepts one connection and routes it; `Ok(None)` means the listener was closed meanwhile.
    pub(crate) fn accept(&self) -> io::Result<Option<Accepted>> {
        let (stream, peer) = self.socket.accept()?;
        if self.is_closed() {
            return Ok(None);
        }

        let next = self.routes.lock().next();
        self.turn.notify_all();

        Ok(next.map(|(route, channel)| Accepted { stream, peer, route, channel }))
    }

    /// Marks the listener closed and wakes every worker blocked on it.
    pub(crate) fn close(&self, workers: usize) {
        self.closed.store(true, Ordering::Release);

        if let Err(e) = SockRef::from(&self.socket).shutdown(Shutdown::Both) {
            trace!(cause = %e, "listening socket shutdown failed");
        }
        self.poke(workers);

        let _routes = self.routes.lock();
        self.turn.notify_all();
    }

    /// Linux fails pending accepts on shutdown; elsewhere each blocked accept needs a connection.
    #[cfg(not(target_os = "linux"))]
    fn poke(&self, workers: usize) {
        use std::time::Duration;

        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(if self.ipv6 { IpAddr::V6(Ipv6Addr::LOCALHOST) } else { IpAddr::V4(Ipv4Addr::LOCALHOST) });
        }
        for _ in 0..workers {
            if let Err(e) = TcpStream::connect_timeout(&addr, Duration::from_millis(100)) {
                trace!(cause = %e, "wake-up connect failed");
                break;
            }
        }
    }

    #[cfg(target_os = "linux")]
    #[allow(clippy::unused_self, reason = "same signature as the non-linux wake-up")]
    fn poke(&self, _workers: usize) {}
}

fn parse_host(host: &str, ipv6: bool) -> Result<IpAddr, ServerError> {
    let ip = if ipv6 {
        host.parse::<Ipv6Addr>().map(IpAddr::V6)
    } else {
        host.parse::<Ipv4Addr>().map(IpAddr::V4)
    };
    ip.map_err(|_e| ServerError::invalid_host(host, ipv6))
}
