//! Listener lifecycle: creation, shared-listener joins, worker threads and shutdown.
//!
//! # Components
//!
//! - [`ServerCore`]: owns every server and connection record and is the entry point for creating
//!   servers; commands reach it through a [`ControlChannel`]
//! - `Listener`: one bound socket, its output channels and the round-robin turnstile
//! - `ListenerRegistry`: shared listeners by host and bound port
//! - `Worker`: one accept loop on its own thread
//!
//! # Shared listeners
//!
//! Creating a server with [`ServerOptions::shared`] on a host and port that already has a shared
//! listener does not bind again: the new output channel joins the existing socket and gets the
//! next shared index. Accepted connections then rotate over the participants in index order.
//!
//! # Shutdown
//!
//! Stopping a server closes its socket, shuts down the connections it accepted, wakes and joins
//! its workers (each within [`CoreConfig::stop_timeout`], a worker that misses it is detached),
//! and drops every output channel of the listener so receivers observe the end of the stream.

mod listener;
mod registry;
mod worker;

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thunderdome::Arena;
use tracing::{debug, error, info, warn};

use crate::config::{CoreConfig, ServerOptions};
use crate::connection::ConnectionTable;
use crate::dispatcher::ControlChannel;
use crate::ensure;
use crate::protocol::{CommandError, ConnectionId, OutputChannel, ServerError, ServerHandle};
use listener::Listener;
use registry::ListenerRegistry;
use worker::Worker;

/// One bound socket and the worker threads accepting on it.
#[derive(Debug)]
struct ServerInfo {
    host: String,
    bound_port: u16,
    shared: bool,
    listener: Arc<Listener>,
    workers: Vec<(usize, JoinHandle<()>)>,
}

/// Server records and the shared-listener registry, guarded together.
#[derive(Debug, Default)]
struct ServerTable {
    servers: Arena<ServerInfo>,
    registry: ListenerRegistry,
}

#[derive(Debug)]
struct CoreInner {
    config: CoreConfig,
    table: Mutex<ServerTable>,
    connections: Arc<ConnectionTable>,
}

/// The result of [`ServerCore::create_server`].
#[derive(Debug)]
pub struct ServerBinding {
    /// The listener this call created or joined.
    pub server: ServerHandle,
    /// Control channel tied to this call; stopping the server through it closes it.
    pub control: ControlChannel,
    /// Index among the participants of a shared listener, `None` when not shared.
    pub shared_index: Option<usize>,
}

impl ServerBinding {
    /// Returns the shared index, or -1 when the server is not shared.
    pub fn shared_index_or_minus_one(&self) -> i64 {
        self.shared_index.and_then(|index| i64::try_from(index).ok()).unwrap_or(-1)
    }
}

/// Owner of every listener, worker and connection record.
///
/// Cloning is cheap and every clone refers to the same records.
///
/// # Example
///
/// ```no_run
/// use micro_hypertext::config::ServerOptions;
/// use micro_hypertext::dispatcher::Command;
/// use micro_hypertext::protocol::output_channel;
/// use micro_hypertext::server::ServerCore;
///
/// let core = ServerCore::default();
/// let (events, mut receiver) = output_channel();
/// let binding = core.create_server(&ServerOptions::new("127.0.0.1", 8080), events).unwrap();
/// binding.control.send(Command::StartWorker { worker_index: 0 }).unwrap();
///
/// while let Some(envelope) = receiver.blocking_recv() {
///     println!("{:?} {:?}", envelope.connection, envelope.event);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServerCore {
    inner: Arc<CoreInner>,
}

impl Default for CoreInner {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl CoreInner {
    fn new(config: CoreConfig) -> Self {
        Self { config, table: Mutex::new(ServerTable::default()), connections: Arc::new(ConnectionTable::default()) }
    }
}

impl ServerCore {
    pub fn new(config: CoreConfig) -> Self {
        Self { inner: Arc::new(CoreInner::new(config)) }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Creates a listening server, or joins an existing shared one.
    ///
    /// Events of connections routed to this call are posted to `channel`. No thread is started
    /// here; send [`Command::StartWorker`](crate::dispatcher::Command::StartWorker) through the
    /// returned control channel for that.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the host is not an address of the requested family, or if
    /// creating, configuring, binding or listening on the socket fails. Nothing is registered
    /// in that case.
    pub fn create_server(&self, options: &ServerOptions, channel: OutputChannel) -> Result<ServerBinding, ServerError> {
        let mut table = self.inner.table.lock();

        if options.is_shared()
            && let Some(server) = table.registry.find_shared(options.host(), options.port())
            && let Some(info) = table.servers.get(server.0)
        {
            let index = info.listener.join(channel);
            info!(host = options.host(), port = info.bound_port, server = ?server, shared_index = index, "joined shared listener");
            return Ok(self.binding(server, Some(index)));
        }

        let listener = Listener::bind(options, channel)?;
        let bound_port = listener.local_addr().port();
        let info = ServerInfo {
            host: options.host().to_owned(),
            bound_port,
            shared: options.is_shared(),
            listener: Arc::new(listener),
            workers: Vec::new(),
        };
        let server = ServerHandle(table.servers.insert(info));

        let shared_index = if options.is_shared() {
            table.registry.register(options.host(), bound_port, server);
            Some(0)
        } else {
            None
        };

        info!(host = options.host(), port = bound_port, ipv6 = options.is_ipv6(), shared = options.is_shared(), server = ?server, "start listening");
        Ok(self.binding(server, shared_index))
    }

    fn binding(&self, server: ServerHandle, shared_index: Option<usize>) -> ServerBinding {
        ServerBinding { server, control: ControlChannel::new(self.clone(), server), shared_index }
    }

    /// Returns the address the server's socket is bound to.
    pub fn local_addr(&self, server: ServerHandle) -> Option<SocketAddr> {
        self.inner.table.lock().servers.get(server.0).map(|info| info.listener.local_addr())
    }

    /// Starts an accept loop for `worker_index` on its own thread.
    ///
    /// On a shared listener each index may run one worker and must belong to a participant
    /// that has joined; any other start is refused with [`CommandError::WorkerRefused`].
    pub(crate) fn start_worker(&self, server: ServerHandle, worker_index: usize) -> Result<(), CommandError> {
        let mut table = self.inner.table.lock();
        let info = table.servers.get_mut(server.0).ok_or(CommandError::StaleServer)?;

        ensure!(info.listener.claim(worker_index), CommandError::WorkerRefused { worker_index });

        let worker = Worker {
            server,
            index: worker_index,
            listener: Arc::clone(&info.listener),
            connections: Arc::clone(&self.inner.connections),
            read_size: self.inner.config.read_buffer_size,
        };

        match worker.spawn() {
            Ok(handle) => {
                info.workers.push((worker_index, handle));
                Ok(())
            }
            Err(source) => {
                error!(server = ?server, worker = worker_index, cause = %source, "failed to spawn worker thread");
                Err(CommandError::Spawn { source })
            }
        }
    }

    /// Closes the server's socket and connections and joins its workers.
    pub(crate) fn stop_server(&self, server: ServerHandle) -> Result<(), CommandError> {
        let info = {
            let mut table = self.inner.table.lock();
            let info = table.servers.remove(server.0).ok_or(CommandError::StaleServer)?;
            if info.shared {
                table.registry.deregister(server);
            }
            info
        };

        info.listener.close(info.workers.len());
        let closed = self.inner.connections.remove_server(server);
        debug!(server = ?server, connections = closed, workers = info.workers.len(), "stopping server");

        let deadline = Instant::now() + self.inner.config.stop_timeout;
        for (index, handle) in info.workers {
            join_until(server, index, handle, deadline);
        }

        info!(host = %info.host, port = info.bound_port, server = ?server, "server stopped");
        Ok(())
    }

    pub(crate) fn write(&self, connection: ConnectionId, bytes: &[u8]) -> Result<(), CommandError> {
        self.inner.connections.write(connection, bytes)
    }

    pub(crate) fn close(&self, connection: ConnectionId) -> Result<(), CommandError> {
        self.inner.connections.close(connection)
    }
}

fn join_until(server: ServerHandle, index: usize, handle: JoinHandle<()>, deadline: Instant) {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(server = ?server, worker = index, "worker did not exit in time, detaching it");
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }

    if handle.join().is_err() {
        warn!(server = ?server, worker = index, "worker thread panicked");
    }
}
