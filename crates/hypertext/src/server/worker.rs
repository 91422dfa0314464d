//! The accept loop of one worker thread.

use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::address::peer_octets;
use crate::codec::RequestDecoder;
use crate::connection::{ConnectionTable, EventEmitter, HttpConnection};
use crate::protocol::ServerHandle;
use crate::server::listener::{Accepted, Listener};

/// Everything a worker thread needs, moved onto the thread when it starts.
#[derive(Debug)]
pub(crate) struct Worker {
    pub(crate) server: ServerHandle,
    pub(crate) index: usize,
    pub(crate) listener: Arc<Listener>,
    pub(crate) connections: Arc<ConnectionTable>,
    pub(crate) read_size: usize,
}

impl Worker {
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(format!("hypertext-worker-{}", self.index)).spawn(move || self.run())
    }

    /// Accepts and serves connections one at a time until the listener closes or accept fails.
    fn run(self) {
        debug!(server = ?self.server, worker = self.index, "worker started");

        while self.listener.wait_turn(self.index) {
            match self.listener.accept() {
                Ok(Some(accepted)) => self.serve(accepted),
                Ok(None) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    if !self.listener.is_closed() {
                        warn!(server = ?self.server, worker = self.index, cause = %e, "accept failed, worker stops");
                    }
                    break;
                }
            }
        }

        debug!(server = ?self.server, worker = self.index, "worker exited");
    }

    fn serve(&self, accepted: Accepted) {
        let Accepted { stream, peer, route, channel } = accepted;

        let connection = match self.connections.insert(self.server, &stream) {
            Ok(connection) => connection,
            Err(e) => {
                warn!(server = ?self.server, %peer, cause = %e, "failed to register connection, dropping it");
                return;
            }
        };

        // a stop that ran between accept and insert has already shut down this server's connections
        if self.listener.is_closed() {
            debug!(connection = ?connection, %peer, "listener closed while accepting, dropping connection");
            self.connections.remove(connection);
            return;
        }
        debug!(connection = ?connection, %peer, route, worker = self.index, "accepted connection");

        let peer_address = Bytes::from(peer_octets(peer.ip(), self.listener.is_ipv6()));
        let http_connection = HttpConnection::new(
            stream,
            RequestDecoder::new(peer_address),
            EventEmitter::new(connection, channel),
            self.read_size,
        );

        match http_connection.process() {
            Ok(()) => debug!(connection = ?connection, "peer finished sending"),
            Err(e) => {
                debug!(connection = ?connection, cause = %e, "connection terminated");
                self.connections.remove(connection);
            }
        }
    }
}
