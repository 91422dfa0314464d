//! Registry of accepted connections that commands can still reach.

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use parking_lot::Mutex;
use thunderdome::Arena;
use tracing::{debug, trace};

use crate::protocol::{CommandError, ConnectionError, ConnectionId, ServerHandle};

#[derive(Debug)]
struct ConnectionEntry {
    server: ServerHandle,
    stream: Arc<TcpStream>,
}

/// Accepted connections by [`ConnectionId`].
///
/// A connection stays here after its peer stops sending so the consumer can still write the
/// response; it leaves on `close`, on a failed write, on a read or parse failure, or when its
/// server stops.
#[derive(Debug, Default)]
pub(crate) struct ConnectionTable {
    entries: Mutex<Arena<ConnectionEntry>>,
}

impl ConnectionTable {
    /// Registers a second handle to `stream` and returns the id events will carry.
    pub(crate) fn insert(&self, server: ServerHandle, stream: &TcpStream) -> io::Result<ConnectionId> {
        let stream = Arc::new(stream.try_clone()?);
        Ok(ConnectionId(self.entries.lock().insert(ConnectionEntry { server, stream })))
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, connection: ConnectionId) -> bool {
        self.entries.lock().contains(connection.0)
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Writes all of `bytes`; on failure the connection is shut down and forgotten.
    pub(crate) fn write(&self, connection: ConnectionId, bytes: &[u8]) -> Result<(), CommandError> {
        let stream = self.stream(connection)?;

        match (&*stream).write_all(bytes) {
            Ok(()) => {
                trace!(connection = ?connection, len = bytes.len(), "wrote bytes");
                Ok(())
            }
            Err(e) => {
                debug!(connection = ?connection, cause = %e, "write failed, closing connection");
                self.remove(connection);
                Err(ConnectionError::write(e).into())
            }
        }
    }

    /// Shuts the connection down in both directions and forgets it.
    pub(crate) fn close(&self, connection: ConnectionId) -> Result<(), CommandError> {
        if self.remove(connection) { Ok(()) } else { Err(CommandError::StaleConnection) }
    }

    /// Shuts the connection down and forgets it; returns false if it was already gone.
    pub(crate) fn remove(&self, connection: ConnectionId) -> bool {
        let Some(entry) = self.entries.lock().remove(connection.0) else {
            return false;
        };
        shutdown(connection, &entry.stream);
        true
    }

    /// Shuts down every connection accepted by `server`; returns how many there were.
    pub(crate) fn remove_server(&self, server: ServerHandle) -> usize {
        let removed = {
            let mut entries = self.entries.lock();
            let ids = entries.iter().filter(|(_, entry)| entry.server == server).map(|(index, _)| index).collect::<Vec<_>>();
            ids.into_iter().filter_map(|index| entries.remove(index).map(|entry| (index, entry))).collect::<Vec<_>>()
        };

        for (index, entry) in &removed {
            shutdown(ConnectionId(*index), &entry.stream);
        }
        removed.len()
    }

    fn stream(&self, connection: ConnectionId) -> Result<Arc<TcpStream>, CommandError> {
        self.entries.lock().get(connection.0).map(|entry| Arc::clone(&entry.stream)).ok_or(CommandError::StaleConnection)
    }
}

fn shutdown(connection: ConnectionId, stream: &TcpStream) {
    match stream.shutdown(Shutdown::Both) {
        Ok(()) => debug!(connection = ?connection, "connection closed"),
        Err(e) => trace!(connection = ?connection, cause = %e, "connection already shut down"),
    }
}
