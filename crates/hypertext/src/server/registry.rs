//! Table of listeners that accept shared participants.

use crate::protocol::ServerHandle;

#[derive(Debug)]
struct RegistryEntry {
    host: String,
    port: u16,
    server: ServerHandle,
}

/// Shared listeners keyed by host text and bound port.
///
/// Only listeners created in shared mode are registered. The port is the one the socket actually
/// bound, so two requests for port 0 never end up joining each other.
#[derive(Debug, Default)]
pub(crate) struct ListenerRegistry {
    entries: Vec<RegistryEntry>,
}

impl ListenerRegistry {
    /// Returns the shared listener bound to exactly `host` and `port`, if any.
    pub(crate) fn find_shared(&self, host: &str, port: u16) -> Option<ServerHandle> {
        self.entries.iter().find(|entry| entry.host == host && entry.port == port).map(|entry| entry.server)
    }

    pub(crate) fn register(&mut self, host: &str, port: u16, server: ServerHandle) {
        self.entries.push(RegistryEntry { host: host.to_owned(), port, server });
    }

    /// Removes the entry of `server`; returns false if it was never registered.
    pub(crate) fn deregister(&mut self, server: ServerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.server != server);
        self.entries.len() != before
    }
}
