use tracing::trace;

use crate::protocol::{ConnectionId, EventEnvelope, OutputChannel, RequestEvent};

/// Posts the events of one connection to the output channel it was routed to.
///
/// Posting never blocks and never retries. If the consumer has dropped its receiver the event is
/// discarded.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    connection: ConnectionId,
    channel: OutputChannel,
}

impl EventEmitter {
    pub fn new(connection: ConnectionId, channel: OutputChannel) -> Self {
        Self { connection, channel }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Wraps `event` with the connection id and posts it.
    pub fn emit(&self, event: RequestEvent) {
        let code = event.code();
        if self.channel.send(EventEnvelope::new(self.connection, event)).is_err() {
            trace!(connection = ?self.connection, code, "output channel closed, event dropped");
        }
    }
}
