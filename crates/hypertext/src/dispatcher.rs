//! Control plane: commands that start workers, stop servers, and write to or close connections.
//!
//! Commands arrive either typed, as [`Command`], or in the opcode form used on the wire
//! (`opcode` plus positional [`CommandArg`]s), decoded with [`Command::from_opcode`]:
//!
//! | opcode | args                          | command                  |
//! |--------|-------------------------------|--------------------------|
//! | 0      | `Int(worker_index)`           | [`Command::StartWorker`] |
//! | 1      |                               | [`Command::StopServer`]  |
//! | 2      | `Int(connection)`, `Bytes(_)` | [`Command::Write`]       |
//! | 3      | `Int(connection)`             | [`Command::Close`]       |
//! | other  | ignored                       | [`Command::Other`]       |
//!
//! Connection arguments carry [`ConnectionId::to_bits`] values.
//!
//! Dispatch is synchronous: the command runs on the thread that sends it. Stopping a server
//! therefore blocks the sender until the server's workers have exited or the stop timeout has
//! passed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::protocol::{CommandError, ConnectionId, ServerHandle};
use crate::server::ServerCore;

pub const OPCODE_START_WORKER: i64 = 0;
pub const OPCODE_STOP_SERVER: i64 = 1;
pub const OPCODE_WRITE: i64 = 2;
pub const OPCODE_CLOSE: i64 = 3;

/// A positional argument of an opcode-form command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandArg {
    Int(i64),
    Bytes(Bytes),
}

/// A control-plane command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start an accept loop for `worker_index` on a new thread.
    StartWorker { worker_index: usize },
    /// Close the listener and its connections, join its workers and close the control channel.
    StopServer,
    /// Write all of `bytes` to the connection; a failed write closes it.
    Write { connection: ConnectionId, bytes: Bytes },
    /// Close the connection.
    Close { connection: ConnectionId },
    /// Any opcode without a meaning; dispatching it does nothing.
    Other(i64),
}

impl Command {
    /// Decodes the opcode form of a command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::MissingArgument`] or [`CommandError::InvalidArgument`] when the
    /// arguments do not fit the opcode. Unknown opcodes are not an error.
    pub fn from_opcode(opcode: i64, args: Vec<CommandArg>) -> Result<Self, CommandError> {
        let mut args = args.into_iter();

        let command = match opcode {
            OPCODE_START_WORKER => {
                let index = int_arg(opcode, 0, args.next())?;
                let worker_index =
                    usize::try_from(index).map_err(|_e| CommandError::invalid_argument(opcode, 0, "non-negative worker index"))?;
                Command::StartWorker { worker_index }
            }
            OPCODE_STOP_SERVER => Command::StopServer,
            OPCODE_WRITE => {
                let connection = connection_arg(opcode, 0, args.next())?;
                let bytes = match args.next() {
                    Some(CommandArg::Bytes(bytes)) => bytes,
                    Some(CommandArg::Int(_)) => return Err(CommandError::invalid_argument(opcode, 1, "bytes")),
                    None => return Err(CommandError::missing_argument(opcode, 1)),
                };
                Command::Write { connection, bytes }
            }
            OPCODE_CLOSE => Command::Close { connection: connection_arg(opcode, 0, args.next())? },
            other => Command::Other(other),
        };

        Ok(command)
    }

    /// Returns the wire opcode of this command.
    pub fn opcode(&self) -> i64 {
        match self {
            Command::StartWorker { .. } => OPCODE_START_WORKER,
            Command::StopServer => OPCODE_STOP_SERVER,
            Command::Write { .. } => OPCODE_WRITE,
            Command::Close { .. } => OPCODE_CLOSE,
            Command::Other(opcode) => *opcode,
        }
    }
}

fn int_arg(opcode: i64, index: usize, arg: Option<CommandArg>) -> Result<i64, CommandError> {
    match arg {
        Some(CommandArg::Int(value)) => Ok(value),
        Some(CommandArg::Bytes(_)) => Err(CommandError::invalid_argument(opcode, index, "integer")),
        None => Err(CommandError::missing_argument(opcode, index)),
    }
}

fn connection_arg(opcode: i64, index: usize, arg: Option<CommandArg>) -> Result<ConnectionId, CommandError> {
    let bits = u64::from_ne_bytes(int_arg(opcode, index, arg)?.to_ne_bytes());
    ConnectionId::from_bits(bits).ok_or_else(|| CommandError::invalid_argument(opcode, index, "connection id"))
}

/// A command addressed to one server, together with the channel it was sent through.
#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    pub control: ControlChannel,
    pub server: ServerHandle,
    pub command: Command,
}

/// Executes command envelopes against a [`ServerCore`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    core: ServerCore,
}

impl Dispatcher {
    pub fn new(core: ServerCore) -> Self {
        Self { core }
    }

    /// Runs the command on the calling thread.
    ///
    /// Stop is terminal: it closes the envelope's control channel and nothing else runs on the
    /// stopped server afterwards.
    pub fn dispatch(&self, envelope: CommandEnvelope) -> Result<(), CommandError> {
        let CommandEnvelope { control, server, command } = envelope;
        debug!(server = ?server, opcode = command.opcode(), "dispatching command");

        let result = match command {
            Command::StartWorker { worker_index } => self.core.start_worker(server, worker_index),
            Command::StopServer => {
                control.close();
                self.core.stop_server(server)
            }
            Command::Write { connection, bytes } => self.core.write(connection, &bytes),
            Command::Close { connection } => self.core.close(connection),
            Command::Other(opcode) => {
                debug!(server = ?server, opcode, "ignoring unknown opcode");
                Ok(())
            }
        };

        if let Err(e) = &result {
            warn!(server = ?server, cause = %e, "command failed");
        }
        result
    }
}

/// The control channel returned by [`ServerCore::create_server`].
///
/// Every clone shares one open/closed state. Once a stop has been sent through it, further sends
/// fail with [`CommandError::ControlClosed`].
#[derive(Debug, Clone)]
pub struct ControlChannel {
    dispatcher: Dispatcher,
    server: ServerHandle,
    closed: Arc<AtomicBool>,
}

impl ControlChannel {
    pub(crate) fn new(core: ServerCore, server: ServerHandle) -> Self {
        Self { dispatcher: Dispatcher::new(core), server, closed: Arc::new(AtomicBool::new(false)) }
    }

    /// The server this channel was created for.
    pub fn server(&self) -> ServerHandle {
        self.server
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Dispatches `command` against this channel's server.
    pub fn send(&self, command: Command) -> Result<(), CommandError> {
        if self.is_closed() {
            return Err(CommandError::ControlClosed);
        }
        self.dispatcher.dispatch(CommandEnvelope { control: self.clone(), server: self.server, command })
    }

    /// Decodes and dispatches an opcode-form command.
    pub fn send_opcode(&self, opcode: i64, args: Vec<CommandArg>) -> Result<(), CommandError> {
        self.send(Command::from_opcode(opcode, args)?)
    }
}
