//! Listens on 127.0.0.1:8080, logs every request event and answers each request with an empty
//! 200 response.

use bytes::Bytes;
use micro_hypertext::address::format_address;
use micro_hypertext::config::ServerOptions;
use micro_hypertext::dispatcher::Command;
use micro_hypertext::protocol::{RequestEvent, output_channel};
use micro_hypertext::server::ServerCore;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const WORKERS: usize = 4;

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let core = ServerCore::default();
    let (events, mut receiver) = output_channel();

    let binding = match core.create_server(&ServerOptions::new("127.0.0.1", 8080), events) {
        Ok(binding) => binding,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    for worker_index in 0..WORKERS {
        if let Err(e) = binding.control.send(Command::StartWorker { worker_index }) {
            error!(cause = %e, "failed to start worker");
            return;
        }
    }
    info!(port = 8080, workers = WORKERS, "start listening");

    while let Some(envelope) = receiver.blocking_recv() {
        let connection = envelope.connection;
        match envelope.event {
            RequestEvent::MessageComplete(complete) => {
                let peer = format_address(&complete.peer_address, false).unwrap_or_default();
                info!(?connection, method = %complete.method, major = complete.http_major, minor = complete.http_minor, %peer, "request complete");

                let response = Bytes::from_static(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
                if let Err(e) = binding.control.send(Command::Write { connection, bytes: response }) {
                    warn!(?connection, cause = %e, "failed to respond");
                    continue;
                }
                if !complete.keep_alive
                    && let Err(e) = binding.control.send(Command::Close { connection })
                {
                    warn!(?connection, cause = %e, "failed to close");
                }
            }
            event => match event.payload() {
                Some(bytes) => info!(?connection, code = event.code(), payload = %String::from_utf8_lossy(bytes), "event"),
                None => info!(?connection, code = event.code(), "event"),
            },
        }
    }
}
