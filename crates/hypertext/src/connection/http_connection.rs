use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::RequestDecoder;
use crate::connection::EventEmitter;
use crate::protocol::ConnectionError;

/// The read side of one accepted connection.
///
/// `HttpConnection` owns the parser session of a connection: it reads from the socket, drains
/// every event the [`RequestDecoder`] recognizes and posts each through its [`EventEmitter`].
/// Body and upgrade bytes leave as slices of the read buffer, never as copies.
///
/// The loop runs on the worker thread that accepted the connection, which accepts nothing else
/// until [`process`](Self::process) returns.
#[derive(Debug)]
pub struct HttpConnection {
    stream: TcpStream,
    decoder: RequestDecoder,
    emitter: EventEmitter,
    buffer: BytesMut,
    read_size: usize,
}

impl HttpConnection {
    pub fn new(stream: TcpStream, decoder: RequestDecoder, emitter: EventEmitter, read_size: usize) -> Self {
        Self { stream, decoder, emitter, buffer: BytesMut::with_capacity(read_size), read_size }
    }

    /// Reads and parses until the peer stops sending.
    ///
    /// # Returns
    ///
    /// - `Ok(())` when the peer closed its sending side; the socket itself stays open
    /// - `Err(ConnectionError)` on a read failure or a malformed request; nothing is posted for
    ///   the failure itself, the caller closes the connection
    pub fn process(mut self) -> Result<(), ConnectionError> {
        loop {
            let filled = self.buffer.len();
            self.buffer.resize(filled + self.read_size, 0);

            let read = match self.stream.read(&mut self.buffer[filled..]) {
                Ok(read) => read,
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    self.buffer.truncate(filled);
                    continue;
                }
                Err(e) => return Err(ConnectionError::read(e)),
            };
            self.buffer.truncate(filled + read);

            if read == 0 {
                trace!(connection = ?self.emitter.connection(), upgraded = self.decoder.is_upgraded(), "end of stream");
                return Ok(());
            }

            trace!(connection = ?self.emitter.connection(), read, "read bytes");
            while let Some(event) = self.decoder.decode(&mut self.buffer)? {
                self.emitter.emit(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ConnectionId, RequestEvent, event_code, output_channel};
    use bytes::Bytes;
    use std::io::Write;
    use std::net::{Shutdown, TcpListener};
    use thunderdome::Arena;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn posts_events_until_end_of_stream() {
        let mut arena = Arena::new();
        let connection = ConnectionId(arena.insert(()));
        let (channel, mut receiver) = output_channel();
        let (mut client, server) = pair();

        client.write_all(b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc").unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        // a tiny read size splits the request over many reads
        let http_connection = HttpConnection::new(server, RequestDecoder::default(), EventEmitter::new(connection, channel), 4);
        http_connection.process().unwrap();

        let mut codes = Vec::new();
        let mut body = Vec::new();
        while let Ok(envelope) = receiver.try_recv() {
            assert_eq!(envelope.connection, connection);
            if let RequestEvent::Body(bytes) = &envelope.event {
                body.extend_from_slice(bytes);
            }
            codes.push(envelope.code());
        }

        codes.dedup();
        assert_eq!(
            codes,
            vec![
                event_code::MESSAGE_BEGIN,
                event_code::URL,
                event_code::HEADER_FIELD,
                event_code::HEADER_VALUE,
                event_code::BODY,
                event_code::MESSAGE_COMPLETE
            ]
        );
        assert_eq!(Bytes::from(body), Bytes::from_static(b"abc"));
    }

    #[test]
    fn malformed_request_fails_the_connection() {
        let mut arena = Arena::new();
        let (channel, mut receiver) = output_channel();
        let (mut client, server) = pair();

        client.write_all(b"GET / HTTP/1.1\r\nbroken header\r\n\r\n").unwrap();

        let emitter = EventEmitter::new(ConnectionId(arena.insert(())), channel);
        let result = HttpConnection::new(server, RequestDecoder::default(), emitter, 1024).process();
        assert!(matches!(result, Err(ConnectionError::Request { .. })));

        // only the begin event made it out
        assert_eq!(receiver.try_recv().unwrap().event, RequestEvent::MessageBegin);
        assert!(receiver.try_recv().is_err());
    }
}
