//! Core protocol types shared by the codec, the connection loop and the consumer.
//!
//! # Components
//!
//! - **Events** ([`RequestEvent`], [`EventEnvelope`]): the units posted to an output channel,
//!   one per recognized piece of a request
//! - **Handles** ([`ServerHandle`], [`ConnectionId`]): generation-checked references that can
//!   cross the boundary to the consumer as integers
//! - **Message Handling**: [`Message`], [`PayloadItem`] and [`PayloadSize`] used between the
//!   head decoder and the payload decoders
//! - **Request Head** ([`RequestHead`]): the raw request line and header block
//! - **Method Codes** ([`method_code`]): stable numeric codes for request methods
//! - **Error Handling** ([`error`]): one error type per failure domain
//!   - [`ServerError`]: listener creation failures
//!   - [`AddressError`]: address formatting failures
//!   - [`ParseError`]: malformed requests
//!   - [`ConnectionError`]: per-connection read/write/parse failures
//!   - [`CommandError`]: control-plane failures

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::HeaderField;
pub use request::RequestHead;

mod event;
pub use event::EventEnvelope;
pub use event::EventReceiver;
pub use event::MessageComplete;
pub use event::OutputChannel;
pub use event::RequestEvent;
pub use event::event_code;
pub use event::output_channel;

mod handle;
pub use handle::ConnectionId;
pub use handle::ServerHandle;

mod method;
pub use method::method_code;
pub use method::method_from_code;

mod error;
pub use error::AddressError;
pub use error::CommandError;
pub use error::ConnectionError;
pub use error::ParseError;
pub use error::ServerError;
