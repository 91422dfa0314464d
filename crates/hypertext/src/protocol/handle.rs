//! Generation-checked handles for servers and connections.
//!
//! Handles cross the boundary to the consumer as plain integers. Because each handle carries the
//! generation of the slot it points at, a handle kept around after its server or connection is
//! gone can never reach whatever reuses that slot later.

use std::fmt;

use thunderdome::Index;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) Index);

        impl $name {
            /// Packs the handle into an integer suitable for an envelope.
            pub fn to_bits(self) -> u64 {
                self.0.to_bits()
            }

            /// Unpacks a handle previously produced by [`to_bits`](Self::to_bits).
            pub fn from_bits(bits: u64) -> Option<Self> {
                Index::from_bits(bits).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({}v{})"), self.0.slot(), self.0.generation())
            }
        }
    };
}

define_handle!(
    /// Opaque reference to a bound listener, shared by every participant of a shared listener.
    ServerHandle,
    "Server"
);

define_handle!(
    /// Identifies one accepted connection; stands in for the socket descriptor in every event.
    ConnectionId,
    "Connection"
);
