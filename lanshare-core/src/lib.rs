//! LANShare protocol reference implementation.
//! Host-driven: no sockets; the host passes datagrams and performs the returned actions.

pub mod bridge;
pub mod index;
pub mod integrity;
pub mod manifest;
pub mod peer;
pub mod protocol;
pub mod responder;
pub mod transfer;
pub mod wire;

pub use bridge::{BridgeCommand, BridgeError};
pub use index::{FileEntry, FileIndex, FileSource};
pub use peer::{AddressBook, PeerAddress, PeerAddressError};
pub use protocol::{Message, DEFAULT_DISCOVERY_PORT};
pub use responder::{Action, DropReason, Responder};
pub use transfer::TransferError;
pub use wire::{decode_datagram, encode_datagram, WireError};
