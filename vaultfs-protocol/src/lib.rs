//! Wire protocol for VaultFS.
//!
//! Every service (registry, name, data) speaks the same framed
//! request/response protocol. A frame carries a command byte, an optional
//! bearer token and a small control payload; frames that announce a stream
//! region are followed by exactly `stream_len` raw bytes on the same
//! connection, which the codec hands through as opaque chunks.

pub mod codec;
pub mod command;
pub mod constants;
pub mod frame;
pub mod validation;

pub use codec::{StoreCodec, WireEvent};
pub use command::Command;
pub use constants::{MAGIC, MAX_DATA_LEN, MAX_TOKEN_LEN, PROTOCOL_VERSION};
pub use frame::Packet;
pub use validation::validate_hash;
