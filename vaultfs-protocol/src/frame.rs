//! Frame definitions

use crate::command::Command;
use bytes::Bytes;

/// A decoded control frame.
///
/// `stream_len > 0` announces that exactly that many raw payload bytes
/// follow the frame on the same connection. The codec delivers those bytes
/// separately as [`crate::codec::WireEvent::Chunk`]s; they are never part of
/// `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: Command,
    /// Bearer token; `None` encodes as `tokenLen == 0`. An empty token
    /// string is not representable on the wire and is rejected by the
    /// encoder.
    pub token: Option<String>,
    pub data: Bytes,
    pub stream_len: u64,
}

impl Packet {
    /// A frame with no stream region.
    #[must_use]
    pub fn new(command: Command, token: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            command,
            token,
            data: data.into(),
            stream_len: 0,
        }
    }

    /// A frame announcing `stream_len` raw bytes to follow.
    #[must_use]
    pub fn with_stream(
        command: Command,
        token: Option<String>,
        data: impl Into<Bytes>,
        stream_len: u64,
    ) -> Self {
        Self {
            command,
            token,
            data: data.into(),
            stream_len,
        }
    }

    /// An error reply carrying a utf-8 reason.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(Command::Error, None, reason.into().into_bytes())
    }

    /// Control payload as utf-8, lossy.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
