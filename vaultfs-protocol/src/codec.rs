//! Codec for encoding and decoding store frames
//!
//! Wire format, integers big-endian:
//!
//! ```text
//! ┌──────────┬────────────┬────────────┬─────────────┬───────┬───────────┬──────┬──────────────┐
//! │ Magic u32│ Version u8 │ Command u8 │ TokenLen u32│ Token │ DataLen u32│ Data │ StreamLen u64│
//! └──────────┴────────────┴────────────┴─────────────┴───────┴───────────┴──────┴──────────────┘
//! ```
//!
//! A frame with `StreamLen > 0` is followed by exactly that many raw bytes
//! on the same connection. The decoder is a per-connection state machine:
//! in `Frame` state it accumulates a whole header+token+data tuple before
//! consuming anything; in `Stream` state it hands bytes through as opaque
//! chunks without buffering the full stream, then returns to `Frame` once
//! the residual counter reaches zero.

use crate::command::Command;
use crate::constants::{FIXED_HEADER_LEN, MAGIC, MAX_DATA_LEN, MAX_TOKEN_LEN, PROTOCOL_VERSION};
use crate::frame::Packet;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Item produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// A complete control frame.
    Packet(Packet),
    /// A piece of the stream region following the last frame. `end` is set
    /// on the chunk that exhausts the announced `stream_len`.
    Chunk { data: Bytes, end: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Frame,
    Stream { remaining: u64 },
}

/// Store protocol codec.
///
/// One instance per connection; the stream-region state is connection
/// state and must not be shared.
#[derive(Debug, Clone, Copy)]
pub struct StoreCodec {
    state: DecodeState,
    max_data_len: usize,
}

impl Default for StoreCodec {
    fn default() -> Self {
        Self {
            state: DecodeState::Frame,
            max_data_len: MAX_DATA_LEN,
        }
    }
}

impl StoreCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the control-payload bound, mainly for tests.
    #[must_use]
    pub fn with_max_data_len(max_data_len: usize) -> Self {
        Self {
            state: DecodeState::Frame,
            max_data_len,
        }
    }

    /// True while the decoder expects stream bytes rather than a frame.
    #[must_use]
    pub fn in_stream(&self) -> bool {
        matches!(self.state, DecodeState::Stream { .. })
    }
}

impl Decoder for StoreCodec {
    type Item = WireEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let DecodeState::Stream { remaining } = self.state {
            if src.is_empty() {
                return Ok(None);
            }
            let take = usize::try_from(remaining)
                .map_or(src.len(), |r| src.len().min(r));
            let data = src.split_to(take).freeze();
            let left = remaining - take as u64;
            if left == 0 {
                self.state = DecodeState::Frame;
            } else {
                self.state = DecodeState::Stream { remaining: left };
            }
            return Ok(Some(WireEvent::Chunk {
                data,
                end: left == 0,
            }));
        }

        // Frame state: validate the magic as soon as it is visible, before
        // waiting for the rest of the header. A peer speaking the wrong
        // protocol gets disconnected immediately, no resync attempt.
        if src.len() < 4 {
            src.reserve(4 - src.len());
            return Ok(None);
        }
        let magic = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad magic: {magic:#010x}"),
            ));
        }

        if src.len() < FIXED_HEADER_LEN {
            src.reserve(FIXED_HEADER_LEN - src.len());
            return Ok(None);
        }

        let version = src[4];
        if version != PROTOCOL_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported protocol version: {version}"),
            ));
        }

        let token_len = u32::from_be_bytes([src[6], src[7], src[8], src[9]]) as usize;
        if token_len > MAX_TOKEN_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("token too long: {token_len} bytes (max: {MAX_TOKEN_LEN})"),
            ));
        }

        // Need the data length field before the frame size is known.
        let data_len_at = FIXED_HEADER_LEN + token_len;
        if src.len() < data_len_at + 4 {
            src.reserve(data_len_at + 4 - src.len());
            return Ok(None);
        }
        let data_len = u32::from_be_bytes([
            src[data_len_at],
            src[data_len_at + 1],
            src[data_len_at + 2],
            src[data_len_at + 3],
        ]) as usize;
        if data_len > self.max_data_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "frame too large: {} bytes (max: {})",
                    data_len, self.max_data_len
                ),
            ));
        }

        let total = data_len_at + 4 + data_len + 8;
        if src.len() < total {
            // Not enough data yet; nothing consumed.
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total).freeze();
        frame.advance(5); // magic + version
        let command = Command::from_code(frame.get_u8());
        frame.advance(4); // token length, already read
        let token = if token_len == 0 {
            None
        } else {
            let raw = frame.split_to(token_len);
            let token = std::str::from_utf8(&raw)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "token is not utf-8"))?;
            Some(token.to_owned())
        };
        frame.advance(4); // data length, already read
        let data = frame.split_to(data_len);
        let stream_len = frame.get_u64();

        if stream_len > 0 {
            self.state = DecodeState::Stream {
                remaining: stream_len,
            };
        }

        Ok(Some(WireEvent::Packet(Packet {
            command,
            token,
            data,
            stream_len,
        })))
    }
}

impl Encoder<Packet> for StoreCodec {
    type Error = io::Error;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let token = match &packet.token {
            Some(t) if t.is_empty() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "empty token is not representable; use no token instead",
                ));
            }
            Some(t) if t.len() > MAX_TOKEN_LEN => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("token too long: {} bytes (max: {MAX_TOKEN_LEN})", t.len()),
                ));
            }
            Some(t) => t.as_bytes(),
            None => &[],
        };
        if packet.data.len() > self.max_data_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "frame too large: {} bytes (max: {})",
                    packet.data.len(),
                    self.max_data_len
                ),
            ));
        }

        dst.reserve(FIXED_HEADER_LEN + token.len() + 4 + packet.data.len() + 8);
        dst.put_u32(MAGIC);
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u8(packet.command.code());
        dst.put_u32(token.len() as u32);
        dst.put_slice(token);
        dst.put_u32(packet.data.len() as u32);
        dst.put_slice(&packet.data);
        // Emitted even when zero; the peer's decoder always reads it.
        dst.put_u64(packet.stream_len);
        Ok(())
    }
}
