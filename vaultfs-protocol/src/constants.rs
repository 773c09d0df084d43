//! Protocol constants

/// Frame magic, first four bytes of every frame
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Current protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum control payload size (4 MiB)
///
/// Bulk data never travels in the control payload; it rides the stream
/// region after the frame, which is not subject to this bound.
pub const MAX_DATA_LEN: usize = 4 * 1024 * 1024;

/// Maximum bearer token length in bytes
pub const MAX_TOKEN_LEN: usize = 256;

/// Fixed part of the frame header: magic(4) + version(1) + command(1) + tokenLen(4)
pub(crate) const FIXED_HEADER_LEN: usize = 10;
