//! # Waypack
//!
//! The wire codec of the compositor protocol: framing, argument encoding and
//! the out-of-band descriptor queue.
//!
//! ## Philosophy
//!
//! - **Schema driven**: The wire carries no type tags. Every body is decoded
//!   against the `Signature` the caller resolves for `(object, opcode)`.
//! - **All or nothing**: A decode either yields a whole message or consumes
//!   nothing. Partial frames never leave state behind.
//! - **Bounded**: Decoders are bounds-checked views over the caller's buffer.
//!   Lengths read from the wire are checked before anything is sliced.
//!
//! ## Format
//!
//! - **Header**: `[Object: 4b][Size: 2b | Opcode: 2b]`, the second word being
//!   `(size << 16) | opcode`. `size` counts the header and is a multiple of 4.
//! - **Scalars**: `int`, `uint`, `fixed`, `object`, `new_id` are one word.
//! - **Blobs**: `[Len: 4b][Data: Len][Pad: 0-3b]`. Strings count their NUL.
//! - **Descriptors**: carry no bytes. They ride a separate FIFO.
//!
//! All integers are Little-Endian.

mod decoder;
mod encoder;
mod error;
mod fd;
mod fixed;
mod types;


pub use decoder::decode_message;
pub use decoder::peek_header;
pub use decoder::Decoded;
pub use decoder::Resolve;
pub use encoder::encode_message;
pub use encoder::Encoder;
pub use error::Error;
pub use error::Result;
pub use fd::FdQueue;
pub use fixed::Fixed;
pub use types::Arg;
pub use types::ArgKind;
pub use types::ArgSpec;
pub use types::Header;
pub use types::Message;
pub use types::ObjectId;
pub use types::Side;
pub use types::Signature;
pub use types::HEADER_SIZE;
pub use types::MAX_MESSAGE_SIZE;

/// Rounds a blob length up to the next word boundary.
///
/// Returns `None` when the padded length does not fit in `usize`.
pub fn padded_len(len: usize) -> Option<usize> {
    len.checked_add(3).map(|n| n & !3)
}
