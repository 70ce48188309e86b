//! Frame codec for the armlink robot-arm protocol.
//!
//! Every message travels in one frame:
//! - Two sync bytes (`0xAA 0xAA`) for stream synchronization
//! - A length byte covering id, control and parameters
//! - The protocol id and a control byte (read/write, queued)
//! - Little-endian parameters and a two's-complement checksum
//!
//! Corrupt input is skipped and the decoder resynchronizes on the next sync
//! pair; callers only ever see complete, checksum-verified messages.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod reader;
pub mod writer;

pub use codec::{
    checksum, decode_message, encode_message, Message, HEADER_SIZE, MAX_PARAMS_LEN, SYNC_BYTE,
};
pub use error::{FrameError, Result};
pub use protocol::ProtocolId;
pub use reader::FrameReader;
pub use writer::FrameWriter;
