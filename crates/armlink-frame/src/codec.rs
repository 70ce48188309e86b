use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::error::{FrameError, Result};
use crate::protocol::ProtocolId;

/// Sync byte; every frame starts with two of them.
pub const SYNC_BYTE: u8 = 0xAA;

/// Frame header: sync (2) + length (1) = 3 bytes.
pub const HEADER_SIZE: usize = 3;

/// Largest parameter block that keeps `LEN` below the sync byte.
pub const MAX_PARAMS_LEN: usize = (SYNC_BYTE as usize - 1) - 2;

/// Bytes counted by `LEN` besides the parameters (id + ctrl).
const LEN_OVERHEAD: usize = 2;

/// Bytes a bad checksum costs before scanning resumes.
const CHECKSUM_SKIP: usize = 3;

const CTRL_RW: u8 = 0x01;
const CTRL_QUEUED: u8 = 0x02;

/// A request to, or reply from, the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Command identifier.
    pub id: ProtocolId,
    /// `false` reads from the device, `true` writes to it.
    pub rw: bool,
    /// Enqueue in the device's command FIFO; the reply carries the queue index.
    pub is_queued: bool,
    /// Little-endian parameter block.
    pub params: Bytes,
}

impl Message {
    /// Create a new message.
    pub fn new(id: ProtocolId, rw: bool, is_queued: bool, params: impl Into<Bytes>) -> Self {
        Self {
            id,
            rw,
            is_queued,
            params: params.into(),
        }
    }

    /// A non-queued read with no parameters.
    pub fn read(id: ProtocolId) -> Self {
        Self::new(id, false, false, Bytes::new())
    }

    /// A non-queued write.
    pub fn write(id: ProtocolId, params: impl Into<Bytes>) -> Self {
        Self::new(id, true, false, params)
    }

    /// Mark this message for the device's command queue.
    pub fn queued(mut self, is_queued: bool) -> Self {
        self.is_queued = is_queued;
        self
    }

    /// The control byte (bit 0 = rw, bit 1 = queued).
    pub fn ctrl(&self) -> u8 {
        let mut ctrl = 0;
        if self.rw {
            ctrl |= CTRL_RW;
        }
        if self.is_queued {
            ctrl |= CTRL_QUEUED;
        }
        ctrl
    }

    /// Number of valid payload bytes.
    pub fn ack_len(&self) -> usize {
        self.params.len()
    }

    /// The total wire size of this message (header + id + ctrl + params + checksum).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + LEN_OVERHEAD + self.params.len() + 1
    }

    /// Little-endian `u32` at the start of the payload.
    pub fn u32_le(&self) -> Option<u32> {
        let bytes = self.params.get(..4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Little-endian `u64` at the start of the payload (the queue index of a
    /// queued reply).
    pub fn u64_le(&self) -> Option<u64> {
        let mut bytes = self.params.get(..8)?;
        Some(bytes.get_u64_le())
    }
}

/// Checksum byte that makes `id + ctrl + Σparams + cksum` vanish mod 256.
pub fn checksum(id: u8, ctrl: u8, params: &[u8]) -> u8 {
    let sum = params
        .iter()
        .fold(id.wrapping_add(ctrl), |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬──────┬──────────┬────┬──────┬───────────────┬───────┐
/// │ 0xAA │ 0xAA │ LEN      │ ID │ CTRL │ PARAMS        │ CKSUM │
/// │      │      │ params+2 │    │      │ (LEN-2 bytes) │       │
/// └──────┴──────┴──────────┴────┴──────┴───────────────┴───────┘
/// ```
pub fn encode_message(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    if msg.params.len() > MAX_PARAMS_LEN {
        return Err(FrameError::Oversize {
            size: msg.params.len(),
            max: MAX_PARAMS_LEN,
        });
    }

    let id = msg.id.as_u8();
    let ctrl = msg.ctrl();
    dst.reserve(msg.wire_size());
    dst.put_u8(SYNC_BYTE);
    dst.put_u8(SYNC_BYTE);
    dst.put_u8((msg.params.len() + LEN_OVERHEAD) as u8);
    dst.put_u8(id);
    dst.put_u8(ctrl);
    dst.put_slice(&msg.params);
    dst.put_u8(checksum(id, ctrl, &msg.params));
    Ok(())
}

/// Decode the next message from a buffer.
///
/// Returns `None` if the buffer doesn't hold a complete valid frame yet.
/// Garbage, frames with a bad length or checksum, and frames with an id
/// outside the protocol table are consumed and skipped; a partial frame is
/// left in place for the next call.
pub fn decode_message(src: &mut BytesMut) -> Option<Message> {
    loop {
        let Some(start) = find_sync(src) else {
            // Keep a trailing sync byte: it may pair with the next read.
            let keep = usize::from(src.last() == Some(&SYNC_BYTE));
            let skipped = src.len() - keep;
            if skipped > 0 {
                trace!(skipped, "discarding bytes without sync");
                src.advance(skipped);
            }
            return None;
        };
        if start > 0 {
            trace!(skipped = start, "discarding bytes before sync");
            src.advance(start);
        }

        if src.len() < HEADER_SIZE {
            return None;
        }

        let len = src[2];
        if len >= SYNC_BYTE || usize::from(len) < LEN_OVERHEAD {
            trace!(len, "invalid frame length, resyncing");
            src.advance(1);
            continue;
        }

        let total = HEADER_SIZE + usize::from(len) + 1;
        if src.len() < total {
            return None;
        }

        let sum = src[HEADER_SIZE..total]
            .iter()
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        if sum != 0 {
            debug!(
                id = src[HEADER_SIZE],
                "frame checksum mismatch, resyncing"
            );
            src.advance(CHECKSUM_SKIP);
            continue;
        }

        let frame = src.split_to(total).freeze();
        let raw_id = frame[HEADER_SIZE];
        let ctrl = frame[HEADER_SIZE + 1];
        let id = match ProtocolId::try_from(raw_id) {
            Ok(id) => id,
            Err(raw) => {
                debug!(id = raw, "dropping frame with unknown protocol id");
                continue;
            }
        };

        return Some(Message {
            id,
            rw: ctrl & CTRL_RW != 0,
            is_queued: ctrl & CTRL_QUEUED != 0,
            params: frame.slice(HEADER_SIZE + LEN_OVERHEAD..total - 1),
        });
    }
}

fn find_sync(src: &[u8]) -> Option<usize> {
    src.windows(2)
        .position(|pair| pair[0] == SYNC_BYTE && pair[1] == SYNC_BYTE)
}
