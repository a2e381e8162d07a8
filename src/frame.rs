//! Binary layout of one frame, the unit embedded in a single symbol.
//!
//! ```text
//! version:u8 | sid_len:u8 | session_id | index:u16 | total:u16 |
//! payload_len:u16 | payload | crc32:u32
//! ```
//!
//! All integers are big-endian. The checksum covers the payload only.

use std::str;

use crc32fast::Hasher;
use thiserror::Error;

use crate::session::SessionId;

pub const FRAME_VERSION: u8 = 1;

/// Largest `total` the fixed-width field can express.
pub const MAX_FRAMES: usize = u16::MAX as usize;

/// Header bytes excluding the session id itself.
const FIXED_OVERHEAD: usize = 1 + 1 + 2 + 2 + 2 + 4;

/// Bytes a frame spends on everything but its payload.
pub fn header_overhead(session_id_len: usize) -> usize {
    FIXED_OVERHEAD + session_id_len
}

pub fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Why a decoded byte string was dropped.
///
/// Both variants are recoverable: the scan loop drops the symbol and keeps
/// going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Malformed frame: {0}")]
    Malformed(&'static str),
    #[error("Checksum mismatch for frame {index}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        index: u16,
        expected: u32,
        actual: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub session_id: SessionId,
    pub index: u16,
    pub total: u16,
    pub payload: Vec<u8>,
    pub checksum: u32,
}

impl Frame {
    pub fn new(session_id: SessionId, index: u16, total: u16, payload: Vec<u8>) -> Self {
        let checksum = checksum(&payload);
        Self {
            session_id,
            index,
            total,
            payload,
            checksum,
        }
    }

    /// Whether the carried checksum still matches the payload.
    pub fn verify(&self) -> bool {
        checksum(&self.payload) == self.checksum
    }

    pub fn encoded_len(&self) -> usize {
        header_overhead(self.session_id.encoded_len()) + self.payload.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let session_id = self.session_id.to_string();
        debug_assert!(session_id.len() <= u8::MAX as usize);
        debug_assert!(self.payload.len() <= u16::MAX as usize);

        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(FRAME_VERSION);
        out.push(session_id.len() as u8);
        out.extend_from_slice(session_id.as_bytes());
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.total.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut reader = Reader { bytes };

        let version = reader.u8("missing version")?;
        if version != FRAME_VERSION {
            return Err(FrameError::Malformed("unsupported version"));
        }

        let sid_len = reader.u8("missing session id length")? as usize;
        let sid = reader.take(sid_len, "truncated session id")?;
        let session_id = str::from_utf8(sid)
            .ok()
            .and_then(|s| s.parse::<SessionId>().ok())
            .ok_or(FrameError::Malformed("invalid session id"))?;

        let index = reader.u16("truncated index")?;
        let total = reader.u16("truncated total")?;
        if total == 0 || index >= total {
            return Err(FrameError::Malformed("index out of range"));
        }

        let payload_len = reader.u16("truncated payload length")? as usize;
        let payload = reader.take(payload_len, "truncated payload")?.to_vec();
        let expected = reader.u32("truncated checksum")?;
        if !reader.bytes.is_empty() {
            return Err(FrameError::Malformed("trailing bytes"));
        }

        let actual = checksum(&payload);
        if actual != expected {
            return Err(FrameError::ChecksumMismatch {
                index,
                expected,
                actual,
            });
        }

        Ok(Self {
            session_id,
            index,
            total,
            payload,
            checksum: expected,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], FrameError> {
        if self.bytes.len() < len {
            return Err(FrameError::Malformed(what));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, FrameError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, FrameError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, FrameError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
