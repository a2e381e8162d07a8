use std::fs;
use std::path::Path;

use crate::errors::{BeamError, Result};
use crate::frame::{header_overhead, Frame, MAX_FRAMES};
use crate::session::{transferable_filename, validate_filename, Session, SessionId};

/// A file cut into frames, ready to broadcast.
#[derive(Debug, Clone)]
pub struct ChunkedFile {
    pub session: Session,
    pub frames: Vec<Frame>,
}

impl ChunkedFile {
    pub fn total(&self) -> u16 {
        self.session.total
    }

    pub fn frame(&self, index: u16) -> Option<&Frame> {
        self.frames.get(index as usize)
    }
}

/// Payload bytes one frame can carry for the given file name.
pub fn payload_capacity(filename: &str, capacity: usize) -> Result<usize> {
    let overhead = header_overhead(SessionId::encoded_len_for(filename));
    match capacity.checked_sub(overhead) {
        Some(room) if room > 0 => Ok(room.min(u16::MAX as usize)),
        _ => Err(BeamError::CapacityTooSmall { capacity, overhead }),
    }
}

/// Split `content` into frames that each encode to at most `capacity` bytes.
///
/// Frames come out in ascending index order and only the last one may be
/// short. An empty file still yields one empty frame so the receiver has
/// something to observe.
pub fn chunk(content: &[u8], filename: &str, capacity: usize) -> Result<ChunkedFile> {
    validate_filename(filename)?;
    let per_frame = payload_capacity(filename, capacity)?;
    let needed = content.len().div_ceil(per_frame).max(1);
    if needed > MAX_FRAMES {
        return Err(BeamError::TooManyFrames {
            needed,
            max: MAX_FRAMES,
        });
    }
    let total = needed as u16;
    let session_id = SessionId::derive(filename, total, content);

    let frames: Vec<Frame> = if content.is_empty() {
        vec![Frame::new(session_id.clone(), 0, total, Vec::new())]
    } else {
        content
            .chunks(per_frame)
            .enumerate()
            .map(|(index, payload)| {
                Frame::new(session_id.clone(), index as u16, total, payload.to_vec())
            })
            .collect()
    };

    log::debug!(
        "Chunked {} bytes of {} into {} frames of up to {} bytes",
        content.len(),
        filename,
        total,
        per_frame
    );

    Ok(ChunkedFile {
        session: Session::new(session_id, total),
        frames,
    })
}

/// Read a file from disk and chunk it under its transferable name.
pub fn chunk_file(path: impl AsRef<Path>, capacity: usize) -> Result<ChunkedFile> {
    let path = path.as_ref();
    let filename = transferable_filename(path)?;
    let content = fs::read(path).map_err(|e| BeamError::file_io(path, e))?;
    chunk(&content, &filename, capacity)
}
