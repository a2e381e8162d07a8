use core::{fmt::Display, str::FromStr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{BeamError, Result};

/// Number of fingerprint bytes carried in a session id.
const FINGERPRINT_LEN: usize = 8;

/// Longest session id the one-byte length prefix of a frame can carry.
pub const MAX_SESSION_ID_LEN: usize = u8::MAX as usize;

/// Longest file name that still fits a session id.
pub const MAX_FILENAME_LEN: usize = MAX_SESSION_ID_LEN - FINGERPRINT_LEN * 2 - 1;

/// Identifies one logical transfer.
///
/// Rendered as `<16 hex>:<filename>`. The hex part is a BLAKE3 fingerprint
/// over the file name, the frame count and the file content, so two
/// different files sharing a name and a frame count are still distinct
/// sessions. The file name is carried along because the receiver knows
/// nothing about the transfer before the first frame arrives.
#[derive(
    Debug, Clone, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId {
    fingerprint: [u8; FINGERPRINT_LEN],
    filename: String,
}

impl SessionId {
    pub fn derive(filename: &str, total: u16, content: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(filename.as_bytes());
        hasher.update(&[0]);
        hasher.update(&total.to_be_bytes());
        hasher.update(content);

        let mut fingerprint = [0u8; FINGERPRINT_LEN];
        fingerprint.copy_from_slice(&hasher.finalize().as_bytes()[..FINGERPRINT_LEN]);

        Self {
            fingerprint,
            filename: filename.to_owned(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn fingerprint(&self) -> String {
        hex::encode(self.fingerprint)
    }

    /// Length of the textual form, which is what goes on the wire.
    pub fn encoded_len(&self) -> usize {
        Self::encoded_len_for(&self.filename)
    }

    pub fn encoded_len_for(filename: &str) -> usize {
        FINGERPRINT_LEN * 2 + 1 + filename.len()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.fingerprint(), self.filename)
    }
}

impl FromStr for SessionId {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self> {
        let (fingerprint, filename) = s.split_once(':').ok_or(BeamError::Parse)?;
        if fingerprint.len() != FINGERPRINT_LEN * 2 {
            return Err(BeamError::Parse);
        }

        let mut bytes = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(fingerprint, &mut bytes).map_err(|_| BeamError::Parse)?;
        validate_filename(filename)?;

        Ok(Self {
            fingerprint: bytes,
            filename: filename.to_owned(),
        })
    }
}

impl TryFrom<String> for SessionId {
    type Error = BeamError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.to_string()
    }
}

/// One logical transfer: its identity, the file name and the frame count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub total: u16,
}

impl Session {
    pub fn new(id: SessionId, total: u16) -> Self {
        Self { id, total }
    }

    pub fn filename(&self) -> &str {
        self.id.filename()
    }
}

/// Reduce a path to a file name that is safe to embed in a session id and
/// later to use as a file name on the receiving side.
pub fn transferable_filename(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BeamError::InvalidFilename(path.display().to_string()))?;

    let mut end = name.len().min(MAX_FILENAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let name = &name[..end];

    validate_filename(name)?;
    Ok(name.to_owned())
}

/// Reject names that would not survive the trip inside a session id or
/// that could escape the receiver's work directory.
pub fn validate_filename(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.len() > MAX_FILENAME_LEN
        || name.contains(['/', '\\', '\0']);

    if invalid {
        return Err(BeamError::InvalidFilename(name.to_owned()));
    }
    Ok(())
}
