use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BeamError>;

#[derive(Error, Debug)]
pub enum BeamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to access {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid file name: {0}")]
    InvalidFilename(String),
    #[error(
        "Symbol capacity of {capacity} bytes leaves no room for payload \
         (frame header needs {overhead} bytes)"
    )]
    CapacityTooSmall { capacity: usize, overhead: usize },
    #[error("File needs {needed} frames but a session can address at most {max}")]
    TooManyFrames { needed: usize, max: usize },
    #[error(
        "Manifest belongs to session {found} ({found_total} frames), but the \
         file being sent is session {expected} ({expected_total} frames)"
    )]
    ManifestSessionMismatch {
        expected: String,
        expected_total: u16,
        found: String,
        found_total: u16,
    },
    #[error("Manifest lists no missing frames, nothing to remediate")]
    EmptyManifest,
    #[error("Symbol codec error: {0}")]
    Symbol(String),
    #[error("Parsing error")]
    Parse,
    #[error("Storage error: {0} {1}")]
    Storage(String, String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BeamError {
    /// Attach the failing path to an I/O error.
    pub fn file_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for BeamError {
    fn from(_: serde_json::Error) -> Self {
        Self::Parse
    }
}
