use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{BeamError, Result};

mod atomic;
pub mod draft;
pub mod manifest;

pub use atomic::{remove_if_exists, write_replace};
pub use draft::{Draft, DRAFT_VERSION};
pub use manifest::{MissingManifest, MissingRanges, MANIFEST_VERSION};

pub const DRAFT_PREFIX: &str = "DRAFT_";
pub const DRAFT_EXTENSION: &str = "json";
pub const RESTORED_PREFIX: &str = "RESTORED_";
pub const MANIFEST_FILE: &str = "missing_parts.json";

/// Receiver-side files for every session, rooted at one work directory:
///
/// - `DRAFT_<filename>.json`: accepted frames of an unfinished session
/// - `missing_parts.json`: indices still missing for the last interruption
/// - `RESTORED_<filename>`: the reassembled file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeamStorage {
    root: PathBuf,
}

impl BeamStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn draft_path(&self, filename: &str) -> PathBuf {
        self.root
            .join(format!("{}{}.{}", DRAFT_PREFIX, filename, DRAFT_EXTENSION))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.root
            .join(format!("{}{}", RESTORED_PREFIX, filename))
    }

    /// Persist a draft, replacing any earlier one for the same file name.
    pub fn save_draft(&self, draft: &Draft) -> Result<PathBuf> {
        let path = self.draft_path(draft.filename());
        write_replace(&path, &draft.to_json()?)?;
        log::info!(
            "Draft of {} saved with {}/{} frames",
            draft.filename(),
            draft.stored(),
            draft.total()
        );
        Ok(path)
    }

    /// Load the draft kept for `filename`, if there is one.
    pub fn load_draft(&self, filename: &str) -> Result<Option<Draft>> {
        let path = self.draft_path(filename);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BeamError::file_io(&path, e)),
        };
        let draft = Draft::from_json(&path.display().to_string(), &bytes)?;
        log::debug!(
            "Loaded draft {} with {}/{} frames",
            path.display(),
            draft.stored(),
            draft.total()
        );
        Ok(Some(draft))
    }

    pub fn erase_draft(&self, filename: &str) -> Result<bool> {
        remove_if_exists(self.draft_path(filename))
    }

    pub fn save_manifest(&self, manifest: &MissingManifest) -> Result<PathBuf> {
        let path = self.manifest_path();
        write_replace(&path, &manifest.to_json()?)?;
        log::info!(
            "Manifest for {} saved with {} missing frames",
            manifest.filename(),
            manifest.missing.len()
        );
        Ok(path)
    }

    pub fn erase_manifest(&self) -> Result<bool> {
        remove_if_exists(self.manifest_path())
    }

    pub fn write_output(&self, filename: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.output_path(filename);
        write_replace(&path, content)?;
        Ok(path)
    }
}

/// Read a manifest from wherever the operator carried it.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<MissingManifest> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| BeamError::file_io(path, e))?;
    MissingManifest::from_json(&path.display().to_string(), &bytes)
}
