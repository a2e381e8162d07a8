use crate::broadcast::BroadcastScheduler;
use crate::chunk::ChunkedFile;
use crate::errors::{BeamError, Result};
use crate::storage::MissingManifest;

/// Check that a manifest was produced for exactly this file.
///
/// The frame count and the session id must both agree, otherwise the
/// indices in the manifest refer to someone else's frames.
pub fn reconcile(manifest: &MissingManifest, file: &ChunkedFile) -> Result<()> {
    if manifest.total != file.total() || manifest.session_id != file.session.id {
        return Err(BeamError::ManifestSessionMismatch {
            expected: file.session.id.to_string(),
            expected_total: file.total(),
            found: manifest.session_id.to_string(),
            found_total: manifest.total,
        });
    }
    if manifest.missing.is_empty() {
        return Err(BeamError::EmptyManifest);
    }
    Ok(())
}

/// Build a scheduler that re-sends exactly the frames the manifest lists.
pub fn remediation_scheduler(
    manifest: &MissingManifest,
    file: &ChunkedFile,
) -> Result<BroadcastScheduler> {
    reconcile(manifest, file)?;
    log::info!(
        "Remediating {} of {} frames of {}",
        manifest.missing.len(),
        file.total(),
        manifest.filename()
    );
    BroadcastScheduler::restricted(file, &manifest.missing)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::chunk::chunk;

    fn file(content: &[u8]) -> ChunkedFile {
        chunk(content, "doc.txt", 64).unwrap()
    }

    fn manifest_for(file: &ChunkedFile, missing: &[u16]) -> MissingManifest {
        MissingManifest {
            session_id: file.session.id.clone(),
            total: file.total(),
            missing: missing.iter().copied().collect(),
        }
    }

    #[test]
    fn schedules_exactly_the_manifest() {
        let file = file(&[3u8; 1_000]);
        assert!(file.total() > 10);
        let manifest = manifest_for(&file, &[2, 4, 9]);

        let scheduler = remediation_scheduler(&manifest, &file).unwrap();
        let scheduled: BTreeSet<u16> = scheduler.indices().collect();
        assert_eq!(scheduled, manifest.missing);
        assert_eq!(scheduler.per_cycle(), 3);
    }

    #[test]
    fn different_total_is_fatal() {
        let file = file(&[3u8; 1_000]);
        let mut manifest = manifest_for(&file, &[1]);
        manifest.total += 1;
        assert!(matches!(
            remediation_scheduler(&manifest, &file),
            Err(BeamError::ManifestSessionMismatch { .. })
        ));
    }

    #[test]
    fn different_content_with_same_total_is_fatal() {
        let sent = file(&[3u8; 1_000]);
        let other = file(&[4u8; 1_000]);
        assert_eq!(sent.total(), other.total());

        let manifest = manifest_for(&other, &[1]);
        assert!(matches!(
            reconcile(&manifest, &sent),
            Err(BeamError::ManifestSessionMismatch { .. })
        ));
    }

    #[test]
    fn empty_manifest_is_refused() {
        let file = file(b"tiny");
        let manifest = manifest_for(&file, &[]);
        assert!(matches!(
            reconcile(&manifest, &file),
            Err(BeamError::EmptyManifest)
        ));
    }
}
