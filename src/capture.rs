//! Receiver-side state machine.
//!
//! ```text
//! AwaitingFirst --first valid frame--> Capturing --all indices--> Complete
//!                                          |
//!                                          +--timeout / cancel--> Interrupted
//! ```
//!
//! Frames are accepted in the order they are decoded; reassembly always
//! orders by index. `Interrupted` ends the run, not the session: the draft
//! and manifest it leaves behind let a later run pick up where this one
//! stopped.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{BeamError, Result};
use crate::frame::{Frame, FrameError};
use crate::session::{Session, SessionId};
use crate::storage::{load_manifest, BeamStorage, Draft, MissingManifest};

pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// No new index was accepted within the timeout window.
    Timeout,
    /// The operator stopped the receiver.
    Cancelled,
}

/// What an interrupted run left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interruption {
    pub reason: InterruptReason,
    /// `None` when not a single frame had been accepted.
    pub session: Option<Session>,
    pub stored: usize,
    pub missing: BTreeSet<u16>,
    pub draft_path: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Complete {
        session: Session,
        output: PathBuf,
        bytes: usize,
    },
    Interrupted(Interruption),
}

#[derive(Debug)]
pub enum CaptureState {
    AwaitingFirst,
    Capturing(Draft),
    Finished(CaptureOutcome),
}

/// How one decoded frame was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// A new index was stored.
    Accepted { index: u16, stored: usize, total: u16 },
    /// The index was already stored, nothing changed.
    Duplicate { index: u16 },
    /// The frame belongs to another broadcast.
    ForeignSession,
    /// The payload no longer matches its checksum.
    Corrupted { index: u16 },
    /// The run is already over.
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub accepted: usize,
    pub duplicates: usize,
    pub foreign: usize,
    pub malformed: usize,
    pub corrupted: usize,
}

/// Observer of capture progress, e.g. a progress bar.
pub trait CaptureSubscriber: Send + Sync {
    fn notify_established(&self, _session: &Session, _resumed: usize) {}

    fn notify_disposition(&self, _disposition: &Disposition) {}

    fn notify_finished(&self, _outcome: &CaptureOutcome) {}
}

pub struct CaptureMachine {
    storage: BeamStorage,
    timeout: Duration,
    state: CaptureState,
    last_progress: Option<Instant>,
    stats: CaptureStats,
    subscribers: Vec<Arc<dyn CaptureSubscriber>>,
}

impl CaptureMachine {
    pub fn new(storage: BeamStorage) -> Self {
        Self::with_timeout(storage, DEFAULT_CAPTURE_TIMEOUT)
    }

    pub fn with_timeout(storage: BeamStorage, timeout: Duration) -> Self {
        Self {
            storage,
            timeout,
            state: CaptureState::AwaitingFirst,
            last_progress: None,
            stats: CaptureStats::default(),
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn CaptureSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn storage(&self) -> &BeamStorage {
        &self.storage
    }

    pub fn session(&self) -> Option<Session> {
        match &self.state {
            CaptureState::Capturing(draft) => Some(draft.session()),
            CaptureState::Finished(CaptureOutcome::Complete { session, .. }) => {
                Some(session.clone())
            }
            CaptureState::Finished(CaptureOutcome::Interrupted(i)) => i.session.clone(),
            CaptureState::AwaitingFirst => None,
        }
    }

    pub fn outcome(&self) -> Option<&CaptureOutcome> {
        match &self.state {
            CaptureState::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, CaptureState::Finished(_))
    }

    /// Record a symbol whose bytes did not decode into a frame.
    pub fn on_decode_error(&mut self, error: &FrameError) {
        match error {
            FrameError::Malformed(reason) => {
                self.stats.malformed += 1;
                log::trace!("Dropped malformed symbol: {}", reason);
            }
            FrameError::ChecksumMismatch { index, .. } => {
                self.stats.corrupted += 1;
                log::debug!("Dropped corrupted copy of frame {}", index);
            }
        }
    }

    /// Feed one decoded frame.
    pub fn on_frame(&mut self, frame: Frame, now: Instant) -> Result<Disposition> {
        if !frame.verify() {
            self.stats.corrupted += 1;
            let disposition = Disposition::Corrupted { index: frame.index };
            self.notify_disposition(&disposition);
            return Ok(disposition);
        }

        if let CaptureState::AwaitingFirst = self.state {
            self.establish(&frame, now)?;
        }

        let disposition = match &mut self.state {
            CaptureState::AwaitingFirst => unreachable!("session established above"),
            CaptureState::Finished(_) => Disposition::Closed,
            CaptureState::Capturing(draft) => {
                if !draft.belongs_to(&frame.session_id, frame.total) {
                    self.stats.foreign += 1;
                    Disposition::ForeignSession
                } else if draft.insert(frame.index, frame.payload) {
                    self.stats.accepted += 1;
                    self.last_progress = Some(now);
                    Disposition::Accepted {
                        index: frame.index,
                        stored: draft.stored(),
                        total: draft.total(),
                    }
                } else {
                    self.stats.duplicates += 1;
                    Disposition::Duplicate { index: frame.index }
                }
            }
        };
        self.notify_disposition(&disposition);

        if self.draft().map_or(false, Draft::is_complete) {
            self.complete()?;
        }
        Ok(disposition)
    }

    /// Interrupt the run if no new index arrived within the timeout.
    /// Returns whether the machine is now interrupted.
    pub fn check_timeout(&mut self, now: Instant) -> Result<bool> {
        let expired = match (&self.state, self.last_progress) {
            (CaptureState::Capturing(_), Some(last)) => {
                now.saturating_duration_since(last) > self.timeout
            }
            _ => false,
        };
        if expired {
            log::info!(
                "No new frame accepted in {:?}, interrupting capture",
                self.timeout
            );
            self.interrupt(InterruptReason::Timeout)?;
        }
        Ok(expired)
    }

    /// Stop immediately, persisting whatever has been captured.
    pub fn cancel(&mut self) -> Result<()> {
        if self.is_finished() {
            return Ok(());
        }
        log::info!("Capture cancelled");
        self.interrupt(InterruptReason::Cancelled)
    }

    fn draft(&self) -> Option<&Draft> {
        match &self.state {
            CaptureState::Capturing(draft) => Some(draft),
            _ => None,
        }
    }

    fn establish(&mut self, frame: &Frame, now: Instant) -> Result<()> {
        let session = Session::new(frame.session_id.clone(), frame.total);
        let draft = match self.resumable_draft(&frame.session_id, frame.total)? {
            Some(draft) => draft,
            None => Draft::new(&session),
        };

        log::info!(
            "Capturing {} ({} frames, {} already stored)",
            session.filename(),
            session.total,
            draft.stored()
        );
        let resumed = draft.stored();
        for subscriber in &self.subscribers {
            subscriber.notify_established(&session, resumed);
        }

        self.state = CaptureState::Capturing(draft);
        self.last_progress = Some(now);
        Ok(())
    }

    /// Look up an earlier draft for this file name. A draft of a different
    /// session is stale: it is discarded and the capture starts afresh.
    fn resumable_draft(&self, session_id: &SessionId, total: u16) -> Result<Option<Draft>> {
        let filename = session_id.filename();
        match self.storage.load_draft(filename) {
            Ok(Some(draft)) if draft.belongs_to(session_id, total) => Ok(Some(draft)),
            Ok(Some(draft)) => {
                log::warn!(
                    "Discarding draft of session {} ({} frames): broadcast is session {} ({} frames)",
                    draft.session_id(),
                    draft.total(),
                    session_id,
                    total
                );
                self.storage.erase_draft(filename)?;
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(err @ BeamError::FileIo { .. }) => Err(err),
            Err(err) => {
                log::warn!("Discarding unreadable draft of {}: {}", filename, err);
                self.storage.erase_draft(filename)?;
                Ok(None)
            }
        }
    }

    fn complete(&mut self) -> Result<()> {
        let Some(draft) = self.draft() else {
            return Ok(());
        };
        let Some(content) = draft.assemble() else {
            return Ok(());
        };
        let session = draft.session();

        let output = self
            .storage
            .write_output(session.filename(), &content)?;
        self.storage.erase_draft(session.filename())?;
        self.erase_manifest_of(&session.id)?;

        log::info!(
            "Restored {} ({} bytes) to {}",
            session.filename(),
            content.len(),
            output.display()
        );
        self.finish(CaptureOutcome::Complete {
            session,
            output,
            bytes: content.len(),
        });
        Ok(())
    }

    fn interrupt(&mut self, reason: InterruptReason) -> Result<()> {
        let interruption = match self.draft() {
            None => Interruption {
                reason,
                session: None,
                stored: 0,
                missing: BTreeSet::new(),
                draft_path: None,
                manifest_path: None,
            },
            Some(draft) => {
                let manifest = MissingManifest::from_draft(draft);
                let draft_path = self.storage.save_draft(draft)?;
                let manifest_path = if manifest.missing.is_empty() {
                    None
                } else {
                    Some(self.storage.save_manifest(&manifest)?)
                };
                Interruption {
                    reason,
                    session: Some(draft.session()),
                    stored: draft.stored(),
                    missing: manifest.missing,
                    draft_path: Some(draft_path),
                    manifest_path,
                }
            }
        };
        self.finish(CaptureOutcome::Interrupted(interruption));
        Ok(())
    }

    fn erase_manifest_of(&self, session_id: &SessionId) -> Result<()> {
        let path = self.storage.manifest_path();
        if !path.exists() {
            return Ok(());
        }
        match load_manifest(&path) {
            Ok(manifest) if &manifest.session_id == session_id => {
                self.storage.erase_manifest()?;
            }
            Ok(_) => log::debug!("Keeping manifest of another session"),
            Err(err) => log::warn!("Keeping unreadable manifest: {}", err),
        }
        Ok(())
    }

    fn finish(&mut self, outcome: CaptureOutcome) {
        for subscriber in &self.subscribers {
            subscriber.notify_finished(&outcome);
        }
        self.state = CaptureState::Finished(outcome);
    }

    fn notify_disposition(&self, disposition: &Disposition) {
        for subscriber in &self.subscribers {
            subscriber.notify_disposition(disposition);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use tempdir::TempDir;

    use super::*;
    use crate::chunk::{chunk, ChunkedFile};
    use crate::frame::header_overhead;

    fn sample_file(len: usize, per_frame: usize) -> (Vec<u8>, ChunkedFile) {
        let content: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        let capacity = per_frame + header_overhead(SessionId::encoded_len_for("sample.bin"));
        let chunked = chunk(&content, "sample.bin", capacity).unwrap();
        (content, chunked)
    }

    fn machine() -> (TempDir, CaptureMachine) {
        let dir = TempDir::new("arkbeam").expect("Failed to create temporary directory");
        let machine = CaptureMachine::new(BeamStorage::new(dir.path()));
        (dir, machine)
    }

    #[test]
    fn captures_out_of_order_and_restores() {
        let (_dir, mut machine) = machine();
        let (content, chunked) = sample_file(10_000, 2_000);
        let now = Instant::now();

        for index in [4, 1, 3, 0, 2] {
            machine
                .on_frame(chunked.frames[index].clone(), now)
                .unwrap();
        }

        match machine.outcome() {
            Some(CaptureOutcome::Complete { output, bytes, .. }) => {
                assert_eq!(*bytes, 10_000);
                assert_eq!(fs::read(output).unwrap(), content);
                assert!(output.ends_with("RESTORED_sample.bin"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!machine.storage().draft_path("sample.bin").exists());
    }

    #[test]
    fn duplicates_are_no_ops() {
        let (_dir, mut machine) = machine();
        let (_, chunked) = sample_file(10_000, 2_000);
        let now = Instant::now();

        machine.on_frame(chunked.frames[0].clone(), now).unwrap();
        let second = machine.on_frame(chunked.frames[0].clone(), now).unwrap();
        assert_eq!(second, Disposition::Duplicate { index: 0 });
        assert_eq!(machine.stats().accepted, 1);
        assert_eq!(machine.stats().duplicates, 1);
    }

    #[test]
    fn foreign_frames_do_not_reset_state() {
        let (_dir, mut machine) = machine();
        let (_, ours) = sample_file(10_000, 2_000);
        let other = chunk(b"some other file", "other.txt", 64).unwrap();
        let now = Instant::now();

        machine.on_frame(ours.frames[0].clone(), now).unwrap();
        let disposition = machine.on_frame(other.frames[0].clone(), now).unwrap();
        assert_eq!(disposition, Disposition::ForeignSession);
        assert_eq!(machine.session().unwrap(), ours.session);
    }

    #[test]
    fn tampered_frame_never_enters_the_draft() {
        let (_dir, mut machine) = machine();
        let (_, chunked) = sample_file(10_000, 2_000);
        let now = Instant::now();

        machine.on_frame(chunked.frames[0].clone(), now).unwrap();
        let mut bad = chunked.frames[2].clone();
        bad.payload[10] ^= 0x55;
        assert_eq!(
            machine.on_frame(bad, now).unwrap(),
            Disposition::Corrupted { index: 2 }
        );

        machine.cancel().unwrap();
        match machine.outcome() {
            Some(CaptureOutcome::Interrupted(i)) => assert!(i.missing.contains(&2)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn interruption_persists_draft_and_manifest() {
        let (_dir, mut machine) = machine();
        let (_, chunked) = sample_file(10_000, 2_000);
        let start = Instant::now();

        for index in [0, 1, 3] {
            machine
                .on_frame(chunked.frames[index].clone(), start)
                .unwrap();
        }
        assert!(!machine.check_timeout(start + Duration::from_secs(5)).unwrap());
        assert!(machine.check_timeout(start + Duration::from_secs(6)).unwrap());

        let interruption = match machine.outcome() {
            Some(CaptureOutcome::Interrupted(i)) => i.clone(),
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(interruption.reason, InterruptReason::Timeout);
        assert_eq!(interruption.stored, 3);
        assert_eq!(interruption.missing, BTreeSet::from([2, 4]));

        let manifest = load_manifest(interruption.manifest_path.unwrap()).unwrap();
        assert_eq!(manifest.missing, BTreeSet::from([2, 4]));
        assert_eq!(manifest.session_id, chunked.session.id);

        let draft = machine.storage().load_draft("sample.bin").unwrap().unwrap();
        assert_eq!(draft.indices().collect::<Vec<_>>(), vec![0, 1, 3]);
    }

    #[test]
    fn duplicates_do_not_extend_the_timeout() {
        let (_dir, mut machine) = machine();
        let (_, chunked) = sample_file(10_000, 2_000);
        let start = Instant::now();

        machine.on_frame(chunked.frames[0].clone(), start).unwrap();
        machine
            .on_frame(chunked.frames[0].clone(), start + Duration::from_secs(4))
            .unwrap();
        assert!(machine.check_timeout(start + Duration::from_secs(6)).unwrap());
    }

    #[test]
    fn cancel_before_first_frame_persists_nothing() {
        let (dir, mut machine) = machine();
        machine.cancel().unwrap();

        match machine.outcome() {
            Some(CaptureOutcome::Interrupted(i)) => {
                assert_eq!(i.reason, InterruptReason::Cancelled);
                assert!(i.session.is_none());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn frames_after_the_end_are_closed() {
        let (_dir, mut machine) = machine();
        let (_, chunked) = sample_file(100, 2_000);
        let now = Instant::now();

        machine.on_frame(chunked.frames[0].clone(), now).unwrap();
        assert!(machine.is_finished());
        assert_eq!(
            machine.on_frame(chunked.frames[0].clone(), now).unwrap(),
            Disposition::Closed
        );
    }

    #[test]
    fn resumes_matching_draft() {
        let dir = TempDir::new("arkbeam").expect("Failed to create temporary directory");
        let (content, chunked) = sample_file(10_000, 2_000);
        let now = Instant::now();

        let mut first = CaptureMachine::new(BeamStorage::new(dir.path()));
        for index in [0, 1, 3] {
            first.on_frame(chunked.frames[index].clone(), now).unwrap();
        }
        first.cancel().unwrap();

        let mut second = CaptureMachine::new(BeamStorage::new(dir.path()));
        second.on_frame(chunked.frames[2].clone(), now).unwrap();
        assert!(!second.is_finished());
        second.on_frame(chunked.frames[4].clone(), now).unwrap();

        match second.outcome() {
            Some(CaptureOutcome::Complete { output, .. }) => {
                assert_eq!(fs::read(output).unwrap(), content)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!dir.path().join("missing_parts.json").exists());
        assert!(!dir.path().join("DRAFT_sample.bin.json").exists());
    }

    #[test_log::test]
    fn stale_draft_of_another_session_is_discarded() {
        let dir = TempDir::new("arkbeam").expect("Failed to create temporary directory");
        let storage = BeamStorage::new(dir.path());
        let now = Instant::now();

        // Same name and frame count, different content.
        let old = chunk(&[1u8; 300], "same.bin", 100 + header_overhead(25)).unwrap();
        let new = chunk(&[2u8; 300], "same.bin", 100 + header_overhead(25)).unwrap();
        assert_eq!(old.total(), new.total());

        let mut first = CaptureMachine::new(storage.clone());
        first.on_frame(old.frames[0].clone(), now).unwrap();
        first.cancel().unwrap();

        let mut second = CaptureMachine::new(storage.clone());
        second.on_frame(new.frames[1].clone(), now).unwrap();
        second.cancel().unwrap();

        let draft = storage.load_draft("same.bin").unwrap().unwrap();
        assert_eq!(draft.session_id(), &new.session.id);
        assert_eq!(draft.indices().collect::<Vec<_>>(), vec![1]);
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl CaptureSubscriber for Recorder {
        fn notify_established(&self, session: &Session, resumed: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("established {} {}", session.total, resumed));
        }

        fn notify_disposition(&self, disposition: &Disposition) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{:?}", disposition));
        }

        fn notify_finished(&self, outcome: &CaptureOutcome) {
            let label = match outcome {
                CaptureOutcome::Complete { .. } => "complete",
                CaptureOutcome::Interrupted(_) => "interrupted",
            };
            self.events.lock().unwrap().push(label.to_owned());
        }
    }

    #[test]
    fn subscribers_see_every_step() {
        let (_dir, mut machine) = machine();
        let recorder = Arc::new(Recorder::default());
        machine.subscribe(recorder.clone());
        let (_, chunked) = sample_file(3_000, 2_000);
        let now = Instant::now();

        machine.on_frame(chunked.frames[1].clone(), now).unwrap();
        machine.on_frame(chunked.frames[1].clone(), now).unwrap();
        machine.on_frame(chunked.frames[0].clone(), now).unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "established 2 0".to_owned(),
                "Accepted { index: 1, stored: 1, total: 2 }".to_owned(),
                "Duplicate { index: 1 }".to_owned(),
                "Accepted { index: 0, stored: 2, total: 2 }".to_owned(),
                "complete".to_owned(),
            ]
        );
    }
}
