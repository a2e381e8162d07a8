//! Optical broadcast transfer: moving a file across an air gap through a
//! stream of visual symbols, with no channel back to the sender.
//!
//! The sender [`chunk`](chunk::chunk)s a file into frames and cycles through
//! them with a [`BroadcastScheduler`]. The receiver feeds whatever it manages
//! to decode into a [`CaptureMachine`], which deduplicates, reassembles and,
//! when the broadcast goes quiet or the operator stops it, leaves a draft and
//! a [`MissingManifest`] behind. Carrying that manifest back to the sender by
//! hand starts a remediation broadcast of only the missing frames.

pub mod broadcast;
pub mod capture;
pub mod chunk;
pub mod errors;
pub mod frame;
pub mod receiver;
pub mod remediation;
pub mod session;
pub mod storage;
pub mod symbol;

pub use broadcast::{BroadcastScheduler, BroadcastSubscriber, BroadcastSummary, Tick};
pub use capture::{
    CaptureMachine, CaptureOutcome, CaptureState, CaptureStats, CaptureSubscriber,
    Disposition, InterruptReason, Interruption,
};
pub use chunk::{chunk, chunk_file, ChunkedFile};
pub use errors::{BeamError, Result};
pub use frame::{Frame, FrameError};
pub use receiver::Receiver;
pub use remediation::{reconcile, remediation_scheduler};
pub use session::{Session, SessionId};
pub use storage::{load_manifest, BeamStorage, Draft, MissingManifest, MissingRanges};
pub use symbol::{ImageSource, SymbolDecoder, SymbolDisplay, SymbolEncoder};
