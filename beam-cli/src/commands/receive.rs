use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arkbeam::{
    BeamStorage, CaptureMachine, CaptureOutcome, InterruptReason, Interruption,
    MissingRanges, Receiver,
};

use super::{interrupt_flag, EXIT_INTERRUPTED, EXIT_SUCCESS};
use crate::progress::CaptureProgress;
use crate::qr::QrSymbolCodec;
use crate::source::SpoolSource;
use crate::{AppConfig, AppError};

#[derive(Clone, Debug, clap::Args)]
#[clap(
    name = "receive",
    about = "Reassemble a broadcast from captured images"
)]
pub struct Receive {
    #[clap(long, help = "Where drafts, the manifest and restored files go")]
    work_dir: Option<PathBuf>,
    #[clap(long, help = "Directory the captured images are dropped into")]
    spool: Option<PathBuf>,
    #[clap(
        long,
        value_name = "SECONDS",
        help = "Stop after this long without a new frame"
    )]
    timeout: Option<u64>,
    #[clap(long, short, action, help = "Report dropped frames")]
    verbose: bool,
}

impl Receive {
    pub async fn run(&self, config: &AppConfig) -> Result<i32, AppError> {
        let work_dir = self.work_dir.clone().unwrap_or_else(|| config.work_dir());
        let spool = match (&self.spool, &self.work_dir) {
            (Some(spool), _) => spool.clone(),
            // An explicit work dir keeps its own spool unless configured.
            (None, Some(work_dir)) if config.spool_dir.is_none() => work_dir.join("spool"),
            (None, _) => config.spool_dir(),
        };
        let timeout = self
            .timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.timeout());

        fs::create_dir_all(&work_dir)?;
        let source = SpoolSource::new(&spool)?;
        eprintln!(
            "Watching {} for captured images, press Ctrl+C to stop",
            source.dir().display()
        );

        let mut machine = CaptureMachine::with_timeout(BeamStorage::new(&work_dir), timeout);
        machine.subscribe(Arc::new(CaptureProgress::new(self.verbose)));
        let mut receiver = Receiver::new(source, QrSymbolCodec, machine)
            .with_poll_interval(config.poll_interval());

        let cancel = interrupt_flag();
        let outcome = tokio::task::spawn_blocking(move || receiver.run(&cancel))
            .await
            .map_err(|e| AppError::TaskError(e.to_string()))??;

        match outcome {
            CaptureOutcome::Complete { output, bytes, .. } => {
                println!("Restored {} bytes to {}", bytes, output.display());
                Ok(EXIT_SUCCESS)
            }
            CaptureOutcome::Interrupted(interruption) => {
                report_interruption(&interruption);
                Ok(EXIT_INTERRUPTED)
            }
        }
    }
}

fn report_interruption(interruption: &Interruption) {
    let cause = match interruption.reason {
        InterruptReason::Timeout => "No new frames arrived in time",
        InterruptReason::Cancelled => "Capture stopped",
    };

    let Some(session) = &interruption.session else {
        println!("{}, no frames were received", cause);
        return;
    };

    println!(
        "{}: found {}/{} frames of {}, {} missing",
        cause,
        interruption.stored,
        session.total,
        session.filename(),
        interruption.missing.len()
    );
    println!(
        "Missing frames: {}",
        MissingRanges(interruption.missing.clone())
    );
    if let Some(draft) = &interruption.draft_path {
        println!("Progress saved to {}", draft.display());
    }
    if let Some(manifest) = &interruption.manifest_path {
        println!("Bring {} back to the sender and run:", manifest.display());
        println!(
            "    arkbeam send {} --remediate {}",
            session.filename(),
            manifest.display()
        );
    }
}
