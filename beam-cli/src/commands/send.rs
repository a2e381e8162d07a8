use std::io;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use arkbeam::{
    chunk_file, load_manifest, remediation_scheduler, BroadcastScheduler,
    BroadcastSummary, SymbolDisplay,
};
use qrcode::QrCode;

use super::{interrupt_flag, EXIT_INTERRUPTED, EXIT_SUCCESS};
use crate::display::{PngDisplay, Resolution, TerminalDisplay};
use crate::progress::BroadcastProgress;
use crate::qr::{QrSymbolCodec, MAX_FRAME_BYTES};
use crate::{AppConfig, AppError};

#[derive(Clone, Debug, clap::Args)]
#[clap(name = "send", about = "Broadcast a file as a loop of QR codes")]
pub struct SendFile {
    #[clap(value_parser, help = "The file to send")]
    file: PathBuf,
    #[clap(
        long,
        value_name = "WxH",
        help = "Size of the rendered symbol in pixels (with --png)"
    )]
    resolution: Option<Resolution>,
    #[clap(
        long,
        value_name = "MANIFEST",
        help = "Only re-send the frames listed in a missing parts manifest"
    )]
    remediate: Option<PathBuf>,
    #[clap(long, help = "How long each symbol stays on screen")]
    dwell_ms: Option<u64>,
    #[clap(long, help = "Encoded bytes per frame, header included")]
    capacity: Option<usize>,
    #[clap(
        long,
        value_name = "PATH",
        help = "Write each symbol to an image file instead of the terminal"
    )]
    png: Option<PathBuf>,
}

impl SendFile {
    pub async fn run(&self, config: &AppConfig) -> Result<i32, AppError> {
        if !self.file.is_file() {
            return Err(AppError::SourceNotFound(
                self.file.display().to_string(),
            ));
        }

        let capacity = self.capacity.unwrap_or(config.capacity);
        if capacity > MAX_FRAME_BYTES {
            return Err(AppError::InvalidCapacity(capacity, MAX_FRAME_BYTES));
        }
        let resolution = match self.resolution {
            Some(resolution) => resolution,
            None => config.resolution.parse()?,
        };
        let dwell = self
            .dwell_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.dwell());

        let file = chunk_file(&self.file, capacity)?;
        eprintln!(
            "Session {} split into {} frames",
            file.session.id,
            file.total()
        );

        let scheduler = match &self.remediate {
            Some(path) => {
                let manifest = load_manifest(path)?;
                let scheduler = remediation_scheduler(&manifest, &file)?;
                eprintln!(
                    "Remediation: re-sending {} of {} frames ({})",
                    manifest.missing.len(),
                    manifest.total,
                    manifest.ranges()
                );
                scheduler
            }
            None => BroadcastScheduler::full(&file),
        };
        let restricted = scheduler.is_restricted();

        let stop = interrupt_flag();
        let summary = match &self.png {
            Some(path) => {
                eprintln!("Writing symbols to {}, press Ctrl+C to stop", path.display());
                let progress = Arc::new(BroadcastProgress::new("Broadcasting"));
                let mut scheduler = scheduler;
                scheduler.subscribe(progress.clone());
                let display = PngDisplay::new(path.clone(), resolution);
                let summary = broadcast(scheduler, display, dwell, stop).await?;
                progress.finish();
                summary
            }
            None => {
                let display = TerminalDisplay::new(io::stdout());
                broadcast(scheduler, display, dwell, stop).await?
            }
        };

        eprintln!(
            "Stopped after {} symbols, {} complete cycles",
            summary.shown, summary.cycles
        );
        let code = exit_code(restricted, &summary);
        if code != EXIT_SUCCESS {
            eprintln!("Not every frame was shown yet, the receiver cannot be complete");
        }
        Ok(code)
    }
}

/// A full broadcast succeeds once every frame was on screen at least once.
/// A remediation broadcast has no such bar, stopping it is always fine.
fn exit_code(restricted: bool, summary: &BroadcastSummary) -> i32 {
    if restricted || summary.cycles > 0 {
        EXIT_SUCCESS
    } else {
        EXIT_INTERRUPTED
    }
}

/// Drive the blocking broadcast loop off the async runtime.
async fn broadcast<D>(
    mut scheduler: BroadcastScheduler,
    mut display: D,
    dwell: Duration,
    stop: Arc<AtomicBool>,
) -> Result<BroadcastSummary, AppError>
where
    D: SymbolDisplay<Symbol = QrCode> + Send + 'static,
{
    let summary = tokio::task::spawn_blocking(move || {
        scheduler.run(&QrSymbolCodec, &mut display, dwell, &stop)
    })
    .await
    .map_err(|e| AppError::TaskError(e.to_string()))??;
    Ok(summary)
}
