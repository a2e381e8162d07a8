use std::sync::RwLock;
use std::time::Duration;

use arkbeam::{
    BroadcastSubscriber, CaptureOutcome, CaptureSubscriber, Disposition, Session, Tick,
};
use indicatif::{ProgressBar, ProgressStyle};

/// Shows how many distinct frames of the current session have been stored.
pub struct CaptureProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl CaptureProgress {
    pub fn new(verbose: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("Waiting for the first frame...");
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, verbose }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} frames ({elapsed})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
    }
}

impl CaptureSubscriber for CaptureProgress {
    fn notify_established(&self, session: &Session, resumed: usize) {
        self.bar.set_style(Self::bar_style());
        self.bar.set_length(session.total as u64);
        self.bar.set_position(resumed as u64);
        self.bar.set_message(format!("Receiving {}", session.filename()));
        if resumed > 0 {
            self.bar
                .println(format!("Resuming with {} frames from the draft", resumed));
        }
    }

    fn notify_disposition(&self, disposition: &Disposition) {
        match disposition {
            Disposition::Accepted { stored, .. } => self.bar.set_position(*stored as u64),
            Disposition::Corrupted { index } if self.verbose => {
                self.bar
                    .println(format!("[DEBUG] Frame {} failed its checksum", index))
            }
            Disposition::ForeignSession if self.verbose => self
                .bar
                .println("[DEBUG] Ignoring a frame from another broadcast"),
            _ => {}
        }
    }

    fn notify_finished(&self, outcome: &CaptureOutcome) {
        match outcome {
            CaptureOutcome::Complete { session, .. } => self
                .bar
                .finish_with_message(format!("[DONE] Received {}", session.filename())),
            CaptureOutcome::Interrupted(_) => self.bar.abandon_with_message("Interrupted"),
        }
    }
}

/// Counts symbols shown by a broadcast whose symbols live outside the
/// terminal.
pub struct BroadcastProgress {
    label: String,
    bar: RwLock<Option<ProgressBar>>,
}

impl BroadcastProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bar: RwLock::new(None),
        }
    }

    pub fn finish(&self) {
        if let Ok(guard) = self.bar.read() {
            if let Some(bar) = guard.as_ref() {
                bar.abandon();
            }
        }
    }
}

impl BroadcastSubscriber for BroadcastProgress {
    fn notify_shown(&self, tick: &Tick, per_cycle: usize) {
        let mut bars = match self.bar.write() {
            Ok(bars) => bars,
            Err(e) => {
                eprintln!("Error accessing progress bar: {}", e);
                return;
            }
        };
        let bar = bars.get_or_insert_with(|| {
            let bar = ProgressBar::new(per_cycle as u64);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
            );
            bar
        });
        bar.set_position(tick.position as u64 + 1);
        bar.set_message(format!("{} cycle {}", self.label, tick.cycle + 1));
    }

    fn notify_cycle_complete(&self, cycle: u64, restricted: bool) {
        if let Ok(guard) = self.bar.read() {
            if let Some(bar) = guard.as_ref() {
                if cycle == 0 {
                    let note = if restricted {
                        "Every missing frame has been shown once"
                    } else {
                        "Every frame has been shown once, repeating until stopped"
                    };
                    bar.println(note);
                }
                bar.reset();
            }
        }
    }
}
