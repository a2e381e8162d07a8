use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::{CaptureMachine, CaptureOutcome};
use crate::errors::{BeamError, Result};
use crate::frame::Frame;
use crate::symbol::{ImageSource, SymbolDecoder};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Synchronous scan loop: sample, decode, feed the capture machine, check
/// the timeout, repeat.
pub struct Receiver<S, D> {
    source: S,
    decoder: D,
    machine: CaptureMachine,
    poll_interval: Duration,
}

impl<S, D> Receiver<S, D>
where
    S: ImageSource,
    D: SymbolDecoder<Image = S::Image>,
{
    pub fn new(source: S, decoder: D, machine: CaptureMachine) -> Self {
        Self {
            source,
            decoder,
            machine,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn machine(&self) -> &CaptureMachine {
        &self.machine
    }

    /// Scan until the session completes, times out or `cancel` is raised.
    ///
    /// Whatever ends the run, the draft and manifest are on disk before this
    /// returns. If scanning itself fails, the partial state is persisted on a
    /// best-effort basis and the original error is returned.
    pub fn run(&mut self, cancel: &AtomicBool) -> Result<CaptureOutcome> {
        match self.scan(cancel) {
            Ok(()) => {}
            Err(err) => {
                if let Err(persist_err) = self.machine.cancel() {
                    log::error!("Failed to persist partial capture: {}", persist_err);
                }
                return Err(err);
            }
        }

        self.machine.outcome().cloned().ok_or_else(|| {
            BeamError::Other(anyhow::anyhow!("Capture loop ended without an outcome"))
        })
    }

    fn scan(&mut self, cancel: &AtomicBool) -> Result<()> {
        while !self.machine.is_finished() {
            if cancel.load(Ordering::Acquire) {
                return self.machine.cancel();
            }

            let sampled = self.source.sample()?;
            let decoded = sampled
                .as_ref()
                .and_then(|image| self.decoder.decode_symbol(image));

            if let Some(bytes) = decoded {
                match Frame::decode(&bytes) {
                    Ok(frame) => {
                        self.machine.on_frame(frame, Instant::now())?;
                    }
                    Err(err) => self.machine.on_decode_error(&err),
                }
            }

            if self.machine.check_timeout(Instant::now())? {
                break;
            }
            if sampled.is_none() {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(())
    }
}
