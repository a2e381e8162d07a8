use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::chunk::ChunkedFile;
use crate::errors::{BeamError, Result};
use crate::symbol::{SymbolDisplay, SymbolEncoder};

pub const DEFAULT_DWELL: Duration = Duration::from_millis(100);

/// Longest stretch the sender sleeps without looking at the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// One frame, already serialized, waiting for its turn on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub index: u16,
    pub bytes: Vec<u8>,
}

/// Position of the scheduler after one advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Position within the (possibly restricted) cycle.
    pub position: usize,
    /// Frame index that is due now.
    pub index: u16,
    /// Zero-based number of the cycle this tick belongs to.
    pub cycle: u64,
    /// Whether this is the last frame of its cycle.
    pub completes_cycle: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    pub shown: u64,
    pub cycles: u64,
}

pub trait BroadcastSubscriber: Send + Sync {
    fn notify_shown(&self, _tick: &Tick, _per_cycle: usize) {}

    fn notify_cycle_complete(&self, _cycle: u64, _restricted: bool) {}
}

/// Cycles through frames until told to stop.
///
/// In full mode every frame is shown in ascending order, and the end of the
/// first pass is reported, but the loop keeps going because the receiver may
/// have missed some of them. In remediation mode only the requested indices
/// are shown, also ascending.
pub struct BroadcastScheduler {
    frames: Vec<EncodedFrame>,
    total: u16,
    restricted: bool,
    position: usize,
    cycle: u64,
    subscribers: Vec<Arc<dyn BroadcastSubscriber>>,
}

impl BroadcastScheduler {
    pub fn full(file: &ChunkedFile) -> Self {
        let frames = file
            .frames
            .iter()
            .map(|frame| EncodedFrame {
                index: frame.index,
                bytes: frame.encode(),
            })
            .collect();
        Self::with_frames(frames, file.total(), false)
    }

    pub fn restricted(file: &ChunkedFile, indices: &BTreeSet<u16>) -> Result<Self> {
        if indices.is_empty() {
            return Err(BeamError::EmptyManifest);
        }
        let frames = indices
            .iter()
            .map(|&index| {
                let frame = file.frame(index).ok_or_else(|| {
                    BeamError::Other(anyhow::anyhow!(
                        "Frame {} is outside of 0..{}",
                        index,
                        file.total()
                    ))
                })?;
                Ok(EncodedFrame {
                    index,
                    bytes: frame.encode(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::with_frames(frames, file.total(), true))
    }

    fn with_frames(frames: Vec<EncodedFrame>, total: u16, restricted: bool) -> Self {
        Self {
            frames,
            total,
            restricted,
            position: 0,
            cycle: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn BroadcastSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    pub fn total(&self) -> u16 {
        self.total
    }

    /// Frames shown per cycle.
    pub fn per_cycle(&self) -> usize {
        self.frames.len()
    }

    pub fn indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.frames.iter().map(|f| f.index)
    }

    pub fn frame_bytes(&self, position: usize) -> &[u8] {
        &self.frames[position].bytes
    }

    /// Move to the next frame, wrapping around at the end of a cycle.
    pub fn advance(&mut self) -> Tick {
        let position = self.position;
        let completes_cycle = position + 1 == self.frames.len();
        let tick = Tick {
            position,
            index: self.frames[position].index,
            cycle: self.cycle,
            completes_cycle,
        };

        if completes_cycle {
            self.position = 0;
            self.cycle += 1;
        } else {
            self.position += 1;
        }
        tick
    }

    /// Show frames one after another, each for `dwell`, until `stop` is set.
    pub fn run<E, D>(
        &mut self,
        encoder: &E,
        display: &mut D,
        dwell: Duration,
        stop: &AtomicBool,
    ) -> Result<BroadcastSummary>
    where
        E: SymbolEncoder,
        D: SymbolDisplay<Symbol = E::Symbol>,
    {
        let mut summary = BroadcastSummary::default();
        log::info!(
            "Broadcasting {} of {} frames{}",
            self.per_cycle(),
            self.total,
            if self.restricted { " (remediation)" } else { "" }
        );

        while !stop.load(Ordering::Acquire) {
            let tick = self.advance();
            let symbol = encoder.encode_symbol(self.frame_bytes(tick.position))?;
            display.present(&symbol, &self.caption(&tick))?;
            summary.shown += 1;

            for subscriber in &self.subscribers {
                subscriber.notify_shown(&tick, self.frames.len());
            }

            if tick.completes_cycle {
                summary.cycles += 1;
                if tick.cycle == 0 && !self.restricted {
                    log::info!("All {} frames sent once, repeating until stopped", self.total);
                }
                for subscriber in &self.subscribers {
                    subscriber.notify_cycle_complete(tick.cycle, self.restricted);
                }
            }

            pause(dwell, stop);
        }

        log::info!(
            "Broadcast stopped after {} symbols and {} full cycles",
            summary.shown,
            summary.cycles
        );
        Ok(summary)
    }

    fn caption(&self, tick: &Tick) -> String {
        if self.restricted {
            format!(
                "Part {}/{} (missing {}/{})",
                tick.index as u32 + 1,
                self.total,
                tick.position + 1,
                self.frames.len()
            )
        } else {
            format!("Part {}/{}", tick.index as u32 + 1, self.total)
        }
    }
}

/// Sleep for `dwell`, waking early once `stop` is set.
fn pause(dwell: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + dwell;
    loop {
        let now = Instant::now();
        if now >= deadline || stop.load(Ordering::Acquire) {
            return;
        }
        thread::sleep((deadline - now).min(STOP_POLL));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::chunk::chunk;
    use crate::frame::Frame;

    struct BytesEncoder;

    impl SymbolEncoder for BytesEncoder {
        type Symbol = Vec<u8>;

        fn encode_symbol(&self, bytes: &[u8]) -> Result<Vec<u8>> {
            Ok(bytes.to_vec())
        }
    }

    /// Records shown frame indices and raises the stop flag after `limit`.
    struct Recording<'a> {
        shown: Vec<u16>,
        captions: Vec<String>,
        limit: usize,
        stop: &'a AtomicBool,
    }

    impl SymbolDisplay for Recording<'_> {
        type Symbol = Vec<u8>;

        fn present(&mut self, symbol: &Vec<u8>, caption: &str) -> Result<()> {
            let frame = Frame::decode(symbol).expect("scheduler shows valid frames");
            self.shown.push(frame.index);
            self.captions.push(caption.to_owned());
            if self.shown.len() >= self.limit {
                self.stop.store(true, Ordering::Release);
            }
            Ok(())
        }
    }

    fn five_frames() -> ChunkedFile {
        chunk(&[9u8; 500], "five.bin", 100 + crate::frame::header_overhead(25)).unwrap()
    }

    #[test]
    fn full_mode_cycles_in_order() {
        let file = five_frames();
        let mut scheduler = BroadcastScheduler::full(&file);
        let ticks: Vec<Tick> = (0..7).map(|_| scheduler.advance()).collect();

        let order: Vec<u16> = ticks.iter().map(|t| t.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 0, 1]);
        assert!(ticks[4].completes_cycle);
        assert_eq!(ticks[5].cycle, 1);
        assert_eq!(ticks.iter().filter(|t| t.completes_cycle).count(), 1);
    }

    #[test]
    fn restricted_mode_shows_exactly_the_requested_indices() {
        let file = five_frames();
        let wanted = BTreeSet::from([4, 2]);
        let mut scheduler = BroadcastScheduler::restricted(&file, &wanted).unwrap();
        assert!(scheduler.is_restricted());
        assert_eq!(scheduler.per_cycle(), 2);

        let order: Vec<u16> = (0..6).map(|_| scheduler.advance().index).collect();
        assert_eq!(order, vec![2, 4, 2, 4, 2, 4]);
    }

    #[test]
    fn restricted_mode_rejects_empty_and_unknown_sets() {
        let file = five_frames();
        assert!(matches!(
            BroadcastScheduler::restricted(&file, &BTreeSet::new()),
            Err(BeamError::EmptyManifest)
        ));
        assert!(BroadcastScheduler::restricted(&file, &BTreeSet::from([5])).is_err());
    }

    #[test]
    fn run_keeps_looping_past_the_first_cycle_until_stopped() {
        let file = five_frames();
        let stop = AtomicBool::new(false);
        let mut display = Recording {
            shown: Vec::new(),
            captions: Vec::new(),
            limit: 12,
            stop: &stop,
        };

        let mut scheduler = BroadcastScheduler::full(&file);
        let summary = scheduler
            .run(&BytesEncoder, &mut display, Duration::ZERO, &stop)
            .unwrap();

        assert_eq!(summary.shown, 12);
        assert_eq!(summary.cycles, 2);
        assert_eq!(&display.shown[..6], &[0, 1, 2, 3, 4, 0]);
        assert_eq!(display.captions[0], "Part 1/5");
    }

    #[test]
    fn run_returns_at_once_when_already_stopped() {
        let file = five_frames();
        let stop = AtomicBool::new(true);
        let mut display = Recording {
            shown: Vec::new(),
            captions: Vec::new(),
            limit: 1,
            stop: &stop,
        };
        let summary = BroadcastScheduler::full(&file)
            .run(&BytesEncoder, &mut display, Duration::from_secs(60), &stop)
            .unwrap();
        assert_eq!(summary, BroadcastSummary::default());
    }

    #[derive(Default)]
    struct CycleCounter {
        cycles: Mutex<Vec<(u64, bool)>>,
    }

    impl BroadcastSubscriber for CycleCounter {
        fn notify_cycle_complete(&self, cycle: u64, restricted: bool) {
            self.cycles.lock().unwrap().push((cycle, restricted));
        }
    }

    #[test]
    fn subscribers_hear_about_completed_cycles() {
        let file = five_frames();
        let stop = AtomicBool::new(false);
        let counter = Arc::new(CycleCounter::default());
        let mut display = Recording {
            shown: Vec::new(),
            captions: Vec::new(),
            limit: 6,
            stop: &stop,
        };

        let mut scheduler =
            BroadcastScheduler::restricted(&file, &BTreeSet::from([1, 3])).unwrap();
        scheduler.subscribe(counter.clone());
        scheduler
            .run(&BytesEncoder, &mut display, Duration::ZERO, &stop)
            .unwrap();

        assert_eq!(
            *counter.cycles.lock().unwrap(),
            vec![(0, true), (1, true), (2, true)]
        );
        assert_eq!(display.captions[1], "Part 4/5 (missing 2/2)");
    }
}
