//! Decode pipeline: one worker thread per session.
//!
//! The worker owns the [`FrameSource`] exclusively. It decodes, resizes
//! and quantizes frames and pushes them into the session's
//! [`FrameQueue`], blocking while the queue is full. Transport changes
//! reach it over a control channel; the worker checks for them between
//! frames. The source is dropped (and its decoder released) on every exit
//! path of the worker.
//!
//! A reposition either happens completely or not at all. The caller and
//! the worker race for its [`Ticket`]: a caller that gives up first
//! cancels it and the worker discards the request unread; a worker that
//! claims it first is waited for. Queued frames are only discarded once
//! the source has actually moved.

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use gridcast_color::Quantizer;
use gridcast_core::{EngineError, RationalTime, SeekError, SessionId, SharedFrameBuffer};
use gridcast_media::{resize, FrameSource};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info_span, trace, warn};

use crate::queue::{FrameQueue, PushError, QueueEnd};
use crate::stats::SessionStats;

/// Messages from the session to its worker.
#[derive(Debug)]
enum Control {
    Pause,
    Resume,
    Reposition {
        target: RationalTime,
        ticket: Arc<Ticket>,
        ack: Sender<Result<RationalTime, SeekError>>,
    },
    Shutdown,
}

/// Ownership of one reposition request.
#[derive(Debug, Default)]
struct Ticket(AtomicU8);

impl Ticket {
    const PENDING: u8 = 0;
    const CLAIMED: u8 = 1;
    const CANCELLED: u8 = 2;

    /// Worker side: `true` if the request is still wanted.
    fn claim(&self) -> bool {
        self.settle(Self::CLAIMED)
    }

    /// Caller side: `true` if the worker never started on it.
    fn cancel(&self) -> bool {
        self.settle(Self::CANCELLED)
    }

    fn settle(&self, to: u8) -> bool {
        self.0
            .compare_exchange(Self::PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Settings for one worker.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub width: u32,
    pub height: u32,
    pub max_consecutive_failures: u32,
}

/// Handle to a running decode worker.
#[derive(Debug)]
pub struct DecodePipeline {
    session: SessionId,
    control: Sender<Control>,
    /// Disconnects when the worker exits
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    queue: Arc<FrameQueue>,
}

impl DecodePipeline {
    /// Start decoding `source` into `queue`.
    pub fn spawn(
        session: SessionId,
        source: Box<dyn FrameSource>,
        quantizer: Quantizer,
        queue: Arc<FrameQueue>,
        stats: Arc<SessionStats>,
        settings: PipelineSettings,
    ) -> Result<Self, EngineError> {
        let (control_tx, control_rx) = unbounded();
        let (done_tx, done_rx) = bounded::<()>(0);

        let worker = Worker {
            session,
            source,
            quantizer,
            queue: Arc::clone(&queue),
            stats,
            settings,
            control: control_rx,
        };

        let handle = thread::Builder::new()
            .name(format!("gridcast-decode-{session}"))
            .spawn(move || {
                let _done = done_tx;
                worker.run();
            })
            .map_err(|e| EngineError::Resource(format!("cannot spawn decode worker: {e}")))?;

        Ok(Self {
            session,
            control: control_tx,
            done: done_rx,
            handle: Some(handle),
            queue,
        })
    }

    pub fn pause(&self) {
        let _ = self.control.send(Control::Pause);
    }

    pub fn resume(&self) {
        let _ = self.control.send(Control::Resume);
    }

    /// Move the source to `target` and discard the frames queued before
    /// the move. Returns once the worker has answered.
    ///
    /// If the worker has not picked the request up within `timeout`, the
    /// request is withdrawn and the source, queue and sequence numbers are
    /// left untouched. A request the worker already started on is waited
    /// for regardless of `timeout`.
    pub fn reposition(
        &self,
        target: RationalTime,
        timeout: Duration,
    ) -> Result<RationalTime, SeekError> {
        let exited = || SeekError::Reposition("decode worker has exited".into());
        let ticket = Arc::new(Ticket::default());
        let (ack_tx, ack_rx) = bounded(1);
        self.control
            .send(Control::Reposition {
                target,
                ticket: Arc::clone(&ticket),
                ack: ack_tx,
            })
            .map_err(|_| exited())?;
        self.queue.interrupt();

        match ack_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) if ticket.cancel() => {
                Err(SeekError::Timeout(timeout.as_millis() as u64))
            }
            Err(RecvTimeoutError::Timeout) => ack_rx.recv().unwrap_or_else(|_| Err(exited())),
            Err(RecvTimeoutError::Disconnected) => Err(exited()),
        }
    }

    /// Stop the worker and wait up to `timeout` for it to exit. Returns
    /// `false` if it did not acknowledge in time; it is then left to finish
    /// on its own.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        self.signal_shutdown();
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        error!(session = %self.session, "Decode worker panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(session = %self.session, ?timeout, "Decode worker did not stop in time");
                self.handle.take();
                false
            }
        }
    }

    fn signal_shutdown(&self) {
        self.queue.close();
        let _ = self.control.send(Control::Shutdown);
    }
}

impl Drop for DecodePipeline {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.signal_shutdown();
        }
    }
}

struct Worker {
    session: SessionId,
    source: Box<dyn FrameSource>,
    quantizer: Quantizer,
    queue: Arc<FrameQueue>,
    stats: Arc<SessionStats>,
    settings: PipelineSettings,
    control: Receiver<Control>,
}

impl Worker {
    fn run(mut self) {
        let span = info_span!("decode", session = %self.session);
        let _enter = span.enter();
        debug!("Decode worker started");

        let mut generation = self.queue.generation();
        let mut seq: u64 = 0;
        let mut failures: u32 = 0;
        let mut paused = false;
        let mut finished = false;
        // A frame whose push was interrupted, retried before decoding more.
        let mut held: Option<SharedFrameBuffer> = None;

        loop {
            let message = if paused || finished {
                self.control.recv().map_err(|_| TryRecvError::Disconnected)
            } else {
                self.control.try_recv()
            };
            match message {
                Ok(Control::Pause) => {
                    paused = true;
                    continue;
                }
                Ok(Control::Resume) => {
                    paused = false;
                    continue;
                }
                Ok(Control::Reposition { target, ticket, ack }) => {
                    if !ticket.claim() {
                        debug!(target = %target, "Reposition withdrawn");
                        continue;
                    }
                    let result = self.source.reposition(target);
                    match &result {
                        Ok(actual) => {
                            generation = self.queue.invalidate();
                            held = None;
                            seq = 0;
                            failures = 0;
                            finished = false;
                            debug!(target = %target, actual = %actual, "Repositioned");
                        }
                        Err(e) => warn!(target = %target, error = %e, "Reposition failed"),
                    }
                    let _ = ack.send(result);
                    continue;
                }
                Ok(Control::Shutdown) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            let frame = match held.take() {
                Some(frame) => frame,
                None => match self.decode_next(seq, &mut failures, generation) {
                    Decoded::Frame(frame) => frame,
                    Decoded::Skipped => continue,
                    Decoded::Ended => {
                        finished = true;
                        continue;
                    }
                },
            };

            match self.queue.push(Arc::clone(&frame), generation) {
                Ok(len) => {
                    self.stats.record_queue_len(len);
                    trace!(seq, len, "Queued frame");
                    seq += 1;
                }
                // Something is waiting in the control channel.
                Err(PushError::Interrupted) => held = Some(frame),
                Err(PushError::Stale) => self.stats.record_dropped(1),
                Err(PushError::Closed) => break,
            }
        }

        debug!("Decode worker stopped");
    }

    /// Decode, resize and quantize the next frame as number `seq`.
    fn decode_next(&mut self, seq: u64, failures: &mut u32, generation: u64) -> Decoded {
        let started = Instant::now();
        match self.source.next_frame() {
            Ok(Some(rgb)) => {
                let rgb = if rgb.width != self.settings.width || rgb.height != self.settings.height {
                    resize(&rgb, self.settings.width, self.settings.height)
                } else {
                    rgb
                };
                let frame_index = rgb.pts.to_frames(self.source.info().frame_rate).max(0) as u64;
                match self.quantizer.quantize(&rgb, frame_index, seq) {
                    Ok(frame) => {
                        *failures = 0;
                        self.stats.record_decoded(started.elapsed());
                        Decoded::Frame(Arc::new(frame))
                    }
                    Err(e) => self.record_failure(failures, generation, e.to_string()),
                }
            }
            Ok(None) => {
                debug!(frames = seq, "End of stream");
                self.queue.finish(generation, QueueEnd::EndOfStream);
                Decoded::Ended
            }
            Err(e) => self.record_failure(failures, generation, e.to_string()),
        }
    }

    /// Count a failed frame. The stream ends as failed once the failure
    /// budget is exceeded.
    fn record_failure(&self, failures: &mut u32, generation: u64, reason: String) -> Decoded {
        *failures += 1;
        self.stats.record_decode_failure();
        if *failures > self.settings.max_consecutive_failures {
            error!(failures = *failures, %reason, "Decode failure budget exceeded");
            self.queue.finish(
                generation,
                QueueEnd::Failed(format!("{} consecutive decode failures, last: {reason}", *failures)),
            );
            return Decoded::Ended;
        }
        warn!(failures = *failures, %reason, "Skipping undecodable frame");
        Decoded::Skipped
    }
}

enum Decoded {
    Frame(SharedFrameBuffer),
    Skipped,
    Ended,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcast_color::{DitherConfig, Palette, PaletteMapper};
    use gridcast_core::{FrameRate, Rgb};
    use gridcast_media::{SourceOpener, SyntheticClip, SyntheticOpener, VideoSource};

    fn quantizer() -> Quantizer {
        Quantizer::new(
            Arc::new(PaletteMapper::new(
                Palette::from_colors(&[Rgb::BLACK, Rgb::WHITE]).unwrap(),
            )),
            DitherConfig::OFF,
        )
    }

    fn start(clip: SyntheticClip, capacity: usize, budget: u32) -> (DecodePipeline, Arc<FrameQueue>, SyntheticOpener) {
        let opener = SyntheticOpener::new().with_clip("clip", clip);
        let source = opener.open(&VideoSource::file("clip"), 4, 4).unwrap();
        let queue = Arc::new(FrameQueue::new(capacity));
        let pipeline = DecodePipeline::spawn(
            SessionId::new(),
            source,
            quantizer(),
            Arc::clone(&queue),
            Arc::new(SessionStats::new()),
            PipelineSettings {
                width: 4,
                height: 4,
                max_consecutive_failures: budget,
            },
        )
        .unwrap();
        (pipeline, queue, opener)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn clip(seconds: i64) -> SyntheticClip {
        SyntheticClip::solid(4, 4, Rgb::WHITE, RationalTime::new(seconds, 1), FrameRate::FPS_20)
    }

    #[test]
    fn test_fills_queue_to_capacity_and_waits() {
        let (pipeline, queue, _opener) = start(clip(10), 3, 8);
        assert!(wait_for(|| queue.len() == 3));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.len(), 3);

        let seqs: Vec<u64> = (0..3).filter_map(|_| queue.pop()).map(|f| f.seq()).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(pipeline.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn test_reposition_resets_sequence() {
        let (pipeline, queue, _opener) = start(clip(10), 4, 8);
        assert!(wait_for(|| queue.len() == 4));

        let actual = pipeline
            .reposition(RationalTime::new(5, 1), Duration::from_secs(2))
            .unwrap();
        assert_eq!(actual, RationalTime::new(5, 1));
        assert!(wait_for(|| !queue.is_empty()));
        let first = queue.pop().unwrap();
        assert_eq!(first.seq(), 0);
        assert_eq!(first.timestamp(), actual);
        assert!(pipeline.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn test_rejected_reposition_keeps_queued_frames() {
        let stuck = clip(10).fail_reposition(SeekError::Reposition("no index".into()));
        let (pipeline, queue, opener) = start(stuck, 4, 8);
        assert!(wait_for(|| queue.len() == 4));

        let err = pipeline
            .reposition(RationalTime::new(5, 1), Duration::from_secs(2))
            .unwrap_err();
        assert_eq!(err, SeekError::Reposition("no index".into()));
        assert_eq!(queue.len(), 4);

        let mut stamps = Vec::new();
        for _ in 0..6 {
            assert!(wait_for(|| !queue.is_empty()));
            stamps.extend(queue.pop().map(|f| (f.timestamp(), f.seq())));
        }
        let expected: Vec<_> = (0..6).map(|i| (RationalTime::new(i, 20), i as u64)).collect();
        assert_eq!(stamps, expected);
        assert!(opener.repositions().is_empty());
        assert!(pipeline.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn test_timed_out_reposition_is_withdrawn() {
        let slow = clip(10).decode_delay(Duration::from_millis(400));
        let (pipeline, queue, opener) = start(slow, 4, 8);
        // The worker has just started on the second frame.
        assert!(wait_for(|| queue.len() == 1));

        let err = pipeline
            .reposition(RationalTime::new(5, 1), Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err, SeekError::Timeout(20));

        assert!(wait_for(|| queue.len() == 3));
        let stamps: Vec<_> = (0..3).filter_map(|_| queue.pop()).map(|f| (f.timestamp(), f.seq())).collect();
        assert_eq!(
            stamps,
            vec![(RationalTime::ZERO, 0), (RationalTime::new(1, 20), 1), (RationalTime::new(2, 20), 2)]
        );
        assert!(opener.repositions().is_empty());
        assert!(pipeline.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn test_end_of_stream_recorded() {
        let (pipeline, queue, _opener) = start(clip(0), 4, 8);
        assert!(wait_for(|| queue.drained_end() == Some(QueueEnd::EndOfStream)));
        assert!(pipeline.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn test_isolated_corruption_is_skipped() {
        let (pipeline, queue, _opener) = start(clip(10).corrupt_frames(1..3), 8, 4);
        assert!(wait_for(|| queue.len() == 8));
        let stamps: Vec<RationalTime> = (0..3).filter_map(|_| queue.pop()).map(|f| f.timestamp()).collect();
        assert_eq!(
            stamps,
            vec![RationalTime::ZERO, RationalTime::new(3, 20), RationalTime::new(4, 20)]
        );
        assert!(pipeline.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn test_failure_budget_escalates() {
        let (pipeline, queue, _opener) = start(clip(10).corrupt_frames(0..50), 4, 3);
        assert!(wait_for(|| matches!(queue.drained_end(), Some(QueueEnd::Failed(_)))));
        assert!(queue.is_empty());
        assert!(pipeline.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn test_shutdown_releases_source() {
        let (pipeline, queue, opener) = start(clip(10), 2, 8);
        assert!(wait_for(|| queue.len() == 2));
        assert_eq!(opener.live_sources(), 1);
        assert!(pipeline.shutdown(Duration::from_secs(2)));
        assert_eq!(opener.live_sources(), 0);
    }
}
