//! Delta publisher: turns a session's stream of frame buffers into display
//! events, and caps the rate at which observers receive them.

use gridcast_core::{ScreenId, SharedFrameBuffer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::event::DisplayEvent;
use crate::stats::SessionStats;

#[derive(Debug)]
pub struct DeltaPublisher {
    screen: ScreenId,
    /// Fraction of changed cells above which a full frame is sent
    threshold: f64,
    min_interval: Duration,
    last: Option<SharedFrameBuffer>,
    force_full: bool,
    last_emit: Option<Instant>,
    /// Newest frame held back by the throttle
    pending: Option<SharedFrameBuffer>,
    stats: Arc<SessionStats>,
}

impl DeltaPublisher {
    pub fn new(
        screen: ScreenId,
        threshold: f64,
        min_interval: Duration,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            screen,
            threshold,
            min_interval,
            last: None,
            force_full: true,
            last_emit: None,
            pending: None,
            stats,
        }
    }

    /// Offer the next ready frame. Returns the event to fan out, or `None`
    /// when the frame is held back by the throttle or changes nothing.
    pub fn offer(&mut self, frame: SharedFrameBuffer, now: Instant) -> Option<DisplayEvent> {
        if self.throttled(now) {
            if self.pending.replace(frame).is_some() {
                self.stats.record_dropped(1);
            }
            return None;
        }
        if self.pending.take().is_some() {
            self.stats.record_dropped(1);
        }
        self.emit(frame, now)
    }

    /// Publish a frame held back by the throttle once the interval allows.
    pub fn flush(&mut self, now: Instant) -> Option<DisplayEvent> {
        if self.pending.is_none() || self.throttled(now) {
            return None;
        }
        let frame = self.pending.take()?;
        self.emit(frame, now)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Full-frame event for the last published frame.
    pub fn snapshot(&self) -> Option<DisplayEvent> {
        self.last
            .as_ref()
            .map(|frame| DisplayEvent::full(self.screen, Arc::clone(frame)))
    }

    /// The last frame actually published.
    pub fn last(&self) -> Option<&SharedFrameBuffer> {
        self.last.as_ref()
    }

    /// Make the next publish a full frame and drop any held-back frame.
    pub fn require_full(&mut self) {
        self.force_full = true;
        self.pending = None;
    }

    fn throttled(&self, now: Instant) -> bool {
        self.last_emit
            .is_some_and(|last| now.saturating_duration_since(last) < self.min_interval)
    }

    fn emit(&mut self, frame: SharedFrameBuffer, now: Instant) -> Option<DisplayEvent> {
        let event = match self.last.as_ref() {
            Some(previous) if !self.force_full => {
                let changes = frame.changes_from(previous);
                if changes.is_empty() {
                    None
                } else if changes.len() as f64 > self.threshold * frame.cell_count() as f64 {
                    Some(DisplayEvent::full(self.screen, Arc::clone(&frame)))
                } else {
                    Some(DisplayEvent::Delta {
                        screen: self.screen,
                        seq: frame.seq(),
                        changes: Arc::from(changes),
                    })
                }
            }
            _ => Some(DisplayEvent::full(self.screen, Arc::clone(&frame))),
        };

        self.force_full = false;
        self.last = Some(frame);
        if let Some(event) = &event {
            self.last_emit = Some(now);
            if event.is_full() {
                self.stats.record_full(event.cell_count());
            } else {
                self.stats.record_delta(event.cell_count());
            }
            trace!(screen = %self.screen, seq = event.seq(), cells = event.cell_count(), "Publishing");
        }
        event
    }
}
