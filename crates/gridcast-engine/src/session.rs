//! Playback session: the transport state machine for one screen.
//!
//! Lock order is `command_lock` -> `pipeline` -> `inner` -> tracker. The
//! scheduling tick only takes `inner`, so a seek waiting on its decode
//! worker never stalls publishing on other screens, and a tick never sees
//! a half-finished seek (the state reads `Seeking` until it is done).

use gridcast_color::Quantizer;
use gridcast_core::{
    EngineError, RationalTime, Result, ScreenId, SessionId, SharedFrameBuffer,
};
use gridcast_media::{check_target, FrameSource, SourceInfo, VideoSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::pipeline::{DecodePipeline, PipelineSettings};
use crate::publisher::DeltaPublisher;
use crate::queue::{FrameQueue, QueueEnd};
use crate::registry::SessionOutcome;
use crate::stats::{SessionStats, StatsSnapshot};
use crate::visibility::VisibilityTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Loading,
    Playing,
    Paused,
    Seeking,
    Stopped,
    Error,
}

impl PlaybackState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Seeking => "seeking",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options given to `play`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayOptions {
    /// Restart from the beginning at end of stream
    pub looping: bool,
    /// Playback speed multiplier
    pub rate: f64,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            looping: false,
            rate: 1.0,
        }
    }
}

impl PlayOptions {
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// The speed multiplier, or 1.0 if the configured one is unusable.
    pub fn effective_rate(&self) -> f64 {
        if self.rate.is_finite() && self.rate > 0.0 {
            self.rate
        } else {
            1.0
        }
    }
}

/// Per-session settings derived from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub width: u32,
    pub height: u32,
    pub queue_capacity: usize,
    pub full_frame_threshold: f64,
    pub publish_interval: Duration,
    pub max_consecutive_failures: u32,
    pub seek_timeout: Duration,
    pub stop_timeout: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &EngineConfig, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            queue_capacity: config.queue_capacity,
            full_frame_threshold: config.full_frame_threshold,
            publish_interval: config.publish_interval(),
            max_consecutive_failures: config.max_consecutive_decode_failures,
            seek_timeout: config.seek_timeout(),
            stop_timeout: config.stop_timeout(),
        }
    }
}

/// Status of a session as reported by `info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub id: SessionId,
    pub source: String,
    pub state: PlaybackState,
    pub position: RationalTime,
    pub duration: Option<RationalTime>,
    pub options: PlayOptions,
    pub last_error: Option<String>,
    pub stats: StatsSnapshot,
    pub uptime_ms: u64,
}

#[derive(Debug)]
struct Inner {
    state: PlaybackState,
    position: RationalTime,
    /// Time of the last tick while playing; `None` re-anchors the clock
    last_tick: Option<Instant>,
    publisher: DeltaPublisher,
    info: Option<SourceInfo>,
    last_error: Option<String>,
}

impl Inner {
    fn expect_state(&self, command: &'static str, allowed: &[PlaybackState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                command,
                state: self.state.as_str(),
            })
        }
    }

    fn duration(&self) -> RationalTime {
        self.info.as_ref().map_or(RationalTime::ZERO, |i| i.duration)
    }
}

#[derive(Debug)]
pub struct PlaybackSession {
    id: SessionId,
    screen: ScreenId,
    source: VideoSource,
    options: PlayOptions,
    settings: SessionSettings,
    created_at: Instant,
    /// Serializes transport commands
    command_lock: Mutex<()>,
    /// Target of the newest seek not yet carried out
    pending_seek: Mutex<Option<RationalTime>>,
    pipeline: Mutex<Option<DecodePipeline>>,
    inner: Mutex<Inner>,
    queue: Arc<FrameQueue>,
    stats: Arc<SessionStats>,
}

impl PlaybackSession {
    /// A new session in `Loading`.
    pub fn new(screen: ScreenId, source: VideoSource, options: PlayOptions, settings: SessionSettings) -> Self {
        let id = SessionId::new();
        let stats = Arc::new(SessionStats::new());
        let publisher = DeltaPublisher::new(
            screen,
            settings.full_frame_threshold,
            settings.publish_interval,
            Arc::clone(&stats),
        );
        Self {
            id,
            screen,
            source,
            options,
            created_at: Instant::now(),
            command_lock: Mutex::new(()),
            pending_seek: Mutex::new(None),
            pipeline: Mutex::new(None),
            inner: Mutex::new(Inner {
                state: PlaybackState::Loading,
                position: RationalTime::ZERO,
                last_tick: None,
                publisher,
                info: None,
                last_error: None,
            }),
            queue: Arc::new(FrameQueue::new(settings.queue_capacity)),
            stats,
            settings,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn screen(&self) -> ScreenId {
        self.screen
    }

    pub fn source(&self) -> &VideoSource {
        &self.source
    }

    pub fn options(&self) -> PlayOptions {
        self.options
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    pub fn position(&self) -> RationalTime {
        self.inner.lock().position
    }

    pub fn duration(&self) -> Option<RationalTime> {
        self.inner.lock().info.as_ref().map(|i| i.duration)
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.inner.lock();
        SessionStatus {
            id: self.id,
            source: self.source.reference.clone(),
            state: inner.state,
            position: inner.position,
            duration: inner.info.as_ref().map(|i| i.duration),
            options: self.options,
            last_error: inner.last_error.clone(),
            stats: self.stats.snapshot(),
            uptime_ms: self.created_at.elapsed().as_millis() as u64,
        }
    }

    /// Attach an opened source and begin playing from 0.
    pub fn start(&self, source: Box<dyn FrameSource>, quantizer: Quantizer) -> Result<()> {
        let _command = self.command_lock.lock();
        let mut pipeline = self.pipeline.lock();
        self.inner.lock().expect_state("start", &[PlaybackState::Loading])?;

        let info = source.info().clone();
        let worker = DecodePipeline::spawn(
            self.id,
            source,
            quantizer,
            Arc::clone(&self.queue),
            Arc::clone(&self.stats),
            PipelineSettings {
                width: self.settings.width,
                height: self.settings.height,
                max_consecutive_failures: self.settings.max_consecutive_failures,
            },
        )?;
        *pipeline = Some(worker);

        let mut inner = self.inner.lock();
        info!(
            session = %self.id,
            source = %self.source,
            duration = %info.duration,
            fps = %info.frame_rate,
            "Playback started"
        );
        inner.info = Some(info);
        inner.state = PlaybackState::Playing;
        inner.position = RationalTime::ZERO;
        inner.last_tick = None;
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        let _command = self.command_lock.lock();
        let pipeline = self.pipeline.lock();
        let mut inner = self.inner.lock();
        inner.expect_state("pause", &[PlaybackState::Playing])?;
        inner.state = PlaybackState::Paused;
        inner.last_tick = None;
        if let Some(pipeline) = pipeline.as_ref() {
            pipeline.pause();
        }
        debug!(session = %self.id, position = %inner.position, "Paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let _command = self.command_lock.lock();
        let pipeline = self.pipeline.lock();
        let mut inner = self.inner.lock();
        inner.expect_state("resume", &[PlaybackState::Paused])?;
        inner.state = PlaybackState::Playing;
        inner.last_tick = None;
        if let Some(pipeline) = pipeline.as_ref() {
            pipeline.resume();
        }
        debug!(session = %self.id, position = %inner.position, "Resumed");
        Ok(())
    }

    /// Move playback to the nearest decodable point at or before `target`.
    /// A seek issued while another command is running replaces the target
    /// of any seek still waiting. On failure the state is left as it was.
    pub fn seek(&self, target: RationalTime) -> Result<RationalTime> {
        {
            let inner = self.inner.lock();
            inner.expect_state(
                "seek",
                &[PlaybackState::Playing, PlaybackState::Paused, PlaybackState::Seeking],
            )?;
            check_target(target, inner.duration())?;
        }
        *self.pending_seek.lock() = Some(target);

        let _command = self.command_lock.lock();
        let Some(target) = self.pending_seek.lock().take() else {
            // A later seek already ran in our place.
            return Ok(self.position());
        };
        self.reposition(target, "seek")
    }

    /// Restart from 0 after the stream ended, if the session still sits at
    /// the end. Returns `false` when something else moved it meanwhile.
    pub fn restart(&self) -> Result<bool> {
        let _command = self.command_lock.lock();
        if self.queue.drained_end() != Some(QueueEnd::EndOfStream) {
            return Ok(false);
        }
        self.reposition(RationalTime::ZERO, "loop")?;
        Ok(true)
    }

    fn reposition(&self, target: RationalTime, command: &'static str) -> Result<RationalTime> {
        let pipeline = self.pipeline.lock();
        let prior = {
            let mut inner = self.inner.lock();
            inner.expect_state(command, &[PlaybackState::Playing, PlaybackState::Paused])?;
            let prior = inner.state;
            inner.state = PlaybackState::Seeking;
            prior
        };

        let result = match pipeline.as_ref() {
            Some(pipeline) => pipeline
                .reposition(target, self.settings.seek_timeout)
                .map_err(EngineError::from),
            None => Err(EngineError::InvalidTransition {
                command,
                state: PlaybackState::Loading.as_str(),
            }),
        };

        let mut inner = self.inner.lock();
        inner.state = prior;
        inner.last_tick = None;
        match result {
            Ok(actual) => {
                inner.position = actual;
                inner.publisher.require_full();
                debug!(session = %self.id, target = %target, actual = %actual, "Seek complete");
                Ok(actual)
            }
            Err(e) => {
                warn!(session = %self.id, target = %target, error = %e, "Seek failed");
                Err(e)
            }
        }
    }

    /// Stop playback and release the source.
    pub fn stop(&self) -> Result<SessionOutcome> {
        let _command = self.command_lock.lock();
        self.terminate(PlaybackState::Stopped, None)
    }

    /// End the session after its stream ended with `end`, unless a command
    /// already moved it on.
    pub fn finish(&self, end: &QueueEnd) -> Option<SessionOutcome> {
        let _command = self.command_lock.lock();
        if self.queue.drained_end().as_ref() != Some(end) {
            return None;
        }
        let result = match end {
            QueueEnd::EndOfStream => self.terminate(PlaybackState::Stopped, None),
            QueueEnd::Failed(reason) => self.terminate(PlaybackState::Error, Some(reason.clone())),
        };
        result.ok()
    }

    /// Move to `Error` and release everything.
    pub fn fail(&self, reason: impl Into<String>) -> Option<SessionOutcome> {
        let _command = self.command_lock.lock();
        self.terminate(PlaybackState::Error, Some(reason.into())).ok()
    }

    fn terminate(&self, state: PlaybackState, error: Option<String>) -> Result<SessionOutcome> {
        let pipeline = {
            let mut pipeline = self.pipeline.lock();
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return Err(EngineError::InvalidTransition {
                    command: "stop",
                    state: inner.state.as_str(),
                });
            }
            inner.state = state;
            inner.last_tick = None;
            inner.publisher.require_full();
            if let Some(reason) = &error {
                inner.last_error = Some(reason.clone());
            }
            pipeline.take()
        };

        self.queue.close();
        if let Some(pipeline) = pipeline {
            pipeline.shutdown(self.settings.stop_timeout);
        }

        match &error {
            Some(reason) => warn!(session = %self.id, %reason, "Session failed"),
            None => info!(session = %self.id, "Session stopped"),
        }
        Ok(SessionOutcome {
            session: self.id,
            source: self.source.reference.clone(),
            state,
            error,
            stats: self.stats.snapshot(),
        })
    }

    /// Run `f` with the last published frame while no tick can publish, so
    /// a new subscriber's snapshot and the deltas that follow line up.
    pub fn with_snapshot<T>(&self, f: impl FnOnce(Option<&SharedFrameBuffer>) -> T) -> T {
        let inner = self.inner.lock();
        let frame = if inner.state.is_terminal() {
            None
        } else {
            inner.publisher.last()
        };
        f(frame)
    }

    /// Advance the clock to `now`, publish the frame due at the new
    /// position and report the end of the stream once it is reached.
    pub fn tick(&self, now: Instant, tracker: &VisibilityTracker) -> Option<QueueEnd> {
        let mut inner = self.inner.lock();
        if inner.state != PlaybackState::Playing {
            return None;
        }

        let elapsed = inner
            .last_tick
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        inner.last_tick = Some(now);
        let rate = self.options.effective_rate();
        let advance = if rate == 1.0 {
            RationalTime::from_duration(elapsed)
        } else {
            RationalTime::from_seconds_f64(elapsed.as_secs_f64() * rate)
        };
        let duration = inner.duration();
        inner.position = (inner.position + advance).clamp(RationalTime::ZERO, duration);

        let (latest, skipped) = self.queue.pop_due(inner.position);
        self.stats.record_dropped(skipped);
        let event = match latest {
            Some(frame) => inner.publisher.offer(frame, now),
            None => inner.publisher.flush(now),
        };
        if let Some(event) = event {
            tracker.deliver(&event, inner.publisher.last());
        }

        if inner.publisher.has_pending() {
            None
        } else {
            self.queue.drained_end()
        }
    }
}
