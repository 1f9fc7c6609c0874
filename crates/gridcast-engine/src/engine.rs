//! The engine: screens, their sessions and the observers watching them.

use gridcast_color::{PaletteMapper, Quantizer};
use gridcast_core::{
    EngineError, FrameBuffer, Location, ObserverId, RationalTime, Result, Rgb, ScreenId, SessionId,
};
use gridcast_media::{
    ChainResolver, FfmpegOpener, LocalFileResolver, SourceOpener, SourceResolver, YtDlpResolver,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::event::DisplayEvent;
use crate::queue::QueueEnd;
use crate::registry::{Screen, ScreenDetail, ScreenRegistry, ScreenSpec, ScreenSummary, SessionOutcome};
use crate::session::{PlayOptions, PlaybackSession, SessionSettings};
use crate::visibility::{Movement, VisibilityTracker};

pub struct Engine {
    config: EngineConfig,
    registry: ScreenRegistry,
    sessions: RwLock<HashMap<SessionId, Arc<PlaybackSession>>>,
    tracker: VisibilityTracker,
    resolver: Arc<dyn SourceResolver>,
    opener: Arc<dyn SourceOpener>,
    quantizer: Quantizer,
    idle_index: u8,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("screens", &self.registry.len())
            .field("sessions", &self.sessions.read().len())
            .field("idle_index", &self.idle_index)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Engine decoding with FFmpeg and resolving local files first, then
    /// `yt-dlp` when it is installed.
    pub fn new(config: EngineConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let mapper = match &config.palette {
            Some(path) => PaletteMapper::install_from_file(path)?,
            None => PaletteMapper::global(),
        };

        let mut resolver = ChainResolver::new().with(LocalFileResolver::new());
        match YtDlpResolver::locate(config.download_dir()) {
            Ok(downloader) => resolver = resolver.with(downloader),
            Err(e) => info!(error = %e, "Downloads disabled"),
        }
        if !FfmpegOpener::is_available() {
            warn!("FFmpeg not found; videos cannot be opened until it is installed");
        }

        Ok(Self::with_parts(
            config,
            mapper,
            Arc::new(resolver),
            Arc::new(FfmpegOpener::new()),
        ))
    }

    /// Engine built from explicit parts. The config is used as given.
    pub fn with_parts(
        config: EngineConfig,
        mapper: Arc<PaletteMapper>,
        resolver: Arc<dyn SourceResolver>,
        opener: Arc<dyn SourceOpener>,
    ) -> Self {
        let idle_index = idle_index(&mapper, config.idle_index);
        Self {
            registry: ScreenRegistry::new(config.max_screen_cells),
            sessions: RwLock::new(HashMap::new()),
            tracker: VisibilityTracker::new(config.visibility_radius, config.observer_buffer),
            resolver,
            opener,
            quantizer: Quantizer::new(mapper, config.dither),
            idle_index,
            config,
        }
    }

    pub fn with_resolver(mut self, resolver: impl SourceResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_opener(mut self, opener: impl SourceOpener + 'static) -> Self {
        self.opener = Arc::new(opener);
        self
    }

    pub fn with_palette(mut self, mapper: Arc<PaletteMapper>) -> Self {
        self.idle_index = idle_index(&mapper, self.config.idle_index);
        self.quantizer = Quantizer::new(mapper, self.config.dither);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ScreenRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &VisibilityTracker {
        &self.tracker
    }

    pub fn quantizer(&self) -> &Quantizer {
        &self.quantizer
    }

    /// Palette index painted on screens without a session.
    pub fn idle_index(&self) -> u8 {
        self.idle_index
    }

    pub fn session(&self, id: SessionId) -> Result<Arc<PlaybackSession>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(EngineError::SessionNotFound(id))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    // ── Screens ─────────────────────────────────────────────────

    pub fn create_screen(&self, spec: ScreenSpec) -> Result<ScreenId> {
        Ok(self.registry.create(spec)?.id)
    }

    /// Delete a screen, stopping its session first.
    pub fn delete_screen(&self, id: ScreenId) -> Result<()> {
        let screen = self.registry.get(id)?;
        if let Some(session) = screen.session.and_then(|s| self.sessions.read().get(&s).cloned()) {
            if let Ok(outcome) = session.stop() {
                self.retire(&session, outcome);
            }
        }
        self.registry.remove(id)?;
        self.tracker.forget_screen(id);
        Ok(())
    }

    pub fn find_screen(&self, name: &str) -> Result<ScreenId> {
        Ok(self.registry.find_by_name(name)?.id)
    }

    pub fn list_screens(&self) -> Vec<ScreenSummary> {
        self.registry
            .list()
            .iter()
            .map(|screen| self.summarize(screen).0)
            .collect()
    }

    pub fn info(&self, id: ScreenId) -> Result<ScreenDetail> {
        let screen = self.registry.get(id)?;
        let (summary, session) = self.summarize(&screen);
        let status = session.map(|s| s.status());
        Ok(ScreenDetail {
            summary,
            source: status.as_ref().map(|s| s.source.clone()),
            position_ms: status.as_ref().map(|s| s.position.to_millis()),
            duration_ms: status
                .as_ref()
                .and_then(|s| s.duration)
                .map(RationalTime::to_millis),
            looping: status.as_ref().is_some_and(|s| s.options.looping),
            subscribers: self.tracker.subscriber_count(id),
            last_error: status.as_ref().and_then(|s| s.last_error.clone()),
            stats: status.map(|s| s.stats),
            last_session: screen.last_outcome.clone(),
        })
    }

    fn summarize(&self, screen: &Screen) -> (ScreenSummary, Option<Arc<PlaybackSession>>) {
        let session = screen
            .session
            .and_then(|id| self.sessions.read().get(&id).cloned());
        let summary = ScreenSummary {
            id: screen.id,
            name: screen.name.clone(),
            location: screen.location.clone(),
            width: screen.width,
            height: screen.height,
            facing: screen.facing,
            session: screen.session,
            state: session.as_ref().map(|s| s.state()),
        };
        (summary, session)
    }

    // ── Transport ───────────────────────────────────────────────

    /// Resolve `reference`, open it and start playing on `screen`. A
    /// download or open failure leaves no session behind.
    pub async fn play(&self, screen: ScreenId, reference: &str, options: PlayOptions) -> Result<SessionId> {
        let target = self.registry.get(screen)?;
        if target.session.is_some() {
            return Err(EngineError::ScreenBusy(screen));
        }

        let source = self.resolver.resolve(reference).await?;
        let session = Arc::new(PlaybackSession::new(
            screen,
            source.clone(),
            options,
            SessionSettings::from_config(&self.config, target.width, target.height),
        ));
        let id = session.id();
        self.registry.attach(screen, id)?;
        self.sessions.write().insert(id, Arc::clone(&session));
        info!(session = %id, screen = %target.label(), source = %source, "Loading");

        let opener = Arc::clone(&self.opener);
        let (width, height) = (target.width, target.height);
        let opened = tokio::task::spawn_blocking(move || opener.open(&source, width, height))
            .await
            .map_err(|e| EngineError::Resource(format!("open task failed: {e}")));
        let frames = match opened {
            Ok(Ok(frames)) => frames,
            Ok(Err(e)) => {
                self.discard(&session);
                warn!(session = %id, error = %e, "Cannot open source");
                return Err(e.into());
            }
            Err(e) => {
                self.discard(&session);
                return Err(e);
            }
        };

        if let Err(e) = session.start(frames, self.quantizer.clone()) {
            match &e {
                EngineError::Resource(reason) => {
                    if let Some(outcome) = session.fail(reason.clone()) {
                        self.retire(&session, outcome);
                    }
                }
                // Stopped while loading; `stop` already retired it.
                _ => self.discard(&session),
            }
            return Err(e);
        }
        Ok(id)
    }

    pub fn pause(&self, session: SessionId) -> Result<()> {
        self.session(session)?.pause()
    }

    pub fn resume(&self, session: SessionId) -> Result<()> {
        self.session(session)?.resume()
    }

    /// Returns the position playback actually moved to.
    pub fn seek(&self, session: SessionId, target: RationalTime) -> Result<RationalTime> {
        self.session(session)?.seek(target)
    }

    pub fn stop(&self, session: SessionId) -> Result<()> {
        let session = self.session(session)?;
        let outcome = session.stop()?;
        self.retire(&session, outcome);
        Ok(())
    }

    /// Stop every session.
    pub fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        for session in sessions {
            if let Ok(outcome) = session.stop() {
                self.retire(&session, outcome);
            }
        }
        info!("Engine shut down");
    }

    /// Drop a session that never started.
    fn discard(&self, session: &PlaybackSession) {
        let _ = session.stop();
        self.sessions.write().remove(&session.id());
        self.registry.detach(session.screen(), session.id(), None);
    }

    /// Forget an ended session and blank its screen.
    fn retire(&self, session: &PlaybackSession, outcome: SessionOutcome) {
        self.sessions.write().remove(&session.id());
        self.registry.detach(session.screen(), session.id(), Some(outcome));
        self.blank(session.screen());
    }

    fn blank(&self, screen: ScreenId) {
        let Ok(screen) = self.registry.get(screen) else {
            return;
        };
        let frame = FrameBuffer::filled(
            screen.width,
            screen.height,
            self.idle_index,
            RationalTime::ZERO,
            0,
        );
        let delivered = self
            .tracker
            .deliver(&DisplayEvent::full(screen.id, Arc::new(frame)), None);
        debug!(screen = %screen.id, observers = delivered, "Screen blanked");
    }

    // ── Scheduling ──────────────────────────────────────────────

    /// Advance every playing session to `now` and publish what is due.
    pub fn tick(&self, now: Instant) {
        let sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        for session in sessions {
            let Some(end) = session.tick(now, &self.tracker) else {
                continue;
            };
            match end {
                QueueEnd::EndOfStream if session.options().looping => match session.restart() {
                    Ok(true) => debug!(session = %session.id(), "Looping"),
                    Ok(false) => {}
                    Err(e) => {
                        if let Some(outcome) = session.fail(format!("cannot loop: {e}")) {
                            self.retire(&session, outcome);
                        }
                    }
                },
                end => {
                    if let Some(outcome) = session.finish(&end) {
                        self.retire(&session, outcome);
                    }
                }
            }
        }
    }

    /// Tick on a fixed interval of one publish period until the handle is
    /// aborted.
    pub fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let period = self.config.publish_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let engine = Arc::clone(&engine);
                if let Err(e) = tokio::task::spawn_blocking(move || engine.tick(Instant::now())).await {
                    error!(error = %e, "Tick failed");
                    break;
                }
            }
        })
    }

    // ── Observers ───────────────────────────────────────────────

    /// Register an observer. With a location it is subscribed to every
    /// screen in range right away.
    pub fn connect_observer(
        &self,
        location: Option<Location>,
    ) -> Result<(ObserverId, crossbeam_channel::Receiver<DisplayEvent>)> {
        let observer = ObserverId::new();
        let events = self.tracker.connect(observer, None);
        if let Some(location) = location {
            self.observer_moved(observer, location)?;
        }
        Ok((observer, events))
    }

    pub fn disconnect_observer(&self, observer: ObserverId) -> bool {
        self.tracker.disconnect(observer)
    }

    /// Subscribe explicitly. A screen with a session sends its current
    /// picture first.
    pub fn subscribe(&self, observer: ObserverId, screen: ScreenId) -> Result<bool> {
        let target = self.registry.get(screen)?;
        match target.session.and_then(|id| self.sessions.read().get(&id).cloned()) {
            Some(session) => {
                session.with_snapshot(|frame| self.tracker.subscribe(observer, screen, frame))
            }
            None => self.tracker.subscribe(observer, screen, None),
        }
    }

    pub fn unsubscribe(&self, observer: ObserverId, screen: ScreenId) -> bool {
        self.tracker.unsubscribe(observer, screen)
    }

    /// Track an observer's position: subscribe to screens that came into
    /// range, unsubscribe from those that left it.
    pub fn observer_moved(&self, observer: ObserverId, location: Location) -> Result<Movement> {
        let movement = self
            .tracker
            .update_position(observer, location, self.registry.centers())?;
        for screen in &movement.entered {
            if let Err(e) = self.subscribe(observer, *screen) {
                debug!(observer = %observer, screen = %screen, error = %e, "Skipped subscription");
            }
        }
        Ok(movement)
    }
}

/// `configured` if it names a palette entry, otherwise the entry closest
/// to black.
fn idle_index(mapper: &PaletteMapper, configured: u8) -> u8 {
    if (configured as usize) < mapper.palette().len() {
        configured
    } else {
        let fallback = mapper.nearest_index(Rgb::BLACK);
        warn!(configured, fallback, "Idle index outside the palette");
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use gridcast_color::Palette;
    use gridcast_core::{DownloadError, Facing, FrameRate, RgbFrame, SourceError};
    use gridcast_media::{PassthroughResolver, SyntheticClip, SyntheticOpener, VideoSource};
    use std::time::Duration;

    use crate::session::PlaybackState;

    struct Offline;

    impl SourceResolver for Offline {
        fn resolve<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, std::result::Result<VideoSource, DownloadError>> {
            Box::pin(async move { Err(DownloadError::Unavailable(format!("offline: {reference}"))) })
        }
    }

    fn engine(opener: SyntheticOpener) -> Engine {
        let config = EngineConfig {
            idle_index: 0,
            dither: gridcast_color::DitherConfig::OFF,
            ..Default::default()
        };
        let mapper = Arc::new(PaletteMapper::new(
            Palette::from_colors(&[Rgb::BLACK, Rgb::WHITE]).unwrap(),
        ));
        Engine::with_parts(config, mapper, Arc::new(PassthroughResolver), Arc::new(opener))
    }

    fn spec() -> ScreenSpec {
        ScreenSpec::new(Location::new("world", 0.0, 64.0, 0.0), 4, 4, Facing::North)
    }

    fn white(seconds: i64) -> SyntheticClip {
        SyntheticClip::solid(4, 4, Rgb::WHITE, RationalTime::new(seconds, 1), FrameRate::FPS_20)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[tokio::test]
    async fn test_missing_source_leaves_no_session() {
        let engine = engine(SyntheticOpener::new());
        let screen = engine.create_screen(spec()).unwrap();
        let err = engine
            .play(screen, "missing.mp4", PlayOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Source(SourceError::NotFound(_))));
        assert_eq!(engine.session_count(), 0);
        assert!(engine.registry().get(screen).unwrap().session.is_none());
    }

    #[tokio::test]
    async fn test_download_error_surfaces_verbatim() {
        let engine = engine(SyntheticOpener::new()).with_resolver(Offline);
        let screen = engine.create_screen(spec()).unwrap();
        let err = engine
            .play(screen, "some query", PlayOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "download");
        assert_eq!(err.to_string(), "downloader unavailable: offline: some query");
        assert_eq!(engine.session_count(), 0);
    }

    #[tokio::test]
    async fn test_one_session_per_screen() {
        let engine = engine(SyntheticOpener::new().with_clip("a.mp4", white(10)));
        let screen = engine.create_screen(spec()).unwrap();
        let session = engine.play(screen, "a.mp4", PlayOptions::default()).await.unwrap();
        let err = engine
            .play(screen, "a.mp4", PlayOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "screen_busy");

        let listed = engine.list_screens();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session, Some(session));
        assert_eq!(listed[0].state, Some(PlaybackState::Playing));
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_stop_blanks_screen_and_records_outcome() {
        let opener = SyntheticOpener::new().with_clip("a.mp4", white(10));
        let engine = engine(opener.clone());
        let screen = engine.create_screen(spec()).unwrap();
        let (observer, events) = engine.connect_observer(None).unwrap();
        engine.subscribe(observer, screen).unwrap();

        let session = engine.play(screen, "a.mp4", PlayOptions::default()).await.unwrap();
        engine.stop(session).unwrap();
        assert_eq!(opener.live_sources(), 0);

        let blank = events.try_recv().unwrap();
        assert!(blank.is_full());
        assert_eq!(blank.cell_count(), 16);

        let detail = engine.info(screen).unwrap();
        assert_eq!(detail.summary.session, None);
        let last = detail.last_session.unwrap();
        assert_eq!(last.session, session);
        assert_eq!(last.state, PlaybackState::Stopped);
        assert_eq!(engine.pause(session).unwrap_err().kind(), "session_not_found");
    }

    #[tokio::test]
    async fn test_delete_screen_stops_session() {
        let opener = SyntheticOpener::new().with_clip("a.mp4", white(10));
        let engine = engine(opener.clone());
        let screen = engine.create_screen(spec()).unwrap();
        engine.play(screen, "a.mp4", PlayOptions::default()).await.unwrap();

        engine.delete_screen(screen).unwrap();
        assert_eq!(engine.session_count(), 0);
        assert_eq!(opener.live_sources(), 0);
        assert_eq!(engine.info(screen).unwrap_err().kind(), "screen_not_found");
    }

    #[tokio::test]
    async fn test_moving_into_range_sends_snapshot() {
        let frames = vec![RgbFrame::solid(4, 4, Rgb::WHITE, RationalTime::ZERO)];
        let opener = SyntheticOpener::new()
            .with_clip("a.mp4", SyntheticClip::cycling(frames, 200, FrameRate::FPS_20));
        let engine = engine(opener);
        let screen = engine.create_screen(spec()).unwrap();
        let session = engine.play(screen, "a.mp4", PlayOptions::default()).await.unwrap();
        let queue = Arc::clone(engine.session(session).unwrap().queue());
        assert!(wait_for(|| !queue.is_empty()));
        engine.tick(Instant::now());

        let (observer, events) = engine
            .connect_observer(Some(Location::new("world", 500.0, 64.0, 0.0)))
            .unwrap();
        assert!(events.try_recv().is_err());

        let moved = engine
            .observer_moved(observer, Location::new("world", 2.0, 64.0, 0.0))
            .unwrap();
        assert_eq!(moved.entered, vec![screen]);
        let snapshot = events.try_recv().unwrap();
        assert!(snapshot.is_full());
        assert_eq!(snapshot.seq(), 0);
        assert_eq!(engine.info(screen).unwrap().subscribers, 1);
        engine.shutdown();
    }

    #[test]
    fn test_idle_index_falls_back_inside_palette() {
        let mapper = PaletteMapper::new(Palette::from_colors(&[Rgb::WHITE, Rgb::BLACK]).unwrap());
        assert_eq!(idle_index(&mapper, 0), 0);
        assert_eq!(idle_index(&mapper, 119), 1);
    }
}
