//! Failure paths: bad sources, corrupt frames and a decoder that outruns
//! playback.

use gridcast_core::{CellGrid, EngineError, SourceError};
use gridcast_engine::{EngineConfig, PlayOptions, PlaybackState};
use gridcast_media::SyntheticOpener;
use std::thread;
use std::time::{Duration, Instant};

use crate::support::{self, drain, wait_for, Clock};

// ── Sources ────────────────────────────────────────────────────

#[tokio::test]
async fn missing_source_fails_without_a_session() {
    let opener = SyntheticOpener::new().with_clip("dot.mp4", support::walking_dot(40));
    let engine = support::engine(opener.clone());
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();

    let err = engine
        .play(screen, "missing.mp4", PlayOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Source(SourceError::NotFound(_))));
    assert_eq!(err.kind(), "source");
    assert_eq!(engine.session_count(), 0);
    assert_eq!(engine.info(screen).unwrap().summary.session, None);

    // The screen is free for the next attempt.
    engine.play(screen, "dot.mp4", PlayOptions::default()).await.unwrap();
    assert_eq!(opener.live_sources(), 1);
    engine.shutdown();
}

#[tokio::test]
async fn unsupported_codec_is_a_source_error() {
    let clip = support::white(2).fail_open(SourceError::UnsupportedCodec("theora".into()));
    let opener = SyntheticOpener::new().with_clip("old.ogv", clip);
    let engine = support::engine(opener.clone());
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();

    let err = engine
        .play(screen, "old.ogv", PlayOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "unsupported codec: theora");
    assert_eq!(engine.session_count(), 0);
    assert_eq!(opener.open_count(), 0);
}

// ── Decoding ───────────────────────────────────────────────────

#[tokio::test]
async fn corrupt_frames_within_budget_are_skipped() {
    let clip = support::walking_dot(400).corrupt_frames(2..5);
    let opener = SyntheticOpener::new().with_clip("dot.mp4", clip);
    let engine = support::engine(opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (observer, events) = engine.connect_observer(None).unwrap();
    engine.subscribe(observer, screen).unwrap();
    let id = engine.play(screen, "dot.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(id).unwrap();

    let mut clock = Clock::start();
    let mut mirror = CellGrid::default();
    for _ in 0..10 {
        assert!(wait_for(|| !session.queue().is_empty()));
        clock.tick(&engine);
        for event in drain(&events) {
            assert!(event.apply_to(&mut mirror));
        }
    }

    assert_eq!(session.state(), PlaybackState::Playing);
    assert_eq!(session.stats().decode_failures, 3);
    assert_eq!(session.last_error(), None);
    let published = session.with_snapshot(|frame| frame.cloned()).unwrap();
    assert_eq!(mirror.cells(), published.cells());
    engine.shutdown();
}

#[tokio::test]
async fn exceeding_failure_budget_stops_with_error() {
    let config = EngineConfig {
        max_consecutive_decode_failures: 2,
        ..support::config()
    };
    let clip = support::walking_dot(400).corrupt_frames(1..50);
    let opener = SyntheticOpener::new().with_clip("bad.mp4", clip);
    let engine = support::engine_with(config, opener.clone());
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (observer, events) = engine.connect_observer(None).unwrap();
    engine.subscribe(observer, screen).unwrap();
    engine.play(screen, "bad.mp4", PlayOptions::default()).await.unwrap();

    let mut clock = Clock::start();
    assert!(wait_for(|| {
        clock.tick(&engine);
        engine.session_count() == 0
    }));

    let outcome = engine.info(screen).unwrap().last_session.unwrap();
    assert_eq!(outcome.state, PlaybackState::Error);
    let error = outcome.error.unwrap();
    assert!(error.contains("3 consecutive decode failures"), "{error}");
    assert_eq!(outcome.stats.decode_failures, 3);
    assert_eq!(opener.live_sources(), 0);

    // The one good frame, then the idle screen.
    let got = drain(&events);
    assert_eq!(got.len(), 2, "{got:?}");
    assert!(got.iter().all(|e| e.is_full()));
    let mut mirror = CellGrid::default();
    assert!(got[1].apply_to(&mut mirror));
    assert!(mirror.cells().iter().all(|&c| c == 0));
}

// ── Backpressure ───────────────────────────────────────────────

#[tokio::test]
async fn decoder_ten_times_faster_than_playback_stays_bounded() {
    // 5 ms per decode against a 50 ms frame period.
    let clip = support::walking_dot(400).decode_delay(Duration::from_millis(5));
    let opener = SyntheticOpener::new().with_clip("fast.mp4", clip);
    let engine = support::engine(opener);
    let capacity = engine.config().queue_capacity;
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let id = engine.play(screen, "fast.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(id).unwrap();

    // Unconsumed for 300 ms: room for ~60 decodes, but the queue holds four.
    let deadline = Instant::now() + Duration::from_millis(300);
    while Instant::now() < deadline {
        assert!(session.queue().len() <= capacity);
        thread::sleep(Duration::from_millis(3));
    }
    assert_eq!(session.queue().len(), capacity);
    assert!(session.stats().frames_decoded <= capacity as u64 + 1);

    let mut clock = Clock::start();
    let ticks = 20;
    for _ in 0..ticks {
        assert!(wait_for(|| session.queue().len() == capacity));
        clock.tick(&engine);
        assert!(session.queue().len() <= capacity);
    }

    let stats = session.stats();
    assert!(stats.queue_high_water <= capacity as u64);
    assert!(stats.frames_decoded <= ticks + capacity as u64 + 1);
    assert_eq!(stats.frames_dropped, 0);
    engine.shutdown();
}
