//! End-to-end playback: screen creation through to what an observer sees.

use gridcast_core::{CellChange, CellGrid, EngineError, FrameRate, RationalTime, SeekError};
use gridcast_engine::{DisplayEvent, PlayOptions, PlaybackState};
use gridcast_media::{SyntheticClip, SyntheticOpener};
use std::sync::Arc;

use crate::support::{self, drain, indexed, wait_for, Clock};

// ── Three-frame scenario ───────────────────────────────────────

#[tokio::test]
async fn three_frames_publish_full_then_single_cell_deltas() {
    let blank = [0u8; 16];
    let mut marked = blank;
    marked[0] = 1;
    let clip = SyntheticClip::scripted(
        vec![indexed(4, 4, &blank), indexed(4, 4, &marked), indexed(4, 4, &blank)],
        FrameRate::FPS_20,
    );
    let opener = SyntheticOpener::new().with_clip("three.mp4", clip);
    let engine = support::engine(opener.clone());
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (observer, events) = engine.connect_observer(None).unwrap();
    engine.subscribe(observer, screen).unwrap();

    let session = engine
        .play(screen, "three.mp4", PlayOptions::default())
        .await
        .unwrap();
    let queue = Arc::clone(engine.session(session).unwrap().queue());
    assert!(wait_for(|| queue.len() == 3));

    let mut clock = Clock::start();
    for _ in 0..3 {
        clock.tick(&engine);
    }
    let end = clock.now();
    assert!(wait_for(|| {
        engine.tick(end);
        engine.session_count() == 0
    }));

    let got = drain(&events);
    assert_eq!(got.len(), 4, "three frames and the blank screen: {got:?}");

    match &got[0] {
        DisplayEvent::Full { frame, .. } => {
            assert_eq!(frame.seq(), 0);
            assert_eq!(frame.cells(), &blank);
        }
        other => panic!("expected full frame, got {other:?}"),
    }
    match &got[1] {
        DisplayEvent::Delta { seq, changes, .. } => {
            assert_eq!(*seq, 1);
            assert_eq!(&**changes, &[CellChange { x: 0, y: 0, index: 1 }]);
        }
        other => panic!("expected delta, got {other:?}"),
    }
    match &got[2] {
        DisplayEvent::Delta { seq, changes, .. } => {
            assert_eq!(*seq, 2);
            assert_eq!(&**changes, &[CellChange { x: 0, y: 0, index: 0 }]);
        }
        other => panic!("expected delta, got {other:?}"),
    }

    // End of stream without looping: stopped, screen blanked to the idle index.
    assert!(got[3].is_full());
    let mut mirror = CellGrid::default();
    assert!(got[3].apply_to(&mut mirror));
    assert!(mirror.cells().iter().all(|&c| c == 0));

    let detail = engine.info(screen).unwrap();
    assert_eq!(detail.summary.session, None);
    let outcome = detail.last_session.unwrap();
    assert_eq!(outcome.state, PlaybackState::Stopped);
    assert_eq!(outcome.stats.full_frames, 1);
    assert_eq!(outcome.stats.delta_frames, 2);
    assert_eq!(opener.live_sources(), 0);
}

#[tokio::test]
async fn replaying_events_reconstructs_every_published_frame() {
    let opener = SyntheticOpener::new().with_clip("dot.mp4", support::walking_dot(400));
    let engine = support::engine(opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (observer, events) = engine.connect_observer(None).unwrap();
    engine.subscribe(observer, screen).unwrap();
    let session = engine.play(screen, "dot.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(session).unwrap();

    let mut clock = Clock::start();
    let mut mirror = CellGrid::default();
    for _ in 0..20 {
        assert!(wait_for(|| !session.queue().is_empty()));
        clock.tick(&engine);
        for event in drain(&events) {
            assert!(event.apply_to(&mut mirror));
        }
        let published = session.with_snapshot(|frame| frame.cloned()).unwrap();
        assert_eq!(mirror.cells(), published.cells());
    }
    engine.shutdown();
}

// ── Seeking ────────────────────────────────────────────────────

#[tokio::test]
async fn seek_beyond_duration_fails_and_leaves_state_unchanged() {
    let opener = SyntheticOpener::new().with_clip("ten.mp4", support::white(10));
    let engine = support::engine(opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let id = engine.play(screen, "ten.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(id).unwrap();

    let err = engine.seek(id, RationalTime::new(9999, 1)).unwrap_err();
    assert!(matches!(err, EngineError::Seek(SeekError::OutOfRange { .. })));
    assert_eq!(err.kind(), "seek");
    assert_eq!(session.state(), PlaybackState::Playing);
    assert_eq!(session.position(), RationalTime::ZERO);

    engine.pause(id).unwrap();
    assert!(engine.seek(id, RationalTime::new(-1, 1)).is_err());
    assert_eq!(session.state(), PlaybackState::Paused);
    engine.shutdown();
}

#[tokio::test]
async fn seek_lands_on_keyframe_at_or_before_target() {
    let clip = support::walking_dot(400).keyframe_interval(10);
    let opener = SyntheticOpener::new().with_clip("gop.mp4", clip);
    let engine = support::engine(opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (observer, events) = engine.connect_observer(None).unwrap();
    engine.subscribe(observer, screen).unwrap();
    let id = engine.play(screen, "gop.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(id).unwrap();

    let mut clock = Clock::start();
    for _ in 0..3 {
        assert!(wait_for(|| !session.queue().is_empty()));
        clock.tick(&engine);
    }
    drain(&events);

    let target = RationalTime::new(27, 20);
    let actual = engine.seek(id, target).unwrap();
    assert_eq!(actual, RationalTime::new(1, 1));
    assert!(actual <= target);
    assert_eq!(session.state(), PlaybackState::Playing);

    assert!(wait_for(|| !session.queue().is_empty()));
    clock.tick(&engine);
    let after = drain(&events);
    assert_eq!(after.len(), 1);
    match &after[0] {
        DisplayEvent::Full { frame, .. } => {
            assert_eq!(frame.seq(), 0);
            assert_eq!(frame.timestamp(), actual);
        }
        other => panic!("expected full frame after seek, got {other:?}"),
    }
    engine.shutdown();
}
