//! Transport commands against a running engine.

use gridcast_core::{FrameRate, RationalTime};
use gridcast_engine::{CommandOutcome, PlayOptions, PlaybackState, TransportCommand};
use gridcast_media::{SyntheticClip, SyntheticOpener};
use std::sync::Arc;
use std::time::Duration;

use crate::support::{self, drain, indexed, wait_for, Clock};

#[tokio::test]
async fn pause_then_resume_skips_and_repeats_nothing() {
    let opener = SyntheticOpener::new().with_clip("dot.mp4", support::walking_dot(400));
    let engine = support::engine(opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (observer, events) = engine.connect_observer(None).unwrap();
    engine.subscribe(observer, screen).unwrap();
    let id = engine.play(screen, "dot.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(id).unwrap();
    assert!(wait_for(|| session.queue().len() == 4));

    let mut clock = Clock::start();
    for _ in 0..3 {
        clock.tick(&engine);
    }
    let position = session.position();

    engine.pause(id).unwrap();
    // Ticks while paused neither move the clock nor publish.
    clock.advance(Duration::from_secs(2));
    clock.tick(&engine);
    assert_eq!(session.position(), position);
    engine.resume(id).unwrap();
    assert_eq!(session.position(), position);

    for _ in 0..3 {
        assert!(wait_for(|| !session.queue().is_empty()));
        clock.tick(&engine);
    }
    let seqs: Vec<u64> = drain(&events).iter().map(|e| e.seq()).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    assert_eq!(session.state(), PlaybackState::Playing);
    engine.shutdown();
}

#[tokio::test]
async fn sequence_numbers_strictly_increase_while_playing() {
    let opener = SyntheticOpener::new().with_clip("dot.mp4", support::walking_dot(400));
    let engine = support::engine(opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (observer, events) = engine.connect_observer(None).unwrap();
    engine.subscribe(observer, screen).unwrap();
    let id = engine.play(screen, "dot.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(id).unwrap();

    let mut clock = Clock::start();
    for _ in 0..30 {
        assert!(wait_for(|| !session.queue().is_empty()));
        clock.tick(&engine);
    }
    let seqs: Vec<u64> = drain(&events).iter().map(|e| e.seq()).collect();
    assert!(!seqs.is_empty());
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "{seqs:?}");
    engine.shutdown();
}

#[tokio::test]
async fn looping_restarts_from_zero_with_a_full_frame() {
    let blank = [0u8; 16];
    let mut marked = blank;
    marked[5] = 1;
    let clip = SyntheticClip::scripted(
        vec![indexed(4, 4, &blank), indexed(4, 4, &marked)],
        FrameRate::FPS_20,
    );
    let opener = SyntheticOpener::new().with_clip("short.mp4", clip);
    let engine = support::engine(opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (observer, events) = engine.connect_observer(None).unwrap();
    engine.subscribe(observer, screen).unwrap();
    let id = engine
        .play(screen, "short.mp4", PlayOptions::default().looping(true))
        .await
        .unwrap();
    let session = engine.session(id).unwrap();
    assert!(wait_for(|| session.queue().len() == 2));

    let mut clock = Clock::start();
    let mut seen = Vec::new();
    assert!(wait_for(|| {
        clock.tick(&engine);
        seen.extend(drain(&events));
        seen.iter().filter(|e| e.is_full()).count() == 2
    }));

    // Sequence numbers restart with the loop.
    let second_full = seen.iter().filter(|e| e.is_full()).nth(1).unwrap();
    assert!(second_full.seq() <= 1);
    assert_eq!(session.state(), PlaybackState::Playing);
    assert_eq!(engine.session_count(), 1);
    engine.shutdown();
}

#[tokio::test]
async fn dispatch_runs_each_transport_command() {
    let opener = SyntheticOpener::new().with_clip("ten.mp4", support::white(10));
    let engine = Arc::new(support::engine(opener.clone()));
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();

    let started = engine
        .dispatch(TransportCommand::Play {
            screen,
            reference: "ten.mp4".into(),
            options: PlayOptions::default(),
        })
        .await
        .unwrap();
    let CommandOutcome::Started { session } = started else {
        panic!("expected a session, got {started:?}");
    };

    assert_eq!(
        engine.dispatch(TransportCommand::Pause { session }).await.unwrap(),
        CommandOutcome::Done
    );
    assert_eq!(engine.session(session).unwrap().state(), PlaybackState::Paused);

    let moved = engine
        .dispatch(TransportCommand::Seek {
            session,
            target: RationalTime::new(4, 1),
        })
        .await
        .unwrap();
    assert_eq!(
        moved,
        CommandOutcome::Repositioned {
            position: RationalTime::new(4, 1)
        }
    );
    assert_eq!(engine.session(session).unwrap().state(), PlaybackState::Paused);

    engine.dispatch(TransportCommand::Stop { session }).await.unwrap();
    assert_eq!(opener.live_sources(), 0);
    let err = engine
        .dispatch(TransportCommand::Resume { session })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "session_not_found");
}
