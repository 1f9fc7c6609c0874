//! Observer fan-out: late joins, lagging receivers and visibility range.

use gridcast_core::{CellGrid, Location};
use gridcast_engine::{EngineConfig, PlayOptions};
use gridcast_media::SyntheticOpener;

use crate::support::{self, drain, wait_for, Clock};

#[tokio::test]
async fn late_subscriber_starts_from_a_full_frame() {
    let opener = SyntheticOpener::new().with_clip("dot.mp4", support::walking_dot(400));
    let engine = support::engine(opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (early, early_events) = engine.connect_observer(None).unwrap();
    engine.subscribe(early, screen).unwrap();
    let id = engine.play(screen, "dot.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(id).unwrap();

    let mut clock = Clock::start();
    let mut early_grid = CellGrid::default();
    for _ in 0..5 {
        assert!(wait_for(|| !session.queue().is_empty()));
        clock.tick(&engine);
    }
    for event in drain(&early_events) {
        assert!(event.apply_to(&mut early_grid));
    }

    let (late, late_events) = engine.connect_observer(None).unwrap();
    assert!(engine.subscribe(late, screen).unwrap());
    let snapshot = late_events.try_recv().unwrap();
    assert!(snapshot.is_full());
    let mut late_grid = CellGrid::default();
    assert!(snapshot.apply_to(&mut late_grid));
    assert_eq!(late_grid, early_grid);

    for _ in 0..5 {
        assert!(wait_for(|| !session.queue().is_empty()));
        clock.tick(&engine);
        for event in drain(&early_events) {
            assert!(event.apply_to(&mut early_grid));
        }
        for event in drain(&late_events) {
            assert!(event.apply_to(&mut late_grid));
        }
        assert_eq!(late_grid, early_grid);
    }
    engine.shutdown();
}

#[tokio::test]
async fn lagging_observer_is_resynced_without_stalling_others() {
    let config = EngineConfig {
        observer_buffer: 2,
        ..support::config()
    };
    let opener = SyntheticOpener::new().with_clip("dot.mp4", support::walking_dot(400));
    let engine = support::engine_with(config, opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (slow, slow_events) = engine.connect_observer(None).unwrap();
    let (fast, fast_events) = engine.connect_observer(None).unwrap();
    engine.subscribe(slow, screen).unwrap();
    engine.subscribe(fast, screen).unwrap();
    let id = engine.play(screen, "dot.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(id).unwrap();

    let mut clock = Clock::start();
    let mut fast_count = 0;
    for _ in 0..6 {
        assert!(wait_for(|| !session.queue().is_empty()));
        clock.tick(&engine);
        fast_count += drain(&fast_events).len();
    }
    assert_eq!(fast_count, 6);
    assert_eq!(slow_events.len(), 2);

    let mut slow_grid = CellGrid::default();
    for event in drain(&slow_events) {
        assert!(event.apply_to(&mut slow_grid));
    }
    assert!(wait_for(|| !session.queue().is_empty()));
    clock.tick(&engine);
    let resync = slow_events.try_recv().unwrap();
    assert!(resync.is_full());
    assert!(resync.apply_to(&mut slow_grid));
    let current = session.with_snapshot(|frame| frame.cloned()).unwrap();
    assert_eq!(slow_grid.cells(), current.cells());
    engine.shutdown();
}

#[tokio::test]
async fn observers_follow_visibility_range() {
    let opener = SyntheticOpener::new().with_clip("dot.mp4", support::walking_dot(400));
    let engine = support::engine(opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let id = engine.play(screen, "dot.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(id).unwrap();

    let mut clock = Clock::start();
    assert!(wait_for(|| !session.queue().is_empty()));
    clock.tick(&engine);

    let far = Location::new("world", 1000.0, 64.0, 0.0);
    let (observer, events) = engine.connect_observer(Some(far.clone())).unwrap();
    assert!(events.try_recv().is_err());

    let moved = engine
        .observer_moved(observer, Location::new("world", 3.0, 60.0, 0.0))
        .unwrap();
    assert_eq!(moved.entered, vec![screen]);
    assert!(events.try_recv().unwrap().is_full());

    // Same world name matters: another dimension is never in range.
    let moved = engine
        .observer_moved(observer, Location::new("nether", 0.0, 64.0, 0.0))
        .unwrap();
    assert_eq!(moved.left, vec![screen]);
    for _ in 0..3 {
        assert!(wait_for(|| !session.queue().is_empty()));
        clock.tick(&engine);
    }
    assert!(events.try_recv().is_err());
    assert_eq!(engine.info(screen).unwrap().subscribers, 0);

    assert!(engine.observer_moved(observer, far).unwrap().entered.is_empty());
    assert!(engine.disconnect_observer(observer));
    engine.shutdown();
}

#[tokio::test]
async fn dropped_receiver_is_disconnected_on_next_publish() {
    let opener = SyntheticOpener::new().with_clip("dot.mp4", support::walking_dot(400));
    let engine = support::engine(opener);
    let screen = engine.create_screen(support::screen(4, 4)).unwrap();
    let (observer, events) = engine.connect_observer(None).unwrap();
    engine.subscribe(observer, screen).unwrap();
    drop(events);

    let id = engine.play(screen, "dot.mp4", PlayOptions::default()).await.unwrap();
    let session = engine.session(id).unwrap();
    assert!(wait_for(|| !session.queue().is_empty()));
    Clock::start().tick(&engine);

    assert!(!engine.tracker().is_connected(observer));
    assert!(!engine.disconnect_observer(observer));
    engine.shutdown();
}
