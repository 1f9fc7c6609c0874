//! Shared fixtures: a two-color palette (index 0 black, index 1 white),
//! synthetic clips built from index grids and a deterministic clock.

use crossbeam_channel::Receiver;
use gridcast_color::{DitherConfig, Palette, PaletteMapper};
use gridcast_core::{Facing, FrameRate, Location, RationalTime, Rgb, RgbFrame};
use gridcast_engine::{DisplayEvent, Engine, EngineConfig, ScreenSpec};
use gridcast_media::{PassthroughResolver, SyntheticClip, SyntheticOpener};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// One frame period at 20 fps, also the default publish interval.
pub const FRAME: Duration = Duration::from_millis(50);

pub fn config() -> EngineConfig {
    EngineConfig {
        idle_index: 0,
        dither: DitherConfig::OFF,
        ..Default::default()
    }
}

pub fn engine(opener: SyntheticOpener) -> Engine {
    engine_with(config(), opener)
}

pub fn engine_with(config: EngineConfig, opener: SyntheticOpener) -> Engine {
    let mapper = Arc::new(PaletteMapper::new(
        Palette::from_colors(&[Rgb::BLACK, Rgb::WHITE]).unwrap(),
    ));
    Engine::with_parts(config, mapper, Arc::new(PassthroughResolver), Arc::new(opener))
}

pub fn screen(width: u32, height: u32) -> ScreenSpec {
    ScreenSpec::new(Location::new("world", 0.0, 64.0, 0.0), width, height, Facing::North)
}

/// An RGB frame whose pixels quantize to `cells`.
pub fn indexed(width: u32, height: u32, cells: &[u8]) -> RgbFrame {
    let mut frame = RgbFrame::solid(width, height, Rgb::BLACK, RationalTime::ZERO);
    for (i, &cell) in cells.iter().enumerate() {
        if cell != 0 {
            *frame.pixel_mut(i as u32 % width, i as u32 / width) = Rgb::WHITE;
        }
    }
    frame
}

/// A white dot walking along the top row of a 4x4 grid; consecutive
/// frames always differ in two cells.
pub fn walking_dot(frame_count: u64) -> SyntheticClip {
    let frames = (0..4)
        .map(|x| {
            let mut cells = [0u8; 16];
            cells[x] = 1;
            indexed(4, 4, &cells)
        })
        .collect();
    SyntheticClip::cycling(frames, frame_count, FrameRate::FPS_20)
}

pub fn white(seconds: i64) -> SyntheticClip {
    SyntheticClip::solid(4, 4, Rgb::WHITE, RationalTime::new(seconds, 1), FrameRate::FPS_20)
}

pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

pub fn drain(events: &Receiver<DisplayEvent>) -> Vec<DisplayEvent> {
    events.try_iter().collect()
}

/// Test-driven tick times, one frame period apart.
pub struct Clock {
    now: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Self { now: Instant::now() }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn advance(&mut self, by: Duration) -> Instant {
        self.now += by;
        self.now
    }

    /// Tick `engine` at the current time, then move one frame on.
    pub fn tick(&mut self, engine: &Engine) {
        engine.tick(self.now);
        self.now += FRAME;
    }
}
