//! Gridcast Engine - Real-time playback of videos onto palette grids.
//!
//! - `Engine`: screens, sessions and observers behind one command surface
//! - `PlaybackSession`: transport state machine and position clock
//! - `DecodePipeline`: per-session decode worker feeding a bounded `FrameQueue`
//! - `DeltaPublisher`: full/delta frame selection and rate throttling
//! - `VisibilityTracker`: which observers receive which screens

pub mod command;
pub mod config;
pub mod engine;
pub mod event;
pub mod pipeline;
pub mod publisher;
pub mod queue;
pub mod registry;
pub mod session;
pub mod stats;
pub mod visibility;

pub use command::{CommandOutcome, TransportCommand};
pub use config::{ConfigError, EngineConfig};
pub use engine::Engine;
pub use event::DisplayEvent;
pub use pipeline::{DecodePipeline, PipelineSettings};
pub use publisher::DeltaPublisher;
pub use queue::{FrameQueue, PushError, QueueEnd};
pub use registry::{
    Screen, ScreenDetail, ScreenRegistry, ScreenSpec, ScreenSummary, SessionOutcome,
};
pub use session::{PlayOptions, PlaybackSession, PlaybackState, SessionSettings, SessionStatus};
pub use stats::{SessionStats, StatsSnapshot};
pub use visibility::{Movement, VisibilityTracker};
