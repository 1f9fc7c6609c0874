//! Error types for gridcast.
//!
//! Every failure kind the command layer can observe has its own type so a
//! caller can tell "video not found" apart from "seek target out of range".

use std::path::PathBuf;

use thiserror::Error;

use crate::id::{ObserverId, ScreenId, SessionId};
use crate::time::RationalTime;

/// A video source could not be opened.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("video not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("video unreadable: {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("no video stream in {0}")]
    NoVideoStream(String),

    #[error("decoder resources exhausted: {0}")]
    Exhausted(String),
}

/// A single frame could not be decoded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("corrupt frame {frame}: {reason}")]
    Corrupt { frame: u64, reason: String },

    #[error("frame size mismatch: expected {expected} bytes, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("decoder terminated: {0}")]
    Terminated(String),
}

/// A reposition request was rejected. The session keeps its prior state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeekError {
    #[error("seek target {target} out of range (duration {duration})")]
    OutOfRange {
        target: RationalTime,
        duration: RationalTime,
    },

    #[error("decoder cannot reposition: {0}")]
    Reposition(String),

    #[error("seek did not complete within {0} ms")]
    Timeout(u64),
}

/// The download subsystem failed to resolve a video reference.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DownloadError {
    #[error("nothing matches '{0}'")]
    NotFound(String),

    #[error("downloader unavailable: {0}")]
    Unavailable(String),

    #[error("download of '{reference}' failed: {reason}")]
    Failed { reference: String, reason: String },
}

/// Errors returned by engine operations invoked by the command layer.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Seek(#[from] SeekError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("screen not found: {0}")]
    ScreenNotFound(ScreenId),

    #[error("no screen named '{0}'")]
    ScreenNameNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("observer not connected: {0}")]
    ObserverNotFound(ObserverId),

    #[error("cannot {command} while {state}")]
    InvalidTransition {
        command: &'static str,
        state: &'static str,
    },

    #[error("screen {0} already has an active session")]
    ScreenBusy(ScreenId),

    #[error("invalid screen geometry: {0}")]
    InvalidGeometry(String),

    #[error("a screen named '{0}' already exists")]
    DuplicateName(String),

    #[error("resource exhausted: {0}")]
    Resource(String),
}

impl EngineError {
    /// Stable, machine-readable error kind for the command layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::Seek(_) => "seek",
            Self::Download(_) => "download",
            Self::ScreenNotFound(_) | Self::ScreenNameNotFound(_) => "screen_not_found",
            Self::SessionNotFound(_) => "session_not_found",
            Self::ObserverNotFound(_) => "observer_not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ScreenBusy(_) => "screen_busy",
            Self::InvalidGeometry(_) => "invalid_geometry",
            Self::DuplicateName(_) => "duplicate_name",
            Self::Resource(_) => "resource",
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
