//! Transport commands as data, for command layers that queue or forward
//! them.

use gridcast_core::{EngineError, RationalTime, Result, ScreenId, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::session::PlayOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TransportCommand {
    Play {
        screen: ScreenId,
        reference: String,
        #[serde(default)]
        options: PlayOptions,
    },
    Pause {
        session: SessionId,
    },
    Resume {
        session: SessionId,
    },
    Stop {
        session: SessionId,
    },
    Seek {
        session: SessionId,
        target: RationalTime,
    },
}

impl TransportCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Play { .. } => "play",
            Self::Pause { .. } => "pause",
            Self::Resume { .. } => "resume",
            Self::Stop { .. } => "stop",
            Self::Seek { .. } => "seek",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Started { session: SessionId },
    Done,
    /// Where a seek actually landed
    Repositioned { position: RationalTime },
}

impl Engine {
    /// Run one command. Commands that wait on a decode worker run on the
    /// blocking pool.
    pub async fn dispatch(self: &Arc<Self>, command: TransportCommand) -> Result<CommandOutcome> {
        let name = command.name();
        debug!(command = name, "Dispatching");
        let result = match command {
            TransportCommand::Play {
                screen,
                reference,
                options,
            } => self
                .play(screen, &reference, options)
                .await
                .map(|session| CommandOutcome::Started { session }),
            TransportCommand::Pause { session } => self
                .blocking(name, move |engine| engine.pause(session))
                .await
                .map(|()| CommandOutcome::Done),
            TransportCommand::Resume { session } => self
                .blocking(name, move |engine| engine.resume(session))
                .await
                .map(|()| CommandOutcome::Done),
            TransportCommand::Stop { session } => self
                .blocking(name, move |engine| engine.stop(session))
                .await
                .map(|()| CommandOutcome::Done),
            TransportCommand::Seek { session, target } => self
                .blocking(name, move |engine| engine.seek(session, target))
                .await
                .map(|position| CommandOutcome::Repositioned { position }),
        };
        if let Err(e) = &result {
            warn!(command = name, kind = e.kind(), error = %e, "Command failed");
        }
        result
    }

    async fn blocking<T, F>(self: &Arc<Self>, name: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> Result<T> + Send + 'static,
    {
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| EngineError::Resource(format!("{name} did not complete: {e}")))?
    }
}
