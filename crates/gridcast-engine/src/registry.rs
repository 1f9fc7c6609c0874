//! Screen registry.
//!
//! Many readers (command layer, visibility updates, ticks) and few writers
//! (create, delete, attach, detach). Writers are serialized by the lock;
//! readers get cloned snapshots.

use gridcast_core::{AspectRatio, EngineError, Facing, Location, Result, ScreenId, SessionId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::session::PlaybackState;
use crate::stats::StatsSnapshot;

/// Parameters for a new screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenSpec {
    pub name: Option<String>,
    /// Top-left corner of the visible face
    pub location: Location,
    pub width: u32,
    pub height: u32,
    pub facing: Facing,
}

impl ScreenSpec {
    pub fn new(location: Location, width: u32, height: u32, facing: Facing) -> Self {
        Self {
            name: None,
            location,
            width,
            height,
            facing,
        }
    }

    /// Size the screen from an aspect ratio preset and a tile budget.
    pub fn from_aspect(location: Location, aspect: AspectRatio, target_tiles: u32, facing: Facing) -> Self {
        let (width, height) = aspect.cell_dimensions(target_tiles);
        Self::new(location, width, height, facing)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// How the last session on a screen ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub session: SessionId,
    pub source: String,
    pub state: PlaybackState,
    pub error: Option<String>,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Screen {
    pub id: ScreenId,
    pub name: Option<String>,
    pub location: Location,
    pub width: u32,
    pub height: u32,
    pub facing: Facing,
    pub session: Option<SessionId>,
    pub last_outcome: Option<SessionOutcome>,
    serial: u64,
}

impl Screen {
    /// World-space centre, used for visibility distance checks.
    pub fn center(&self) -> Location {
        self.facing.center(&self.location, self.width, self.height)
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }
}

/// One row of `listScreens`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenSummary {
    pub id: ScreenId,
    pub name: Option<String>,
    pub location: Location,
    pub width: u32,
    pub height: u32,
    pub facing: Facing,
    pub session: Option<SessionId>,
    pub state: Option<PlaybackState>,
}

/// Result of `info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenDetail {
    #[serde(flatten)]
    pub summary: ScreenSummary,
    pub source: Option<String>,
    pub position_ms: Option<i64>,
    pub duration_ms: Option<i64>,
    pub looping: bool,
    pub subscribers: usize,
    pub last_error: Option<String>,
    pub stats: Option<StatsSnapshot>,
    /// Outcome of the previous session, once one has ended
    pub last_session: Option<SessionOutcome>,
}

#[derive(Debug, Default)]
struct Inner {
    screens: HashMap<ScreenId, Screen>,
    by_name: HashMap<String, ScreenId>,
    next_serial: u64,
}

#[derive(Debug)]
pub struct ScreenRegistry {
    max_edge: u32,
    inner: RwLock<Inner>,
}

impl ScreenRegistry {
    pub fn new(max_edge: u32) -> Self {
        Self {
            max_edge,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn create(&self, spec: ScreenSpec) -> Result<Screen> {
        if spec.width == 0 || spec.height == 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "{}x{} has no cells",
                spec.width, spec.height
            )));
        }
        if spec.width > self.max_edge || spec.height > self.max_edge {
            return Err(EngineError::InvalidGeometry(format!(
                "{}x{} exceeds the {} cell limit per edge",
                spec.width, spec.height, self.max_edge
            )));
        }
        let name = match spec.name.as_deref().map(str::trim) {
            Some("") => return Err(EngineError::InvalidGeometry("empty screen name".into())),
            Some(name) => Some(name.to_string()),
            None => None,
        };

        let mut inner = self.inner.write();
        if let Some(name) = &name {
            if inner.by_name.contains_key(&name.to_lowercase()) {
                return Err(EngineError::DuplicateName(name.clone()));
            }
        }

        let serial = inner.next_serial;
        inner.next_serial += 1;
        let screen = Screen {
            id: ScreenId::new(),
            name,
            location: spec.location,
            width: spec.width,
            height: spec.height,
            facing: spec.facing,
            session: None,
            last_outcome: None,
            serial,
        };
        if let Some(name) = &screen.name {
            inner.by_name.insert(name.to_lowercase(), screen.id);
        }
        inner.screens.insert(screen.id, screen.clone());
        info!(
            screen = %screen.id,
            name = screen.name.as_deref().unwrap_or("-"),
            width = screen.width,
            height = screen.height,
            "Screen created"
        );
        Ok(screen)
    }

    /// Remove a screen. Fails with `ScreenBusy` while a session is attached.
    pub fn remove(&self, id: ScreenId) -> Result<Screen> {
        let mut inner = self.inner.write();
        match inner.screens.get(&id) {
            None => return Err(EngineError::ScreenNotFound(id)),
            Some(screen) if screen.session.is_some() => return Err(EngineError::ScreenBusy(id)),
            Some(_) => {}
        }
        let screen = inner
            .screens
            .remove(&id)
            .ok_or(EngineError::ScreenNotFound(id))?;
        if let Some(name) = &screen.name {
            inner.by_name.remove(&name.to_lowercase());
        }
        info!(screen = %id, "Screen deleted");
        Ok(screen)
    }

    /// Bind `session` to the screen. A screen holds at most one session.
    pub fn attach(&self, id: ScreenId, session: SessionId) -> Result<Screen> {
        let mut inner = self.inner.write();
        let screen = inner
            .screens
            .get_mut(&id)
            .ok_or(EngineError::ScreenNotFound(id))?;
        if screen.session.is_some() {
            return Err(EngineError::ScreenBusy(id));
        }
        screen.session = Some(session);
        Ok(screen.clone())
    }

    /// Unbind `session` if it is still the one attached. `outcome` is kept
    /// for `info`.
    pub fn detach(&self, id: ScreenId, session: SessionId, outcome: Option<SessionOutcome>) -> bool {
        let mut inner = self.inner.write();
        match inner.screens.get_mut(&id) {
            Some(screen) if screen.session == Some(session) => {
                screen.session = None;
                if outcome.is_some() {
                    screen.last_outcome = outcome;
                }
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: ScreenId) -> Result<Screen> {
        self.inner
            .read()
            .screens
            .get(&id)
            .cloned()
            .ok_or(EngineError::ScreenNotFound(id))
    }

    /// Case-insensitive lookup by name.
    pub fn find_by_name(&self, name: &str) -> Result<Screen> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(&name.trim().to_lowercase())
            .and_then(|id| inner.screens.get(id))
            .cloned()
            .ok_or_else(|| EngineError::ScreenNameNotFound(name.to_string()))
    }

    /// All screens in creation order.
    pub fn list(&self) -> Vec<Screen> {
        let mut screens: Vec<Screen> = self.inner.read().screens.values().cloned().collect();
        screens.sort_by_key(|s| s.serial);
        screens
    }

    /// Centre of every screen, for visibility updates.
    pub fn centers(&self) -> Vec<(ScreenId, Location)> {
        self.inner
            .read()
            .screens
            .values()
            .map(|s| (s.id, s.center()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().screens.is_empty()
    }
}
