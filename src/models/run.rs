// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run model, lifecycle state and transfer objects.

use serde::{Deserialize, Serialize};
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::path::{Location, PathPoint};

/// Identity of a run: owner plus caller-assigned run id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    pub user: String,
    pub id: i64,
}

impl RunKey {
    pub fn new(user: impl Into<String>, id: i64) -> Self {
        Self {
            user: user.into(),
            id,
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user, self.id)
    }
}

/// How a run is looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunRef {
    Id(i64),
    /// Group run identifier.
    Room(String),
    /// Supervised route identifier.
    Event(String),
}

impl RunRef {
    /// Whether `run` is the one this reference designates.
    pub fn matches(&self, run: &Run) -> bool {
        match self {
            RunRef::Id(id) => run.id == Some(*id),
            RunRef::Room(room) => run.room.as_deref() == Some(room.as_str()),
            RunRef::Event(event) => run.event.as_deref() == Some(event.as_str()),
        }
    }
}

/// Lifecycle state, derived from the run's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Loading,
    Ready,
    Running,
    Paused,
    Ended,
}

/// One tracked activity session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub user: String,
    /// Assigned when the run starts, if the caller did not provide one.
    pub id: Option<i64>,
    pub room: Option<String>,
    pub event: Option<String>,
    /// Start time (ms); unset until started.
    pub start: Option<i64>,
    /// Accumulated active milliseconds.
    #[serde(default)]
    pub running: i64,
    /// End time (ms); unset until finished.
    pub end: Option<i64>,
    #[serde(default)]
    pub paused: bool,
    /// Index of the next route waypoint (event runs only).
    pub cur: Option<usize>,
    /// Accumulated off-route penalty (event runs only).
    pub penalty: Option<f64>,
    /// Set when the run was stopped irregularly (abort or disqualification).
    #[serde(default)]
    pub disqualified: bool,
}

impl Run {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            id: None,
            room: None,
            event: None,
            start: None,
            running: 0,
            end: None,
            paused: false,
            cur: None,
            penalty: None,
            disqualified: false,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self.event = None;
        self
    }

    pub fn for_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self.room = None;
        self
    }

    pub fn key(&self) -> Option<RunKey> {
        self.id.map(|id| RunKey::new(self.user.clone(), id))
    }

    pub fn state(&self) -> RunState {
        if self.end.is_some() {
            RunState::Ended
        } else if self.start.is_none() {
            RunState::Ready
        } else if self.paused {
            RunState::Paused
        } else {
            RunState::Running
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end.is_some()
    }
}

/// Either a run that has not been hydrated from storage yet, or the run itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RunSlot {
    #[default]
    Loading,
    Active(Run),
}

impl RunSlot {
    pub fn state(&self) -> RunState {
        match self {
            RunSlot::Loading => RunState::Loading,
            RunSlot::Active(run) => run.state(),
        }
    }

    pub fn run(&self) -> Option<&Run> {
        match self {
            RunSlot::Loading => None,
            RunSlot::Active(run) => Some(run),
        }
    }

    pub fn run_mut(&mut self) -> Option<&mut Run> {
        match self {
            RunSlot::Loading => None,
            RunSlot::Active(run) => Some(run),
        }
    }
}

/// Run plus its latest location and a path whose extent depends on context:
/// full history, points since a watermark, or empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    pub run: Run,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub path: Vec<PathPoint>,
}

impl RunData {
    pub fn new(run: Run, location: Location, path: Vec<PathPoint>) -> Self {
        Self {
            run,
            location,
            path,
        }
    }

    /// Same run and location without any path.
    pub fn without_path(&self) -> Self {
        Self {
            run: self.run.clone(),
            location: self.location,
            path: Vec::new(),
        }
    }
}

/// Run summary for list views (never carries a path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProjection {
    pub run: Run,
    #[serde(default)]
    pub location: Location,
}

impl From<RunData> for RunProjection {
    fn from(data: RunData) -> Self {
        Self {
            run: data.run,
            location: data.location,
        }
    }
}

/// Read-only view of a run for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RunSnapshot {
    pub state: RunState,
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub id: Option<i64>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub running_ms: i64,
    pub distance: f64,
    pub kcal: f64,
    pub speed: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub path_len: usize,
    pub cur: Option<usize>,
    pub penalty: Option<f64>,
    pub disqualified: bool,
}

impl RunSnapshot {
    pub fn loading() -> Self {
        Self {
            state: RunState::Loading,
            id: None,
            running_ms: 0,
            distance: 0.0,
            kcal: 0.0,
            speed: 0.0,
            latitude: None,
            longitude: None,
            path_len: 0,
            cur: None,
            penalty: None,
            disqualified: false,
        }
    }

    /// Build a snapshot from a slot, its latest location and path.
    pub fn from_parts(slot: &RunSlot, location: &Location, path: &[PathPoint]) -> Self {
        let Some(run) = slot.run() else {
            return Self::loading();
        };
        let last = path.last();
        let fix = location.fix();
        Self {
            state: run.state(),
            id: run.id,
            running_ms: run.running,
            distance: last.map_or(0.0, |p| p.distance),
            kcal: last.map_or(0.0, |p| p.kcal),
            speed: last.map_or(0.0, |p| p.speed),
            latitude: fix.map(|p| p.latitude),
            longitude: fix.map(|p| p.longitude),
            path_len: path.len(),
            cur: run.cur,
            penalty: run.penalty,
            disqualified: run.disqualified,
        }
    }
}
