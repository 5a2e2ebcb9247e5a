// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supervised event routes and event rankings.

use geo::Point;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A supervised course: ordered waypoints, a distance target and a tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRoute {
    /// Event identifier (matches `Run::event`)
    pub id: String,
    pub name: String,
    /// Ordered checkpoints (x = longitude, y = latitude)
    pub waypoints: Vec<Point<f64>>,
    /// Declared total distance in meters
    pub distance: f64,
    /// Allowed distance from the route in meters
    pub tolerance: f64,
}

impl EventRoute {
    pub fn last_index(&self) -> usize {
        self.waypoints.len().saturating_sub(1)
    }
}

/// One line of an event's live ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RankingEntry {
    pub user: String,
    pub name: String,
    /// Distance covered so far (meters), for runs still in progress.
    #[serde(default)]
    pub distance: Option<f64>,
    /// Finishing time (ms), for completed runs.
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub time: Option<i64>,
    #[serde(default)]
    pub disqualified: bool,
}
