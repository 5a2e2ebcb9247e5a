// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use run_tracker::config::{LocationFilterConfig, TrackingConfig};
use run_tracker::db::MemoryStore;
use run_tracker::models::{LocationSample, PathPoint, Run};
use run_tracker::remote::MockRemote;
use run_tracker::services::SyncEngine;
use std::sync::Arc;

/// Meters per degree of latitude with the haversine mean radius.
#[allow(dead_code)]
pub const METERS_PER_DEGREE: f64 = 111_195.08;

#[allow(dead_code)]
pub const USER: &str = "alice";

/// Engine over a memory store and mock remote, plus handles to both.
#[allow(dead_code)]
pub fn test_engine() -> (
    SyncEngine<MemoryStore, MockRemote>,
    Arc<MemoryStore>,
    Arc<MockRemote>,
) {
    let local = Arc::new(MemoryStore::new());
    let remote = Arc::new(MockRemote::new());
    let engine = SyncEngine::new(USER, Arc::clone(&local), Arc::clone(&remote));
    (engine, local, remote)
}

/// Tracking config whose filter passes every sample through unchanged.
#[allow(dead_code)]
pub fn passthrough_tracking() -> TrackingConfig {
    TrackingConfig {
        filter: LocationFilterConfig {
            lat_window: 1,
            lon_window: 1,
            alt_window: 1,
            radius: 0.0,
            rate: 1,
            max_update_interval_ms: 10_000,
        },
        ..TrackingConfig::default()
    }
}

/// Sample `north_m` meters north of (45, 7).
#[allow(dead_code)]
pub fn north(north_m: f64, time: i64) -> LocationSample {
    LocationSample::new(45.0 + north_m / METERS_PER_DEGREE, 7.0, 100.0, time)
}

#[allow(dead_code)]
pub fn point(time: i64) -> PathPoint {
    PathPoint::at(&north(0.0, time))
}

/// A started run owned by `USER`.
#[allow(dead_code)]
pub fn started_run(id: i64) -> Run {
    let mut run = Run::new(USER).with_id(id);
    run.start = Some(id);
    run
}

#[allow(dead_code)]
pub fn times(path: &[PathPoint]) -> Vec<i64> {
    path.iter().map(|p| p.time).collect()
}
