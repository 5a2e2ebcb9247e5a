// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run state machine.
//!
//! `RunSession` is synchronous and never touches storage. Every transition
//! that changes persistent state returns a [`Persist`] describing what the
//! caller must write; the caller decides how to persist it and may restore
//! a [`Checkpoint`] if that write fails.

use geo::{Distance, Haversine};

use crate::config::TrackingConfig;
use crate::error::{Result, TrackerError};
use crate::filters::{LocationFilter, SpeedEstimator};
use crate::models::{
    EventRoute, Location, LocationSample, PathPoint, Run, RunData, RunSlot, RunSnapshot, RunState,
};
use crate::services::route::{RouteChecker, RouteVerdict};

/// Write produced by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Persist {
    /// First write of a freshly started run.
    Create(Run),
    /// New run fields plus the points appended by this transition.
    Update(RunData),
}

/// What happened to a location sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOutcome {
    /// Appended to the path. Carries the route verdict for event runs.
    Recorded(Option<RouteVerdict>),
    /// Location updated while not running; nothing recorded.
    Located,
    /// Rejected by the noise filter.
    Filtered,
    /// Invalid or out-of-order sample; logged and discarded.
    Dropped,
    /// Run is loading or has ended.
    Ignored,
}

/// State needed to undo one transition.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    slot: RunSlot,
    location: Location,
    path_len: usize,
    filter: LocationFilter,
    speed: SpeedEstimator,
    route: Option<RouteChecker>,
    last_tick: Option<i64>,
    last_check: Option<i64>,
}

/// One run being tracked on this device.
#[derive(Debug, Clone)]
pub struct RunSession {
    config: TrackingConfig,
    slot: RunSlot,
    location: Location,
    path: Vec<PathPoint>,
    filter: LocationFilter,
    speed: SpeedEstimator,
    event_route: Option<EventRoute>,
    route: Option<RouteChecker>,
    /// Wall-clock time `running` was last advanced
    last_tick: Option<i64>,
    /// Time of the last route check
    last_check: Option<i64>,
}

impl RunSession {
    /// New session in the `Loading` state. `route` is only used for event runs.
    pub fn new(config: TrackingConfig, route: Option<EventRoute>) -> Self {
        Self {
            filter: LocationFilter::new(config.filter.clone()),
            speed: SpeedEstimator::new(config.speed.clone()),
            config,
            slot: RunSlot::Loading,
            location: Location::NoFix,
            path: Vec::new(),
            event_route: route,
            route: None,
            last_tick: None,
            last_check: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.slot.state()
    }

    pub fn run(&self) -> Option<&Run> {
        self.slot.run()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn path(&self) -> &[PathPoint] {
        &self.path
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot::from_parts(&self.slot, &self.location, &self.path)
    }

    fn invalid(&self, op: &'static str) -> TrackerError {
        TrackerError::InvalidState {
            op,
            state: self.state(),
        }
    }

    /// Leave `Loading`, either resuming `stored` or starting over from `template`.
    pub fn hydrate(&mut self, template: Run, stored: Option<RunData>, now: i64) -> Result<()> {
        if self.state() != RunState::Loading {
            return Err(self.invalid("hydrate"));
        }

        let run = match stored {
            Some(data) => {
                self.location = data.location;
                self.path = data.path;
                if self.location == Location::NoFix {
                    self.location = self.path.last().copied().into();
                }
                data.run
            }
            None => template,
        };

        let last = self.path.last().copied();
        self.speed.clear(last.as_ref().filter(|p| !p.end));
        self.last_tick = Some(now);
        self.last_check = last.map(|p| p.time).or(Some(now));
        self.route = match (&run.event, &self.event_route) {
            (Some(event), Some(route)) if *event == route.id && !run.is_finished() => Some(
                RouteChecker::new(route.clone(), self.config.route.clone()),
            ),
            (Some(event), None) => {
                tracing::warn!(event = %event, "No route loaded for event run");
                None
            }
            _ => None,
        };

        tracing::info!(
            user = %run.user,
            run_id = ?run.id,
            state = ?run.state(),
            points = self.path.len(),
            "Run hydrated"
        );
        self.slot = RunSlot::Active(run);
        Ok(())
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            slot: self.slot.clone(),
            location: self.location,
            path_len: self.path.len(),
            filter: self.filter.clone(),
            speed: self.speed.clone(),
            route: self.route.clone(),
            last_tick: self.last_tick,
            last_check: self.last_check,
        }
    }

    /// Undo everything done since `checkpoint` was taken.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.slot = checkpoint.slot;
        self.location = checkpoint.location;
        self.path.truncate(checkpoint.path_len);
        self.filter = checkpoint.filter;
        self.speed = checkpoint.speed;
        self.route = checkpoint.route;
        self.last_tick = checkpoint.last_tick;
        self.last_check = checkpoint.last_check;
    }

    /// Advance `running` to `now`. Returns true if anything changed.
    pub fn tick(&mut self, now: i64) -> bool {
        let running = self.state() == RunState::Running;
        let previous = self.last_tick.replace(now);
        let (Some(run), Some(previous)) = (self.slot.run_mut(), previous) else {
            return false;
        };
        if running && now > previous {
            run.running += now - previous;
            return true;
        }
        false
    }

    pub fn start(&mut self, now: i64) -> Result<Persist> {
        if self.state() != RunState::Ready {
            return Err(self.invalid("start"));
        }
        let Some(run) = self.slot.run_mut() else {
            return Err(self.invalid("start"));
        };

        run.start = Some(now);
        run.paused = false;
        if run.id.is_none() {
            run.id = Some(now);
        }
        if run.event.is_some() {
            run.cur = Some(0);
            run.penalty = Some(0.0);
        }
        self.speed.clear(None);
        self.last_tick = Some(now);
        self.last_check = Some(now);

        tracing::info!(user = %run.user, run_id = ?run.id, "Run started");
        Ok(Persist::Create(run.clone()))
    }

    pub fn pause(&mut self, now: i64) -> Result<Persist> {
        if self.state() != RunState::Running {
            return Err(self.invalid("pause"));
        }
        self.tick(now);
        let marker = self.end_segment(now);
        let Some(run) = self.slot.run_mut() else {
            return Err(self.invalid("pause"));
        };
        run.paused = true;

        tracing::info!(user = %run.user, run_id = ?run.id, running_ms = run.running, "Run paused");
        self.update_with("pause", marker.into_iter().collect())
    }

    pub fn resume(&mut self, now: i64) -> Result<Persist> {
        if self.state() != RunState::Paused {
            return Err(self.invalid("resume"));
        }
        let Some(run) = self.slot.run_mut() else {
            return Err(self.invalid("resume"));
        };
        run.paused = false;
        tracing::info!(user = %run.user, run_id = ?run.id, "Run resumed");

        self.speed.clear(None);
        self.last_tick = Some(now);
        self.last_check = Some(now);
        self.update_with("resume", Vec::new())
    }

    /// End the run. `regular` is false for aborts and disqualifications.
    ///
    /// Returns `None` when the run never started: it ends without ever
    /// having been written.
    pub fn stop(&mut self, now: i64, regular: bool) -> Result<Option<Persist>> {
        let state = self.state();
        if !matches!(
            state,
            RunState::Ready | RunState::Running | RunState::Paused
        ) {
            return Err(self.invalid("stop"));
        }
        self.tick(now);
        let mut points = Vec::new();
        self.finish(now, regular, &mut points);

        if state == RunState::Ready {
            return Ok(None);
        }
        self.update_with("stop", points).map(Some)
    }

    fn finish(&mut self, now: i64, regular: bool, points: &mut Vec<PathPoint>) {
        // The run ends with its end marker, which may land after `now`.
        let end = match self.end_segment(now) {
            Some(marker) => {
                points.push(marker);
                marker.time
            }
            None => now,
        };
        self.route = None;
        if let Some(run) = self.slot.run_mut() {
            run.end = Some(end);
            run.paused = false;
            run.disqualified = !regular;
            tracing::info!(
                user = %run.user,
                run_id = ?run.id,
                running_ms = run.running,
                disqualified = run.disqualified,
                "Run stopped"
            );
        }
    }

    /// Append an end marker unless the path already ends a segment.
    fn end_segment(&mut self, now: i64) -> Option<PathPoint> {
        let last = self.path.last().filter(|p| !p.end)?;
        let marker = last.end_marker(now.max(last.time + 1));
        self.path.push(marker);
        self.location = Location::Fix(marker);
        Some(marker)
    }

    fn update_with(&self, op: &'static str, path: Vec<PathPoint>) -> Result<Persist> {
        let run = self.slot.run().ok_or_else(|| self.invalid(op))?;
        Ok(Persist::Update(RunData::new(run.clone(), self.location, path)))
    }

    /// Feed one raw location sample.
    ///
    /// Invalid samples, and samples that do not advance past the last
    /// recorded point while running, are logged and dropped.
    pub fn update(&mut self, sample: LocationSample) -> Result<(UpdateOutcome, Option<Persist>)> {
        let time = sample.time;
        let sample = match sample.validated() {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(time, error = %e, "Dropping invalid location sample");
                return Ok((UpdateOutcome::Dropped, None));
            }
        };
        let state = self.state();
        if matches!(state, RunState::Loading | RunState::Ended) {
            return Ok((UpdateOutcome::Ignored, None));
        }
        if state == RunState::Running {
            if let Some(last) = self.path.last().filter(|p| sample.time <= p.time) {
                tracing::warn!(
                    time,
                    last = last.time,
                    "Dropping location sample that does not follow the last point"
                );
                return Ok((UpdateOutcome::Dropped, None));
            }
        }

        let Some(filtered) = self.filter.filter(&sample) else {
            return Ok((UpdateOutcome::Filtered, None));
        };

        if state != RunState::Running {
            self.location = Location::Fix(PathPoint::at(&filtered));
            return Ok((UpdateOutcome::Located, None));
        }

        let point = self.measure(&filtered);
        self.path.push(point);
        self.location = Location::Fix(point);
        let mut points = vec![point];

        let verdict = self.check_route(&point);
        match verdict {
            Some(RouteVerdict::Disqualified { penalty }) => {
                tracing::warn!(penalty, "Run disqualified for leaving the route");
                self.finish(point.time, false, &mut points);
            }
            Some(RouteVerdict::Finished) => self.finish(point.time, true, &mut points),
            _ => {}
        }

        let persist = self.update_with("update", points)?;
        Ok((UpdateOutcome::Recorded(verdict), Some(persist)))
    }

    /// Compute cumulative metrics for the next point.
    fn measure(&mut self, sample: &LocationSample) -> PathPoint {
        let mut point = PathPoint::at(sample);
        let Some(prev) = self.path.last().copied() else {
            point.speed = self.speed.filter(&point);
            return point;
        };

        point.distance = prev.distance;
        point.kcal = prev.kcal;
        if prev.end {
            // First point of a new segment adds no distance.
            point.speed = self.speed.filter(&point);
            return point;
        }

        let step = Haversine.distance(prev.point(), point.point());
        point.distance += step;
        point.speed = self.speed.filter(&point);

        let slope = if step > 0.0 {
            (point.altitude - prev.altitude) / step
        } else {
            0.0
        };
        let factor = (0.2 + 0.9 * slope).max(0.1);
        // L O2 per kg per minute, about 5 kcal per liter
        let vo2 = point.speed * 60.0 * factor / 1000.0;
        let minutes = (point.time - prev.time) as f64 / 60_000.0;
        point.kcal += vo2 * self.config.body_weight_kg * 5.0 * minutes;
        point
    }

    fn check_route(&mut self, point: &PathPoint) -> Option<RouteVerdict> {
        let (Some(checker), RunSlot::Active(run)) = (self.route.as_mut(), &mut self.slot) else {
            return None;
        };
        let elapsed = point.time - self.last_check.unwrap_or(point.time);
        self.last_check = Some(point.time);
        Some(checker.check(point, elapsed, run))
    }
}
