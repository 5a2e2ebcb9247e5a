// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Location samples and recorded path points.

use geo::Point;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, TrackerError};

/// Raw sample delivered by a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct LocationSample {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    /// Meters above sea level; exactly 0 means the provider had no altitude fix.
    #[serde(default)]
    pub altitude: f64,
    /// Milliseconds since the epoch.
    #[validate(range(min = 0))]
    pub time: i64,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, altitude: f64, time: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            time,
        }
    }

    /// Reject NaN/infinite coordinates and out-of-range values.
    pub fn validated(self) -> Result<Self> {
        if !(self.latitude.is_finite() && self.longitude.is_finite() && self.altitude.is_finite())
        {
            return Err(TrackerError::Validation(format!(
                "non-finite coordinate in sample at {}",
                self.time
            )));
        }
        self.validate()?;
        Ok(self)
    }

    /// Position as a geo point (x = longitude, y = latitude).
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// One filtered sample plus the cumulative metrics of the run at that time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Milliseconds since the epoch.
    pub time: i64,
    /// Marks the last point of a path segment (pause or end of run).
    #[serde(default)]
    pub end: bool,
    /// Filtered speed in m/s.
    pub speed: f64,
    /// Cumulative distance in meters.
    pub distance: f64,
    /// Cumulative energy in kcal.
    pub kcal: f64,
}

impl PathPoint {
    /// A point at `sample` carrying no metrics yet.
    pub fn at(sample: &LocationSample) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude: sample.altitude,
            time: sample.time,
            end: false,
            speed: 0.0,
            distance: 0.0,
            kcal: 0.0,
        }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Copy of this point marking the end of its segment at `time`.
    pub fn end_marker(&self, time: i64) -> Self {
        Self {
            time,
            end: true,
            ..*self
        }
    }
}

/// Latest known position of a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Option<PathPoint>", into = "Option<PathPoint>")]
pub enum Location {
    /// No location has been received yet.
    #[default]
    NoFix,
    Fix(PathPoint),
}

impl Location {
    pub fn fix(&self) -> Option<&PathPoint> {
        match self {
            Location::NoFix => None,
            Location::Fix(point) => Some(point),
        }
    }

    pub fn is_fix(&self) -> bool {
        matches!(self, Location::Fix(_))
    }
}

impl From<Option<PathPoint>> for Location {
    fn from(value: Option<PathPoint>) -> Self {
        value.map_or(Location::NoFix, Location::Fix)
    }
}

impl From<Location> for Option<PathPoint> {
    fn from(value: Location) -> Self {
        match value {
            Location::NoFix => None,
            Location::Fix(point) => Some(point),
        }
    }
}
