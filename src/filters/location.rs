// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GPS jitter suppression.
//!
//! Smooths each axis with its own moving average, then debounces samples that
//! have not moved away from any of the recently accepted ones. This is a
//! heuristic, not a Kalman filter.

use geo::{Distance, Haversine};

use crate::config::LocationFilterConfig;
use crate::filters::MovingAverage;
use crate::models::LocationSample;

/// Per-axis smoothing plus a recency/displacement gate.
#[derive(Debug, Clone)]
pub struct LocationFilter {
    config: LocationFilterConfig,
    latitude: MovingAverage,
    longitude: MovingAverage,
    altitude: MovingAverage,
    /// Ring of the last `rate` accepted samples
    recent: Vec<LocationSample>,
    /// Slot replaced by the next accepted sample (the oldest once full)
    next_slot: usize,
    last_accepted: Option<LocationSample>,
}

impl LocationFilter {
    pub fn new(config: LocationFilterConfig) -> Self {
        let rate = config.rate.max(1);
        Self {
            latitude: MovingAverage::new(config.lat_window),
            longitude: MovingAverage::new(config.lon_window),
            altitude: MovingAverage::new(config.alt_window),
            recent: Vec::with_capacity(rate),
            next_slot: 0,
            last_accepted: None,
            config: LocationFilterConfig { rate, ..config },
        }
    }

    /// Smooth `sample` and decide whether it is a real movement.
    ///
    /// Returns `None` when the smoothed sample is within `radius` of every
    /// remembered sample, unless the oldest remembered sample is older than
    /// `max_update_interval_ms`.
    pub fn filter(&mut self, sample: &LocationSample) -> Option<LocationSample> {
        let latitude = self.latitude.filter(sample.latitude);
        let longitude = self.longitude.filter(sample.longitude);
        // Zero altitude means "no fix" on many devices.
        let altitude = if sample.altitude == 0.0 {
            self.last_accepted.map_or(0.0, |last| last.altitude)
        } else {
            self.altitude.filter(sample.altitude)
        };
        let candidate = LocationSample::new(latitude, longitude, altitude, sample.time);

        if self.recent.len() == self.config.rate {
            let oldest = self.recent[self.next_slot];
            let stale = candidate.time - oldest.time > self.config.max_update_interval_ms;
            let point = candidate.point();
            let jitter = self
                .recent
                .iter()
                .all(|r| Haversine.distance(r.point(), point) < self.config.radius);
            if jitter && !stale {
                tracing::debug!(time = candidate.time, "Location sample rejected as jitter");
                return None;
            }
        }

        self.accept(candidate);
        Some(candidate)
    }

    fn accept(&mut self, sample: LocationSample) {
        if self.recent.len() < self.config.rate {
            self.recent.push(sample);
            self.next_slot = self.recent.len() % self.config.rate;
        } else {
            self.recent[self.next_slot] = sample;
            self.next_slot = (self.next_slot + 1) % self.config.rate;
        }
        self.last_accepted = Some(sample);
    }

    pub fn last_accepted(&self) -> Option<&LocationSample> {
        self.last_accepted.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LocationFilterConfig {
        LocationFilterConfig {
            lat_window: 1,
            lon_window: 1,
            alt_window: 1,
            radius: 5.0,
            rate: 2,
            max_update_interval_ms: 10_000,
        }
    }

    #[test]
    fn test_zero_altitude_backfilled_from_last_accepted() {
        let mut filter = LocationFilter::new(config());
        let first = filter
            .filter(&LocationSample::new(45.0, 7.0, 250.0, 0))
            .unwrap();
        assert_eq!(first.altitude, 250.0);

        let second = filter
            .filter(&LocationSample::new(45.001, 7.0, 0.0, 1000))
            .unwrap();
        assert_eq!(second.altitude, 250.0);
    }

    #[test]
    fn test_moving_sample_accepted_when_buffer_full() {
        let mut filter = LocationFilter::new(config());
        filter.filter(&LocationSample::new(45.0, 7.0, 0.0, 0));
        filter.filter(&LocationSample::new(45.0, 7.0, 0.0, 1000));
        // ~111 m north
        assert!(filter
            .filter(&LocationSample::new(45.001, 7.0, 0.0, 2000))
            .is_some());
    }

    #[test]
    fn test_smoothing_applies_per_axis() {
        let mut filter = LocationFilter::new(LocationFilterConfig {
            lat_window: 2,
            rate: 1,
            radius: 0.0,
            ..config()
        });
        filter.filter(&LocationSample::new(10.0, 20.0, 0.0, 0));
        let out = filter
            .filter(&LocationSample::new(10.002, 20.001, 0.0, 1000))
            .unwrap();
        assert!((out.latitude - 10.001).abs() < 1e-9);
        assert!((out.longitude - 20.001).abs() < 1e-9, "lon window is 1");
    }
}
