// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Windowed secant-slope speed estimator.

use std::collections::VecDeque;

use crate::config::SpeedConfig;
use crate::models::PathPoint;

/// Speed over the most recent window spanning at least `min_span_ms`.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    config: SpeedConfig,
    /// (time ms, cumulative distance m), oldest first
    window: VecDeque<(i64, f64)>,
    last_speed: Option<f64>,
}

impl SpeedEstimator {
    pub fn new(config: SpeedConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            last_speed: None,
        }
    }

    /// Feed the next point (non-decreasing time) and return the speed in m/s.
    pub fn filter(&mut self, point: &PathPoint) -> f64 {
        self.window.push_back((point.time, point.distance));

        // Drop the oldest sample while the rest still covers the span.
        while self.window.len() > 2 {
            let second = self.window[1].0;
            if point.time - second >= self.config.min_span_ms {
                self.window.pop_front();
            } else {
                break;
            }
        }

        let (start_time, start_distance) = self.window[0];
        let elapsed = point.time - start_time;
        let speed = if self.window.len() < 2 || elapsed <= 0 {
            self.last_speed.unwrap_or(self.config.default_speed)
        } else {
            ((point.distance - start_distance) / elapsed as f64 * 1000.0).max(0.0)
        };
        self.last_speed = Some(speed);
        speed
    }

    /// Forget history, optionally seeding the window with `start`.
    pub fn clear(&mut self, start: Option<&PathPoint>) {
        self.window.clear();
        self.last_speed = None;
        if let Some(point) = start {
            self.window.push_back((point.time, point.distance));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationSample;

    fn point(time: i64, distance: f64) -> PathPoint {
        PathPoint {
            distance,
            ..PathPoint::at(&LocationSample::new(0.0, 0.0, 0.0, time))
        }
    }

    fn estimator(min_span_ms: i64) -> SpeedEstimator {
        SpeedEstimator::new(SpeedConfig {
            min_span_ms,
            default_speed: 0.5,
        })
    }

    #[test]
    fn test_first_call_returns_default() {
        let mut speed = estimator(5000);
        assert_eq!(speed.filter(&point(0, 0.0)), 0.5);
    }

    #[test]
    fn test_constant_pace() {
        let mut speed = estimator(5000);
        speed.filter(&point(0, 0.0));
        assert!((speed.filter(&point(1000, 3.0)) - 3.0).abs() < 1e-9);
        assert!((speed.filter(&point(2000, 6.0)) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_old_points_evicted() {
        let mut speed = estimator(2000);
        speed.filter(&point(0, 0.0));
        speed.filter(&point(1000, 100.0)); // burst
        speed.filter(&point(2000, 101.0));
        speed.filter(&point(3000, 102.0));
        // The burst has left the window
        let v = speed.filter(&point(4000, 103.0));
        assert!((v - 1.0).abs() < 1e-9, "got {}", v);
    }

    #[test]
    fn test_clear_discards_history() {
        let mut speed = estimator(10_000);
        speed.filter(&point(0, 0.0));
        speed.filter(&point(1000, 10.0));
        speed.clear(None);
        assert_eq!(speed.filter(&point(60_000, 10.0)), 0.5);
        assert!((speed.filter(&point(61_000, 12.0)) - 2.0).abs() < 1e-9);
    }
}
