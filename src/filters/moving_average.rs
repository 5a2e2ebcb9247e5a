// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fixed-window running mean.

/// Moving average over the last `n` samples.
///
/// Keeps a circular buffer and a running sum so each call is O(1). Until the
/// buffer fills, the mean covers only the samples seen so far.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    buffer: Vec<f64>,
    index: usize,
    len: usize,
    sum: f64,
    /// Number of consecutive samples equal to the latest one.
    repeats: usize,
}

impl MovingAverage {
    /// A window of size zero is treated as one (no smoothing).
    pub fn new(window_size: usize) -> Self {
        Self {
            buffer: vec![0.0; window_size.max(1)],
            index: 0,
            len: 0,
            sum: 0.0,
            repeats: 0,
        }
    }

    /// Add a sample and return the mean of the current window.
    pub fn filter(&mut self, value: f64) -> f64 {
        if self.len == self.buffer.len() {
            self.sum -= self.buffer[self.index];
        } else {
            self.len += 1;
        }
        let previous = self.buffer[(self.index + self.buffer.len() - 1) % self.buffer.len()];
        self.repeats = if self.repeats > 0 && previous == value {
            self.repeats + 1
        } else {
            1
        };
        self.buffer[self.index] = value;
        self.sum += value;
        self.index = (self.index + 1) % self.buffer.len();

        // The running sum drifts; once the window is uniform snap to the value.
        if self.repeats >= self.len {
            self.sum = value * self.len as f64;
            return value;
        }
        self.sum / self.len as f64
    }

    /// Mean of the current window, if any sample was seen.
    pub fn value(&self) -> Option<f64> {
        (self.len > 0).then(|| self.sum / self.len as f64)
    }

    pub fn window_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|v| *v = 0.0);
        self.index = 0;
        self.len = 0;
        self.sum = 0.0;
        self.repeats = 0;
    }
}
