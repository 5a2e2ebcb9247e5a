// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Low-pass filters applied to the raw location stream.

pub mod location;
pub mod moving_average;
pub mod speed;

pub use location::LocationFilter;
pub use moving_average::MovingAverage;
pub use speed::SpeedEstimator;
