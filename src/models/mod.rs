// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod event;
pub mod path;
pub mod run;

pub use event::{EventRoute, RankingEntry};
pub use path::{Location, LocationSample, PathPoint};
pub use run::{Run, RunData, RunKey, RunProjection, RunRef, RunSlot, RunSnapshot, RunState};
