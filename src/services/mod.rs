// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - tracking and synchronization logic.

pub mod ranking;
pub mod route;
pub mod session;
pub mod sync;
pub mod tracker;
pub mod viewer;

pub use ranking::RankingSubscriber;
pub use route::{RouteChecker, RouteError, RouteService, RouteVerdict};
pub use session::{Checkpoint, Persist, RunSession, UpdateOutcome};
pub use sync::{ReconcileReport, SyncEngine};
pub use tracker::{RunHandle, RunTracker};
pub use viewer::RunViewer;
