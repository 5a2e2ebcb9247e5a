// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Run-Tracker: Record runs on the device and keep them in sync
//!
//! This crate provides the tracking core of a running app: GPS noise
//! filtering, the run state machine with distance and energy accounting,
//! route conformance checking for supervised events, and a local-first
//! synchronization engine that mirrors runs to a remote service.

pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod models;
pub mod remote;
pub mod retry;
pub mod services;
pub mod time_utils;

pub use error::{Result, TrackerError};
