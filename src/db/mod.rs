// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local durable store.
//!
//! The device-side store is the correctness baseline: a write that returns
//! `Ok` has reached durable storage, and any failure is fatal for the
//! operation that caused it.

pub mod file;
pub mod memory;
mod records;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::Result;
use crate::models::{PathPoint, Run, RunKey, RunRef};

/// Pending-sync record for one run.
///
/// `since == None` means the remote has never seen the run; `Some(t)` means
/// the remote has everything up to and including `t`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWatermark {
    pub key: RunKey,
    pub since: Option<i64>,
}

/// Keyed run storage on the device.
pub trait LocalStore: Send + Sync + 'static {
    /// Insert a run, overwriting its fields if it already exists.
    fn insert_run(&self, run: &Run) -> impl Future<Output = Result<()>> + Send;

    /// Replace the scalar fields of an existing run (path untouched).
    fn update_run(&self, run: &Run) -> impl Future<Output = Result<()>> + Send;

    /// Append points in strictly increasing time order.
    fn append_path(
        &self,
        key: &RunKey,
        points: &[PathPoint],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Replace the run fields and append `points` in one durable write.
    ///
    /// On error the store is left exactly as it was.
    fn commit_update(
        &self,
        run: &Run,
        points: &[PathPoint],
    ) -> impl Future<Output = Result<()>> + Send;

    fn find_run(&self, user: &str, by: &RunRef) -> impl Future<Output = Result<Run>> + Send;

    /// Points with `time > since` (all points when `since` is `None`).
    fn get_path_since(
        &self,
        key: &RunKey,
        since: Option<i64>,
    ) -> impl Future<Output = Result<Vec<PathPoint>>> + Send;

    fn last_path(&self, key: &RunKey) -> impl Future<Output = Result<Option<PathPoint>>> + Send;

    fn list_finished_runs(
        &self,
        user: &str,
        until: Option<i64>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Run>>> + Send;

    fn list_runs_since(&self, user: &str, since: i64)
        -> impl Future<Output = Result<Vec<Run>>> + Send;

    fn unfinished_run(&self, user: &str) -> impl Future<Output = Result<Option<Run>>> + Send;

    fn delete_run(&self, key: &RunKey) -> impl Future<Output = Result<()>> + Send;

    fn put_sync_watermark(
        &self,
        key: &RunKey,
        since: Option<i64>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_sync_watermark(
        &self,
        key: &RunKey,
    ) -> impl Future<Output = Result<Option<SyncWatermark>>> + Send;

    fn delete_sync_watermark(&self, key: &RunKey) -> impl Future<Output = Result<()>> + Send;

    fn list_sync_watermarks(&self) -> impl Future<Output = Result<Vec<SyncWatermark>>> + Send;
}
