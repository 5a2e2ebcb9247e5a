// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Volatile local store for tests and offline experiments.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::db::records::StoreData;
use crate::db::{LocalStore, SyncWatermark};
use crate::error::{Result, TrackerError};
use crate::models::{PathPoint, Run, RunKey, RunRef};

/// Local store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
    /// Mock: fail every mutating call while set.
    fail_writes: AtomicBool,
    /// Mock: fail only writes that carry path points.
    fail_path_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every mutating call fail (simulates a full or broken disk).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes that append path points fail; run-only writes still succeed.
    pub fn set_fail_path_writes(&self, fail: bool) {
        self.fail_path_writes.store(fail, Ordering::SeqCst);
    }

    fn check_path_write(&self, points: &[PathPoint]) -> Result<()> {
        if !points.is_empty() && self.fail_path_writes.load(Ordering::SeqCst) {
            return Err(TrackerError::LocalStore(
                "Mock path write failure".to_string(),
            ));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&StoreData) -> Result<T>) -> Result<T> {
        let data = self
            .data
            .lock()
            .map_err(|_| TrackerError::LocalStore("Failed to acquire store lock".to_string()))?;
        f(&data)
    }

    fn write<T>(&self, f: impl FnOnce(&mut StoreData) -> Result<T>) -> Result<T> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TrackerError::LocalStore(
                "Mock write failure".to_string(),
            ));
        }
        let mut data = self
            .data
            .lock()
            .map_err(|_| TrackerError::LocalStore("Failed to acquire store lock".to_string()))?;
        f(&mut data)
    }
}

impl LocalStore for MemoryStore {
    async fn insert_run(&self, run: &Run) -> Result<()> {
        self.write(|d| d.insert_run(run))
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        self.write(|d| d.update_run(run))
    }

    async fn append_path(&self, key: &RunKey, points: &[PathPoint]) -> Result<()> {
        self.check_path_write(points)?;
        self.write(|d| d.append_path(key, points))
    }

    async fn commit_update(&self, run: &Run, points: &[PathPoint]) -> Result<()> {
        self.check_path_write(points)?;
        self.write(|d| d.commit_update(run, points))
    }

    async fn find_run(&self, user: &str, by: &RunRef) -> Result<Run> {
        self.read(|d| d.find_run(user, by))
    }

    async fn get_path_since(&self, key: &RunKey, since: Option<i64>) -> Result<Vec<PathPoint>> {
        self.read(|d| d.get_path_since(key, since))
    }

    async fn last_path(&self, key: &RunKey) -> Result<Option<PathPoint>> {
        self.read(|d| d.last_path(key))
    }

    async fn list_finished_runs(
        &self,
        user: &str,
        until: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Run>> {
        self.read(|d| Ok(d.list_finished_runs(user, until, limit)))
    }

    async fn list_runs_since(&self, user: &str, since: i64) -> Result<Vec<Run>> {
        self.read(|d| Ok(d.list_runs_since(user, since)))
    }

    async fn unfinished_run(&self, user: &str) -> Result<Option<Run>> {
        self.read(|d| Ok(d.unfinished_run(user)))
    }

    async fn delete_run(&self, key: &RunKey) -> Result<()> {
        self.write(|d| d.delete_run(key))
    }

    async fn put_sync_watermark(&self, key: &RunKey, since: Option<i64>) -> Result<()> {
        self.write(|d| {
            d.put_watermark(key, since);
            Ok(())
        })
    }

    async fn get_sync_watermark(&self, key: &RunKey) -> Result<Option<SyncWatermark>> {
        self.read(|d| Ok(d.get_watermark(key)))
    }

    async fn delete_sync_watermark(&self, key: &RunKey) -> Result<()> {
        self.write(|d| {
            d.delete_watermark(key);
            Ok(())
        })
    }

    async fn list_sync_watermarks(&self) -> Result<Vec<SyncWatermark>> {
        self.read(|d| Ok(d.list_watermarks()))
    }
}
