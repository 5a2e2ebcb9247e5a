// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory representation of the local store, shared by every backend.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::SyncWatermark;
use crate::error::{Result, TrackerError};
use crate::models::{PathPoint, Run, RunKey, RunRef};

/// One stored run with its full path.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunRecord {
    run: Run,
    path: Vec<PathPoint>,
}

/// Complete store contents, keyed by `RunKey` display form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreData {
    #[serde(default)]
    runs: BTreeMap<String, RunRecord>,
    #[serde(default)]
    watermarks: BTreeMap<String, SyncWatermark>,
}

fn key_of(run: &Run) -> Result<RunKey> {
    run.key()
        .ok_or_else(|| TrackerError::Validation("run has no id".to_string()))
}

fn not_found(key: &RunKey) -> TrackerError {
    TrackerError::NotFound(format!("run {}", key))
}

impl StoreData {
    /// Insert a run, or overwrite its fields if it already exists.
    pub fn insert_run(&mut self, run: &Run) -> Result<()> {
        let key = key_of(run)?;
        self.runs
            .entry(key.to_string())
            .and_modify(|record| record.run = run.clone())
            .or_insert_with(|| RunRecord {
                run: run.clone(),
                path: Vec::new(),
            });
        Ok(())
    }

    pub fn update_run(&mut self, run: &Run) -> Result<()> {
        let key = key_of(run)?;
        let record = self
            .runs
            .get_mut(&key.to_string())
            .ok_or_else(|| not_found(&key))?;
        record.run = run.clone();
        Ok(())
    }

    /// Append points; each must be strictly later than the one before.
    pub fn append_path(&mut self, key: &RunKey, points: &[PathPoint]) -> Result<()> {
        let record = self
            .runs
            .get_mut(&key.to_string())
            .ok_or_else(|| not_found(key))?;

        let mut last = record.path.last().map(|p| p.time);
        for point in points {
            if last.is_some_and(|t| point.time <= t) {
                return Err(TrackerError::Validation(format!(
                    "path point at {} is not after {:?} for run {}",
                    point.time, last, key
                )));
            }
            last = Some(point.time);
        }
        record.path.extend_from_slice(points);
        Ok(())
    }

    /// Append `points` and replace the run fields, or change nothing.
    pub fn commit_update(&mut self, run: &Run, points: &[PathPoint]) -> Result<()> {
        let key = key_of(run)?;
        // append_path validates every point before touching the record
        self.append_path(&key, points)?;
        self.update_run(run)
    }

    /// Most recent (highest id) run of `user` matching `by`.
    pub fn find_run(&self, user: &str, by: &RunRef) -> Result<Run> {
        self.runs
            .values()
            .filter(|r| r.run.user == user && by.matches(&r.run))
            .max_by_key(|r| r.run.id)
            .map(|r| r.run.clone())
            .ok_or_else(|| TrackerError::NotFound(format!("run {:?} of {}", by, user)))
    }

    pub fn get_path_since(&self, key: &RunKey, since: Option<i64>) -> Result<Vec<PathPoint>> {
        let record = self
            .runs
            .get(&key.to_string())
            .ok_or_else(|| not_found(key))?;
        Ok(match since {
            Some(since) => record
                .path
                .iter()
                .filter(|p| p.time > since)
                .copied()
                .collect(),
            None => record.path.clone(),
        })
    }

    pub fn last_path(&self, key: &RunKey) -> Result<Option<PathPoint>> {
        self.runs
            .get(&key.to_string())
            .map(|r| r.path.last().copied())
            .ok_or_else(|| not_found(key))
    }

    /// Finished runs started before `until`, most recent first.
    pub fn list_finished_runs(&self, user: &str, until: Option<i64>, limit: usize) -> Vec<Run> {
        let mut runs: Vec<Run> = self
            .runs
            .values()
            .map(|r| &r.run)
            .filter(|run| run.user == user && run.is_finished())
            .filter(|run| match (until, run.start) {
                (Some(until), Some(start)) => start < until,
                _ => true,
            })
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.start.cmp(&a.start));
        runs.truncate(limit);
        runs
    }

    /// Runs started at or after `since`, oldest first.
    pub fn list_runs_since(&self, user: &str, since: i64) -> Vec<Run> {
        let mut runs: Vec<Run> = self
            .runs
            .values()
            .map(|r| &r.run)
            .filter(|run| run.user == user && run.start.is_some_and(|s| s >= since))
            .cloned()
            .collect();
        runs.sort_by_key(|run| run.start);
        runs
    }

    /// Most recently started run that has not ended.
    pub fn unfinished_run(&self, user: &str) -> Option<Run> {
        self.runs
            .values()
            .map(|r| &r.run)
            .filter(|run| run.user == user && run.start.is_some() && !run.is_finished())
            .max_by_key(|run| run.start)
            .cloned()
    }

    /// Remove a run together with its pending-sync record.
    pub fn delete_run(&mut self, key: &RunKey) -> Result<()> {
        let id = key.to_string();
        self.watermarks.remove(&id);
        self.runs.remove(&id).map(|_| ()).ok_or_else(|| not_found(key))
    }

    pub fn put_watermark(&mut self, key: &RunKey, since: Option<i64>) {
        self.watermarks.insert(
            key.to_string(),
            SyncWatermark {
                key: key.clone(),
                since,
            },
        );
    }

    pub fn get_watermark(&self, key: &RunKey) -> Option<SyncWatermark> {
        self.watermarks.get(&key.to_string()).cloned()
    }

    pub fn delete_watermark(&mut self, key: &RunKey) {
        self.watermarks.remove(&key.to_string());
    }

    pub fn list_watermarks(&self) -> Vec<SyncWatermark> {
        self.watermarks.values().cloned().collect()
    }
}
