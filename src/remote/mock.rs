// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory remote run service with failure injection.
//!
//! Used by tests and by offline runs of the tracker. Updates append their
//! path blindly, like the real service, so duplicate transmissions show up
//! as duplicate points.

use futures_util::{stream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::error::{Result, TrackerError};
use crate::models::{PathPoint, RankingEntry, Run, RunData, RunKey, RunProjection, RunRef};
use crate::remote::{RankingStream, RemoteService};

#[derive(Debug, Clone)]
struct MockRecord {
    run: Run,
    path: Vec<PathPoint>,
}

impl MockRecord {
    fn data_since(&self, since: Option<i64>) -> RunData {
        let path = match since {
            Some(since) => self.path.iter().filter(|p| p.time > since).copied().collect(),
            None => self.path.clone(),
        };
        RunData::new(self.run.clone(), self.path.last().copied().into(), path)
    }
}

/// Mock remote service.
#[derive(Default)]
pub struct MockRemote {
    runs: Mutex<BTreeMap<RunKey, MockRecord>>,
    rankings: Mutex<HashMap<String, broadcast::Sender<Vec<RankingEntry>>>>,
    offline: AtomicBool,
    fail_creates: AtomicU32,
    fail_updates: AtomicU32,
    fail_ranking_connects: AtomicU32,
    create_calls: AtomicU32,
    update_calls: AtomicU32,
    ranking_connects: AtomicU32,
}

/// Consume one pending injected failure, if any.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> MutexGuard<'_, BTreeMap<RunKey, MockRecord>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self, op: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TrackerError::RemoteUnavailable(format!(
                "Mock offline ({})",
                op
            )));
        }
        Ok(())
    }

    /// Fail every call while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `n` create calls.
    pub fn fail_next_creates(&self, n: u32) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` update calls.
    pub fn fail_next_updates(&self, n: u32) {
        self.fail_updates.store(n, Ordering::SeqCst);
    }

    /// Refuse the next `n` ranking feed connections.
    pub fn fail_next_ranking_connects(&self, n: u32) {
        self.fail_ranking_connects.store(n, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn ranking_connects(&self) -> u32 {
        self.ranking_connects.load(Ordering::SeqCst)
    }

    /// Seed a run as if another device had uploaded it.
    pub fn insert(&self, data: RunData) {
        if let Some(key) = data.run.key() {
            self.runs().insert(
                key,
                MockRecord {
                    run: data.run,
                    path: data.path,
                },
            );
        }
    }

    pub fn run(&self, key: &RunKey) -> Option<Run> {
        self.runs().get(key).map(|r| r.run.clone())
    }

    pub fn path(&self, key: &RunKey) -> Vec<PathPoint> {
        self.runs()
            .get(key)
            .map(|r| r.path.clone())
            .unwrap_or_default()
    }

    /// Push a ranking to every subscriber of `event`; returns the receiver count.
    pub fn publish_ranking(&self, event: &str, ranking: Vec<RankingEntry>) -> usize {
        let rankings = self.rankings.lock().unwrap_or_else(PoisonError::into_inner);
        rankings
            .get(event)
            .and_then(|tx| tx.send(ranking).ok())
            .unwrap_or(0)
    }

    /// Close every open feed for `event`.
    pub fn disconnect_rankings(&self, event: &str) {
        self.rankings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event);
    }
}

impl RemoteService for MockRemote {
    async fn create_run(&self, run: &Run) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online("create")?;
        if take_failure(&self.fail_creates) {
            return Err(TrackerError::RemoteUnavailable(
                "Mock create failure".to_string(),
            ));
        }
        let key = run
            .key()
            .ok_or_else(|| TrackerError::Validation("run has no id".to_string()))?;
        self.runs()
            .entry(key)
            .and_modify(|r| r.run = run.clone())
            .or_insert_with(|| MockRecord {
                run: run.clone(),
                path: Vec::new(),
            });
        Ok(())
    }

    async fn update_run(&self, data: &RunData) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online("update")?;
        if take_failure(&self.fail_updates) {
            return Err(TrackerError::RemoteUnavailable(
                "Mock update failure".to_string(),
            ));
        }
        let key = data
            .run
            .key()
            .ok_or_else(|| TrackerError::Validation("run has no id".to_string()))?;
        let mut runs = self.runs();
        let record = runs
            .get_mut(&key)
            .ok_or_else(|| TrackerError::NotFound(format!("remote run {}", key)))?;
        record.run = data.run.clone();
        record.path.extend_from_slice(&data.path);
        Ok(())
    }

    async fn get_run_update(&self, user: &str, by: &RunRef, since: Option<i64>) -> Result<RunData> {
        self.check_online("get")?;
        self.runs()
            .values()
            .filter(|r| r.run.user == user && by.matches(&r.run))
            .max_by_key(|r| r.run.id)
            .map(|r| r.data_since(since))
            .ok_or_else(|| TrackerError::NotFound(format!("remote run {:?} of {}", by, user)))
    }

    async fn list_runs(&self, until: Option<i64>, limit: usize) -> Result<Vec<RunProjection>> {
        self.check_online("list")?;
        let mut runs: Vec<RunProjection> = self
            .runs()
            .values()
            .filter(|r| r.run.is_finished())
            .filter(|r| match (until, r.run.start) {
                (Some(until), Some(start)) => start < until,
                _ => true,
            })
            .map(|r| r.data_since(None).into())
            .collect();
        runs.sort_by(|a, b| b.run.start.cmp(&a.run.start));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn list_runs_since(&self, since: i64) -> Result<Vec<RunProjection>> {
        self.check_online("list_since")?;
        let mut runs: Vec<RunProjection> = self
            .runs()
            .values()
            .filter(|r| r.run.start.is_some_and(|s| s >= since))
            .map(|r| r.data_since(None).into())
            .collect();
        runs.sort_by_key(|p| p.run.start);
        Ok(runs)
    }

    async fn unfinished_run(&self) -> Result<Option<RunData>> {
        self.check_online("unfinished")?;
        Ok(self
            .runs()
            .values()
            .filter(|r| r.run.start.is_some() && !r.run.is_finished())
            .max_by_key(|r| r.run.start)
            .map(|r| r.data_since(None)))
    }

    async fn delete_run(&self, id: i64) -> Result<()> {
        self.check_online("delete")?;
        let mut runs = self.runs();
        let before = runs.len();
        runs.retain(|key, _| key.id != id);
        if runs.len() == before {
            return Err(TrackerError::NotFound(format!("remote run {}", id)));
        }
        Ok(())
    }

    async fn ranking_feed(&self, event: &str) -> Result<RankingStream> {
        self.ranking_connects.fetch_add(1, Ordering::SeqCst);
        self.check_online("ranking")?;
        if take_failure(&self.fail_ranking_connects) {
            return Err(TrackerError::RemoteUnavailable(
                "Mock ranking connect failure".to_string(),
            ));
        }
        let rx = self
            .rankings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_insert_with(|| broadcast::channel(16).0)
            .subscribe();

        let feed = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(ranking) => return Some((Ok(ranking), rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(feed.boxed())
    }
}
