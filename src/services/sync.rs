// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local-first synchronization.
//!
//! Writes land in the local store before anything is sent. Remote mirroring
//! runs on one worker task per run key, so the jobs for a run are processed
//! strictly in submission order. When a mirror fails a watermark is stored
//! locally; while a watermark exists every further job for that run is
//! replaced by a reconciliation, which resends everything after the
//! watermark in timestamp order.

use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::db::LocalStore;
use crate::error::{Result, TrackerError};
use crate::models::{Location, Run, RunData, RunKey, RunProjection, RunRef};
use crate::remote::RemoteService;

/// Work item for a per-run worker.
enum SyncJob {
    Create(Run),
    Update(RunData),
    Reconcile(oneshot::Sender<Result<bool>>),
    Flush(oneshot::Sender<()>),
}

struct Worker {
    tx: mpsc::UnboundedSender<SyncJob>,
    handle: JoinHandle<()>,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Runs brought fully up to date
    pub synced: usize,
    /// Runs still behind after this pass
    pub failed: usize,
    /// Runs skipped because a reconciliation was already queued
    pub skipped: usize,
}

struct Inner<L, R> {
    user: String,
    local: Arc<L>,
    remote: Arc<R>,
    workers: DashMap<RunKey, Worker>,
    /// Keys with a reconciliation queued or running
    reconciling: DashSet<RunKey>,
}

/// Local-first persistence with background remote mirroring.
pub struct SyncEngine<L, R> {
    inner: Arc<Inner<L, R>>,
}

impl<L, R> Clone for SyncEngine<L, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: LocalStore, R: RemoteService> SyncEngine<L, R> {
    /// Engine for the runs owned by `user` on this device.
    pub fn new(user: impl Into<String>, local: Arc<L>, remote: Arc<R>) -> Self {
        Self {
            inner: Arc::new(Inner {
                user: user.into(),
                local,
                remote,
                workers: DashMap::new(),
                reconciling: DashSet::new(),
            }),
        }
    }

    pub fn user(&self) -> &str {
        &self.inner.user
    }

    pub fn local(&self) -> &Arc<L> {
        &self.inner.local
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.inner.remote
    }

    /// Store a new run locally, then mirror it in the background.
    pub async fn create_run(&self, run: &Run) -> Result<()> {
        let key = run_key(run)?;
        self.inner.local.insert_run(run).await?;
        self.dispatch(&key, SyncJob::Create(run.clone()));
        Ok(())
    }

    /// Store run fields and new points locally, then mirror them in the background.
    pub async fn update_run(&self, data: &RunData) -> Result<()> {
        let key = run_key(&data.run)?;
        self.inner.local.commit_update(&data.run, &data.path).await?;
        self.dispatch(&key, SyncJob::Update(data.clone()));
        Ok(())
    }

    /// Queue `job` on the worker for `key`, starting the worker if needed.
    ///
    /// The send happens under the map entry lock, which a worker also needs
    /// to retire itself, so a job is never queued on a worker that is gone.
    /// Returns false if the job could not be queued.
    fn dispatch(&self, key: &RunKey, job: SyncJob) -> bool {
        let mut worker = self
            .inner
            .workers
            .entry(key.clone())
            .or_insert_with(|| self.spawn_worker(key));
        if worker.tx.is_closed() {
            tracing::warn!(run = %key, "Sync worker died; restarting");
            *worker = self.spawn_worker(key);
        }

        match worker.tx.send(job) {
            Ok(()) => true,
            Err(_) => {
                tracing::error!(run = %key, "Sync worker has exited; job dropped");
                false
            }
        }
    }

    fn spawn_worker(&self, key: &RunKey) -> Worker {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(Arc::clone(&self.inner), key.clone(), rx));
        Worker { tx, handle }
    }

    /// Number of runs with a live sync worker.
    pub fn active_workers(&self) -> usize {
        self.inner.workers.len()
    }

    /// Retry every run with a pending watermark.
    ///
    /// Each run is reconciled on its own worker, after any mirroring already
    /// queued for it.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let watermarks = self.inner.local.list_sync_watermarks().await?;
        let mut report = ReconcileReport::default();
        let mut pending = Vec::new();

        for mark in watermarks {
            if !self.inner.reconciling.insert(mark.key.clone()) {
                report.skipped += 1;
                continue;
            }
            let (tx, rx) = oneshot::channel();
            if !self.dispatch(&mark.key, SyncJob::Reconcile(tx)) {
                self.inner.reconciling.remove(&mark.key);
                report.failed += 1;
                continue;
            }
            pending.push((mark.key, rx));
        }

        for (key, rx) in pending {
            match rx.await {
                Ok(Ok(true)) => report.synced += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(run = %key, error = %e, "Reconciliation failed");
                    report.failed += 1;
                }
                Err(_) => report.failed += 1,
            }
        }

        if report != ReconcileReport::default() {
            tracing::info!(
                synced = report.synced,
                failed = report.failed,
                skipped = report.skipped,
                "Reconciliation pass complete"
            );
        }
        Ok(report)
    }

    /// Reconcile every `interval`, starting immediately.
    pub fn spawn_reconciler(&self, interval: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.reconcile().await {
                    tracing::error!(error = %e, "Failed to list pending runs");
                }
            }
        })
    }

    /// Wait until everything queued so far for `key` has been processed.
    pub async fn flush(&self, key: &RunKey) {
        let tx = match self.inner.workers.get(key) {
            Some(worker) => worker.tx.clone(),
            None => return,
        };
        let (reply, done) = oneshot::channel();
        if tx.send(SyncJob::Flush(reply)).is_ok() {
            let _ = done.await;
        }
    }

    /// Stop all workers after they drain their queues.
    pub async fn shutdown(&self) {
        let keys: Vec<RunKey> = self.inner.workers.iter().map(|w| w.key().clone()).collect();
        for key in keys {
            if let Some((_, worker)) = self.inner.workers.remove(&key) {
                drop(worker.tx);
                if let Err(e) = worker.handle.await {
                    tracing::error!(run = %key, error = %e, "Sync worker panicked");
                }
            }
        }
    }

    /// Run data with points after `since`.
    ///
    /// The owner's runs are read locally, falling back to the remote when the
    /// run is not on this device; a full remote read is written back locally.
    /// Other users' runs always come from the remote.
    pub async fn get_update(&self, user: &str, by: &RunRef, since: Option<i64>) -> Result<RunData> {
        if user != self.inner.user {
            return self.inner.remote.get_run_update(user, by, since).await;
        }

        match self.local_update(user, by, since).await {
            Ok(data) => return Ok(data),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        tracing::debug!(user, by = ?by, "Run not stored locally; asking remote");
        let data = self.inner.remote.get_run_update(user, by, since).await?;
        if since.is_none() {
            if let Err(e) = self.write_back(&data).await {
                tracing::warn!(user, error = %e, "Failed to store remote run locally");
            }
        }
        Ok(data)
    }

    async fn local_update(&self, user: &str, by: &RunRef, since: Option<i64>) -> Result<RunData> {
        let local = &self.inner.local;
        let run = local.find_run(user, by).await?;
        let key = run_key(&run)?;
        let path = local.get_path_since(&key, since).await?;
        let location = local.last_path(&key).await?.into();
        Ok(RunData::new(run, location, path))
    }

    async fn write_back(&self, data: &RunData) -> Result<()> {
        let key = run_key(&data.run)?;
        self.inner.local.insert_run(&data.run).await?;
        if !data.path.is_empty() {
            self.inner.local.append_path(&key, &data.path).await?;
        }
        Ok(())
    }

    /// Finished runs, newest first, started before `until`.
    pub async fn list_runs(&self, until: Option<i64>, limit: usize) -> Result<Vec<RunProjection>> {
        match self.inner.remote.list_runs(until, limit).await {
            Ok(runs) => Ok(runs),
            Err(e) => {
                tracing::warn!(error = %e, "Remote run list unavailable; using local runs");
                let runs = self
                    .inner
                    .local
                    .list_finished_runs(&self.inner.user, until, limit)
                    .await?;
                self.project(runs).await
            }
        }
    }

    /// Runs started at or after `since`.
    pub async fn list_runs_since(&self, since: i64) -> Result<Vec<RunProjection>> {
        match self.inner.remote.list_runs_since(since).await {
            Ok(runs) => Ok(runs),
            Err(e) => {
                tracing::warn!(error = %e, since, "Remote run list unavailable; using local runs");
                let runs = self
                    .inner
                    .local
                    .list_runs_since(&self.inner.user, since)
                    .await?;
                self.project(runs).await
            }
        }
    }

    /// The owner's started but unfinished run, if any.
    pub async fn unfinished_run(&self) -> Result<Option<RunData>> {
        match self.inner.remote.unfinished_run().await {
            Ok(data) => Ok(data),
            Err(e) => {
                tracing::warn!(error = %e, "Remote unavailable; checking local unfinished run");
                let Some(run) = self.inner.local.unfinished_run(&self.inner.user).await? else {
                    return Ok(None);
                };
                let key = run_key(&run)?;
                let path = self.inner.local.get_path_since(&key, None).await?;
                let location = path.last().copied().into();
                Ok(Some(RunData::new(run, location, path)))
            }
        }
    }

    async fn project(&self, runs: Vec<Run>) -> Result<Vec<RunProjection>> {
        let mut projections = Vec::with_capacity(runs.len());
        for run in runs {
            let location = match run.key() {
                Some(key) => self.inner.local.last_path(&key).await?.into(),
                None => Location::NoFix,
            };
            projections.push(RunProjection { run, location });
        }
        Ok(projections)
    }

    /// Delete one of the owner's runs locally and, best effort, remotely.
    pub async fn delete_run(&self, id: i64) -> Result<()> {
        let key = RunKey::new(self.inner.user.clone(), id);
        if let Some((_, worker)) = self.inner.workers.remove(&key) {
            drop(worker.tx);
            let _ = worker.handle.await;
        }
        self.inner.reconciling.remove(&key);
        self.inner.local.delete_run(&key).await?;

        if let Err(e) = self.inner.remote.delete_run(id).await {
            tracing::warn!(run = %key, error = %e, "Remote delete failed");
        }
        tracing::info!(run = %key, "Run deleted");
        Ok(())
    }
}

fn run_key(run: &Run) -> Result<RunKey> {
    run.key()
        .ok_or_else(|| TrackerError::Validation("run has no id".to_string()))
}

/// Process jobs for one run until its queue closes, or until the run has
/// ended and is fully synchronized.
async fn run_worker<L: LocalStore, R: RemoteService>(
    inner: Arc<Inner<L, R>>,
    key: RunKey,
    mut rx: mpsc::UnboundedReceiver<SyncJob>,
) {
    // Time of the newest point this worker has delivered to the remote.
    let mut acked: Option<i64> = None;
    let mut ended = false;

    while let Some(job) = rx.recv().await {
        match job {
            SyncJob::Create(run) => {
                ended = run.is_finished();
                if let Err(e) = inner.mirror_create(&key, &run, &mut acked).await {
                    tracing::error!(run = %key, error = %e, "Failed to record pending create");
                }
            }
            SyncJob::Update(data) => {
                ended = data.run.is_finished();
                if let Err(e) = inner.mirror_update(&key, data, &mut acked).await {
                    tracing::error!(run = %key, error = %e, "Failed to record pending update");
                }
            }
            SyncJob::Reconcile(reply) => {
                let result = inner.reconcile_key(&key, &mut acked).await;
                inner.reconciling.remove(&key);
                let _ = reply.send(result);
                ended = inner.is_ended(&key).await;
            }
            SyncJob::Flush(reply) => {
                let _ = reply.send(());
            }
        }

        if ended && inner.is_synced(&key).await && inner.retire(&key, &rx) {
            tracing::debug!(run = %key, "Run fully synchronized; sync worker retired");
            return;
        }
    }
    tracing::debug!(run = %key, "Sync worker stopped");
}

impl<L: LocalStore, R: RemoteService> Inner<L, R> {
    async fn is_ended(&self, key: &RunKey) -> bool {
        self.local
            .find_run(&key.user, &RunRef::Id(key.id))
            .await
            .is_ok_and(|run| run.is_finished())
    }

    async fn is_synced(&self, key: &RunKey) -> bool {
        matches!(self.local.get_sync_watermark(key).await, Ok(None))
    }

    /// Drop this worker from the map if nothing is queued for it.
    fn retire(&self, key: &RunKey, rx: &mpsc::UnboundedReceiver<SyncJob>) -> bool {
        self.workers.remove_if(key, |_, _| rx.is_empty()).is_some()
    }

    /// True when the run is behind and must be reconciled instead of mirrored.
    async fn is_behind(&self, key: &RunKey, acked: &mut Option<i64>) -> Result<bool> {
        if self.local.get_sync_watermark(key).await?.is_none() {
            return Ok(false);
        }
        if let Err(e) = self.reconcile_key(key, acked).await {
            tracing::warn!(run = %key, error = %e, "Run still out of sync");
        }
        Ok(true)
    }

    async fn mirror_create(&self, key: &RunKey, run: &Run, acked: &mut Option<i64>) -> Result<()> {
        if self.is_behind(key, acked).await? {
            return Ok(());
        }
        match self.remote.create_run(run).await {
            Ok(()) => {
                tracing::info!(run = %key, "Run created remotely");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(run = %key, error = %e, "Remote create failed; queued for sync");
                self.local.put_sync_watermark(key, None).await
            }
        }
    }

    async fn mirror_update(
        &self,
        key: &RunKey,
        mut data: RunData,
        acked: &mut Option<i64>,
    ) -> Result<()> {
        if self.is_behind(key, acked).await? {
            return Ok(());
        }
        // A reconciliation may already have delivered points queued here.
        if let Some(acked) = *acked {
            data.path.retain(|p| p.time > acked);
        }

        match self.remote.update_run(&data).await {
            Ok(()) => {
                if let Some(last) = data.path.last() {
                    *acked = Some(last.time);
                }
                tracing::debug!(run = %key, points = data.path.len(), "Run updated remotely");
                Ok(())
            }
            Err(e) => {
                let since = match data.path.first() {
                    Some(first) => Some(first.time - 1),
                    None => (*acked).or(data.location.fix().map(|p| p.time)),
                };
                tracing::warn!(
                    run = %key,
                    since = ?since,
                    error = %e,
                    "Remote update failed; queued for sync"
                );
                self.local.put_sync_watermark(key, since).await
            }
        }
    }

    /// Resend everything after the watermark. Returns false if none was set.
    async fn reconcile_key(&self, key: &RunKey, acked: &mut Option<i64>) -> Result<bool> {
        let Some(mark) = self.local.get_sync_watermark(key).await? else {
            return Ok(false);
        };
        let run = self.local.find_run(&key.user, &RunRef::Id(key.id)).await?;

        if mark.since.is_none() {
            self.remote.create_run(&run).await?;
            tracing::info!(run = %key, "Run created remotely during reconciliation");
        }

        let path = self.local.get_path_since(key, mark.since).await?;
        let location = self.local.last_path(key).await?.into();
        let data = RunData::new(run, location, path);

        match self.remote.update_run(&data).await {
            Ok(()) => {
                self.local.delete_sync_watermark(key).await?;
                if let Some(last) = data.path.last() {
                    *acked = Some(last.time);
                }
                tracing::info!(
                    run = %key,
                    since = ?mark.since,
                    points = data.path.len(),
                    "Run reconciled"
                );
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(run = %key, "Remote lost the run; will recreate");
                self.local.put_sync_watermark(key, None).await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{LocationSample, PathPoint};
    use crate::remote::MockRemote;

    fn engine() -> (SyncEngine<MemoryStore, MockRemote>, Arc<MemoryStore>, Arc<MockRemote>) {
        let local = Arc::new(MemoryStore::new());
        let remote = Arc::new(MockRemote::new());
        let engine = SyncEngine::new("alice", Arc::clone(&local), Arc::clone(&remote));
        (engine, local, remote)
    }

    fn started() -> Run {
        let mut run = Run::new("alice").with_id(100);
        run.start = Some(100);
        run
    }

    fn point(time: i64) -> PathPoint {
        PathPoint::at(&LocationSample::new(45.0, 7.0, 0.0, time))
    }

    #[tokio::test]
    async fn test_local_write_failure_is_fatal() {
        let (engine, local, remote) = engine();
        local.set_fail_writes(true);
        assert!(matches!(
            engine.create_run(&started()).await,
            Err(TrackerError::LocalStore(_))
        ));
        let key = RunKey::new("alice", 100);
        engine.flush(&key).await;
        assert_eq!(remote.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_sets_empty_watermark() {
        let (engine, local, remote) = engine();
        let key = RunKey::new("alice", 100);
        remote.fail_next_creates(1);

        engine.create_run(&started()).await.unwrap();
        engine.flush(&key).await;

        let mark = local.get_sync_watermark(&key).await.unwrap().unwrap();
        assert_eq!(mark.since, None);

        let report = engine.reconcile().await.unwrap();
        assert_eq!(report.synced, 1);
        assert!(remote.run(&key).is_some());
        assert!(local.get_sync_watermark(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_run_without_id_is_rejected() {
        let (engine, _, _) = engine();
        assert!(matches!(
            engine.create_run(&Run::new("alice")).await,
            Err(TrackerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_without_watermarks_is_noop() {
        let (engine, _, remote) = engine();
        let report = engine.reconcile().await.unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(remote.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_behind_watermark_is_reconciled() {
        let (engine, local, remote) = engine();
        let key = RunKey::new("alice", 100);
        let run = started();

        engine.create_run(&run).await.unwrap();
        remote.fail_next_updates(1);
        engine
            .update_run(&RunData::new(run.clone(), Location::Fix(point(200)), vec![point(200)]))
            .await
            .unwrap();
        engine.flush(&key).await;
        let mark = local.get_sync_watermark(&key).await.unwrap().unwrap();
        assert_eq!(mark.since, Some(199));

        engine
            .update_run(&RunData::new(run, Location::Fix(point(300)), vec![point(300)]))
            .await
            .unwrap();
        engine.flush(&key).await;

        let times: Vec<i64> = remote.path(&key).iter().map(|p| p.time).collect();
        assert_eq!(times, vec![200, 300]);
        assert!(local.get_sync_watermark(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_local_and_remote() {
        let (engine, local, remote) = engine();
        let key = RunKey::new("alice", 100);
        engine.create_run(&started()).await.unwrap();
        engine.flush(&key).await;
        assert!(remote.run(&key).is_some());

        engine.delete_run(100).await.unwrap();
        assert!(remote.run(&key).is_none());
        assert!(local
            .find_run("alice", &RunRef::Id(100))
            .await
            .unwrap_err()
            .is_not_found());
    }
}
