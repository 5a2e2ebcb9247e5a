// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run tracker actor.
//!
//! Each tracked run lives in its own task which owns the [`RunSession`].
//! Callers talk to it through a [`RunHandle`]; commands are applied one at a
//! time, and every applied command publishes a fresh [`RunSnapshot`].

use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::TrackingConfig;
use crate::db::LocalStore;
use crate::error::{Result, TrackerError};
use crate::models::{EventRoute, LocationSample, Run, RunRef, RunSnapshot, RunState};
use crate::remote::RemoteService;
use crate::services::session::{Persist, RunSession, UpdateOutcome};
use crate::services::sync::SyncEngine;
use crate::time_utils::now_millis;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Start(Reply<()>),
    Pause(Reply<()>),
    Resume(Reply<()>),
    Stop { regular: bool, reply: Reply<()> },
    Update {
        sample: LocationSample,
        reply: Reply<UpdateOutcome>,
    },
}

/// Handle to a running tracker task. Dropping it stops the task.
pub struct RunHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<RunSnapshot>,
    task: JoinHandle<()>,
}

/// Spawns run trackers.
pub struct RunTracker;

impl RunTracker {
    /// Start tracking `template`.
    ///
    /// If the template names a run (by id, room or event) that already exists
    /// it is resumed; otherwise a new run is prepared.
    pub fn spawn<L: LocalStore, R: RemoteService>(
        engine: SyncEngine<L, R>,
        config: TrackingConfig,
        template: Run,
        route: Option<EventRoute>,
    ) -> RunHandle {
        let (commands, rx) = mpsc::channel(32);
        let (snapshot_tx, snapshot) = watch::channel(RunSnapshot::loading());
        let tick_interval = config.tick_interval;
        let actor = Actor {
            engine,
            session: RunSession::new(config, route),
            snapshot: snapshot_tx,
        };
        let task = tokio::spawn(actor.run(template, rx, tick_interval));

        RunHandle {
            commands,
            snapshot,
            task,
        }
    }
}

impl RunHandle {
    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| TrackerError::Internal(anyhow::anyhow!("run tracker stopped")))?;
        rx.await
            .map_err(|_| TrackerError::Internal(anyhow::anyhow!("run tracker dropped reply")))?
    }

    pub async fn start(&self) -> Result<()> {
        self.call(Command::Start).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.call(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.call(Command::Resume).await
    }

    /// End the run. `regular == false` aborts and disqualifies it.
    pub async fn stop(&self, regular: bool) -> Result<()> {
        self.call(|reply| Command::Stop { regular, reply }).await
    }

    pub async fn update(&self, sample: LocationSample) -> Result<UpdateOutcome> {
        self.call(|reply| Command::Update { sample, reply }).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the run has left the `Loading` state.
    pub async fn ready(&self) -> Result<RunSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| s.state != RunState::Loading)
            .await
            .map_err(|_| TrackerError::Internal(anyhow::anyhow!("run tracker stopped")))?;
        Ok(snapshot.clone())
    }

    /// Stop the task after it finishes pending commands.
    pub async fn close(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Run tracker panicked");
        }
    }
}

struct Actor<L, R> {
    engine: SyncEngine<L, R>,
    session: RunSession,
    snapshot: watch::Sender<RunSnapshot>,
}

impl<L: LocalStore, R: RemoteService> Actor<L, R> {
    async fn run(mut self, template: Run, mut rx: mpsc::Receiver<Command>, tick: Duration) {
        self.hydrate(template).await;

        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = ticker.tick() => {
                    if self.session.tick(now_millis()) {
                        self.publish();
                    }
                }
            }
        }
        tracing::debug!(run_id = ?self.session.run().and_then(|r| r.id), "Run tracker stopped");
    }

    async fn hydrate(&mut self, template: Run) {
        let by = if let Some(id) = template.id {
            Some(RunRef::Id(id))
        } else if let Some(room) = &template.room {
            Some(RunRef::Room(room.clone()))
        } else {
            template.event.as_ref().map(|e| RunRef::Event(e.clone()))
        };

        let stored = match by {
            Some(by) => match self.engine.get_update(&template.user, &by, None).await {
                Ok(data) => Some(data),
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    tracing::warn!(
                        user = %template.user,
                        by = ?by,
                        error = %e,
                        "Failed to load run; starting a new one"
                    );
                    None
                }
            },
            None => None,
        };

        if let Err(e) = self.session.hydrate(template, stored, now_millis()) {
            tracing::error!(error = %e, "Run hydrated twice");
        }
        self.publish();
    }

    async fn handle(&mut self, command: Command) {
        let now = now_millis();
        match command {
            Command::Start(reply) => {
                let result = self.apply(|s| s.start(now).map(|p| ((), Some(p)))).await;
                let _ = reply.send(result);
            }
            Command::Pause(reply) => {
                let result = self.apply(|s| s.pause(now).map(|p| ((), Some(p)))).await;
                let _ = reply.send(result);
            }
            Command::Resume(reply) => {
                let result = self.apply(|s| s.resume(now).map(|p| ((), Some(p)))).await;
                let _ = reply.send(result);
            }
            Command::Stop { regular, reply } => {
                let result = self.apply(|s| s.stop(now, regular).map(|p| ((), p))).await;
                let _ = reply.send(result);
            }
            Command::Update { sample, reply } => {
                let result = self.apply(|s| s.update(sample)).await;
                let _ = reply.send(result);
            }
        }
    }

    /// Run a transition and persist its effect, rolling back if the local
    /// write fails.
    async fn apply<T>(
        &mut self,
        transition: impl FnOnce(&mut RunSession) -> Result<(T, Option<Persist>)>,
    ) -> Result<T> {
        let checkpoint = self.session.checkpoint();
        let (value, persist) = transition(&mut self.session)?;

        if let Some(persist) = persist {
            let written = match &persist {
                Persist::Create(run) => self.engine.create_run(run).await,
                Persist::Update(data) => self.engine.update_run(data).await,
            };
            if let Err(e) = written {
                tracing::error!(error = %e, "Failed to persist run; rolling back");
                self.session.restore(checkpoint);
                return Err(e);
            }
        }

        self.publish();
        Ok(value)
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.session.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationFilterConfig;
    use crate::db::MemoryStore;
    use crate::remote::MockRemote;
    use std::sync::Arc;

    fn tracking() -> TrackingConfig {
        TrackingConfig {
            filter: LocationFilterConfig {
                lat_window: 1,
                lon_window: 1,
                alt_window: 1,
                radius: 0.0,
                rate: 1,
                max_update_interval_ms: 10_000,
            },
            ..TrackingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_new_run_becomes_ready() {
        let local = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new("alice", local, Arc::new(MockRemote::new()));
        let handle = RunTracker::spawn(engine, tracking(), Run::new("alice"), None);

        let snapshot = handle.ready().await.unwrap();
        assert_eq!(snapshot.state, RunState::Ready);
        assert_eq!(snapshot.id, None);
        handle.close().await;
    }

    #[tokio::test]
    async fn test_local_failure_rolls_back_start() {
        let local = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new("alice", Arc::clone(&local), Arc::new(MockRemote::new()));
        let handle = RunTracker::spawn(engine, tracking(), Run::new("alice"), None);
        handle.ready().await.unwrap();

        local.set_fail_writes(true);
        assert!(matches!(
            handle.start().await,
            Err(TrackerError::LocalStore(_))
        ));
        assert_eq!(handle.snapshot().state, RunState::Ready);

        local.set_fail_writes(false);
        handle.start().await.unwrap();
        assert_eq!(handle.snapshot().state, RunState::Running);
        handle.close().await;
    }

    #[tokio::test]
    async fn test_invalid_command_reports_state() {
        let engine = SyncEngine::new(
            "alice",
            Arc::new(MemoryStore::new()),
            Arc::new(MockRemote::new()),
        );
        let handle = RunTracker::spawn(engine, tracking(), Run::new("alice"), None);
        assert!(matches!(
            handle.resume().await,
            Err(TrackerError::InvalidState {
                op: "resume",
                state: RunState::Ready
            })
        ));
        handle.close().await;
    }
}
