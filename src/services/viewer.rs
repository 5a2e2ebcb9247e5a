// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-only view of another participant's run.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::LocalStore;
use crate::models::{Location, PathPoint, RunData, RunRef, RunSlot, RunSnapshot};
use crate::remote::RemoteService;
use crate::services::sync::SyncEngine;

/// Accumulated state of a viewed run.
#[derive(Debug, Default)]
struct ViewState {
    slot: RunSlot,
    location: Location,
    path: Vec<PathPoint>,
}

impl ViewState {
    fn since(&self) -> Option<i64> {
        self.path.last().map(|p| p.time)
    }

    /// Merge an incremental update; points already seen are skipped.
    fn merge(&mut self, data: RunData) {
        let since = self.since();
        self.path.extend(
            data.path
                .into_iter()
                .filter(|p| since.map_or(true, |since| p.time > since)),
        );
        self.location = match data.location {
            Location::NoFix => self.path.last().copied().into(),
            fix => fix,
        };
        self.slot = RunSlot::Active(data.run);
    }

    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot::from_parts(&self.slot, &self.location, &self.path)
    }
}

/// Polls a run and publishes snapshots until the run ends or the viewer is dropped.
pub struct RunViewer {
    snapshot: watch::Receiver<RunSnapshot>,
    task: JoinHandle<()>,
}

impl RunViewer {
    pub fn spawn<L: LocalStore, R: RemoteService>(
        engine: SyncEngine<L, R>,
        user: impl Into<String>,
        by: RunRef,
        interval: Duration,
    ) -> Self {
        let user = user.into();
        let (tx, snapshot) = watch::channel(RunSnapshot::loading());

        let task = tokio::spawn(async move {
            let mut state = ViewState::default();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match engine.get_update(&user, &by, state.since()).await {
                    Ok(data) => {
                        let finished = data.run.is_finished();
                        state.merge(data);
                        tx.send_replace(state.snapshot());
                        if finished {
                            tracing::info!(user = %user, by = ?by, "Viewed run has ended");
                            break;
                        }
                    }
                    Err(e) if e.is_not_found() => {
                        tracing::debug!(user = %user, by = ?by, "Viewed run not found yet");
                    }
                    Err(e) => {
                        tracing::warn!(user = %user, by = ?by, error = %e, "Failed to poll run");
                    }
                }
                if tx.is_closed() {
                    break;
                }
            }
        });

        Self { snapshot, task }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot.clone()
    }

    /// True once the polling loop has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RunViewer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LocationSample, Run};

    fn point(time: i64) -> PathPoint {
        PathPoint::at(&LocationSample::new(45.0, 7.0, 0.0, time))
    }

    #[test]
    fn test_merge_skips_seen_points() {
        let run = Run::new("bob").with_id(1);
        let mut state = ViewState::default();
        state.merge(RunData::new(run.clone(), Location::NoFix, vec![point(1), point(2)]));
        state.merge(RunData::new(run, Location::NoFix, vec![point(2), point(3)]));

        let times: Vec<i64> = state.path.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![1, 2, 3]);
        assert_eq!(state.location, Location::Fix(point(3)));
        assert_eq!(state.snapshot().path_len, 3);
    }
}
