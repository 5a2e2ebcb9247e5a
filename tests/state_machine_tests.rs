// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run lifecycle tests through the tracker actor.

mod common;

use common::{north, passthrough_tracking, test_engine, USER};
use run_tracker::db::LocalStore;
use run_tracker::error::TrackerError;
use run_tracker::models::{Location, LocationSample, Run, RunData, RunKey, RunRef, RunState};
use run_tracker::services::{RunTracker, UpdateOutcome};

#[tokio::test]
async fn test_full_lifecycle() {
    let (engine, local, _remote) = test_engine();
    let handle = RunTracker::spawn(engine.clone(), passthrough_tracking(), Run::new(USER), None);
    assert_eq!(handle.ready().await.unwrap().state, RunState::Ready);

    handle.start().await.unwrap();
    let id = handle.snapshot().id.expect("id assigned at start");
    assert_eq!(handle.snapshot().state, RunState::Running);

    handle.update(north(0.0, 1000)).await.unwrap();
    handle.update(north(25.0, 6000)).await.unwrap();
    handle.pause().await.unwrap();
    assert_eq!(handle.snapshot().state, RunState::Paused);

    handle.resume().await.unwrap();
    handle.stop(true).await.unwrap();
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, RunState::Ended);
    assert!(!snapshot.disqualified);
    assert!((snapshot.distance - 25.0).abs() < 0.1);

    let key = RunKey::new(USER, id);
    let stored = local.find_run(USER, &RunRef::Id(id)).await.unwrap();
    assert!(stored.end.is_some());
    let path = local.get_path_since(&key, None).await.unwrap();
    assert_eq!(path.len(), 3, "two samples plus the pause marker");
    assert!(path[2].end);

    handle.close().await;
}

#[tokio::test]
async fn test_failed_stop_leaves_store_consistent() {
    let (engine, local, _remote) = test_engine();
    let handle = RunTracker::spawn(engine.clone(), passthrough_tracking(), Run::new(USER), None);
    handle.start().await.unwrap();
    let key = RunKey::new(USER, handle.snapshot().id.unwrap());
    handle.update(north(0.0, 1000)).await.unwrap();

    // The end marker cannot be stored, so the whole stop must not be.
    local.set_fail_path_writes(true);
    assert!(matches!(
        handle.stop(true).await,
        Err(TrackerError::LocalStore(_))
    ));
    assert_eq!(handle.snapshot().state, RunState::Running);
    let stored = local.find_run(USER, &RunRef::Id(key.id)).await.unwrap();
    assert!(stored.end.is_none());
    assert!(!local.last_path(&key).await.unwrap().unwrap().end);

    // Hydrating from the store resumes the run, not an ended one.
    let resumed = RunTracker::spawn(
        engine,
        passthrough_tracking(),
        Run::new(USER).with_id(key.id),
        None,
    );
    assert_eq!(resumed.ready().await.unwrap().state, RunState::Running);
    resumed.close().await;

    local.set_fail_path_writes(false);
    handle.stop(true).await.unwrap();
    let stored = local.find_run(USER, &RunRef::Id(key.id)).await.unwrap();
    let last = local.last_path(&key).await.unwrap().unwrap();
    assert!(last.end);
    assert_eq!(stored.end, Some(last.time));
    handle.close().await;
}

#[tokio::test]
async fn test_invalid_transitions_leave_state_unchanged() {
    let (engine, _, _) = test_engine();
    let handle = RunTracker::spawn(engine, passthrough_tracking(), Run::new(USER), None);
    let before = handle.ready().await.unwrap();

    for result in [handle.pause().await, handle.resume().await] {
        assert!(matches!(
            result,
            Err(TrackerError::InvalidState {
                state: RunState::Ready,
                ..
            })
        ));
    }
    assert_eq!(handle.snapshot(), before);

    handle.start().await.unwrap();
    handle.stop(false).await.unwrap();
    let ended = handle.snapshot();
    assert!(ended.disqualified);
    assert!(matches!(
        handle.start().await,
        Err(TrackerError::InvalidState {
            op: "start",
            state: RunState::Ended
        })
    ));
    assert_eq!(handle.snapshot(), ended);
    handle.close().await;
}

#[tokio::test]
async fn test_samples_before_start_only_move_location() {
    let (engine, local, _) = test_engine();
    let handle = RunTracker::spawn(engine, passthrough_tracking(), Run::new(USER), None);
    handle.ready().await.unwrap();

    assert_eq!(
        handle.update(north(0.0, 1000)).await.unwrap(),
        UpdateOutcome::Located
    );
    let snapshot = handle.snapshot();
    assert!(snapshot.latitude.is_some());
    assert_eq!(snapshot.path_len, 0);
    assert!(local.unfinished_run(USER).await.unwrap().is_none());
    handle.close().await;
}

#[tokio::test]
async fn test_out_of_order_sample_dropped() {
    let (engine, _, _) = test_engine();
    let handle = RunTracker::spawn(engine, passthrough_tracking(), Run::new(USER), None);
    handle.start().await.unwrap();

    handle.update(north(0.0, 5000)).await.unwrap();
    assert_eq!(
        handle.update(north(10.0, 4000)).await.unwrap(),
        UpdateOutcome::Dropped
    );
    assert_eq!(
        handle
            .update(LocationSample::new(f64::NAN, 7.0, 100.0, 6000))
            .await
            .unwrap(),
        UpdateOutcome::Dropped
    );
    assert_eq!(handle.snapshot().path_len, 1);

    // Tracking continues normally after dropped samples.
    assert!(matches!(
        handle.update(north(10.0, 7000)).await.unwrap(),
        UpdateOutcome::Recorded(_)
    ));
    handle.close().await;
}

#[tokio::test]
async fn test_hydrates_unfinished_run_from_store() {
    let (engine, _, _) = test_engine();
    let mut run = Run::new(USER).with_id(42).in_room("park");
    run.start = Some(1000);
    run.running = 5000;
    engine.create_run(&run).await.unwrap();
    let point = run_tracker::models::PathPoint::at(&north(0.0, 2000));
    engine
        .update_run(&RunData::new(run, Location::Fix(point), vec![point]))
        .await
        .unwrap();

    let handle = RunTracker::spawn(
        engine,
        passthrough_tracking(),
        Run::new(USER).in_room("park"),
        None,
    );
    let snapshot = handle.ready().await.unwrap();
    assert_eq!(snapshot.state, RunState::Running);
    assert_eq!(snapshot.id, Some(42));
    assert_eq!(snapshot.path_len, 1);
    assert!(snapshot.running_ms >= 5000);

    handle.update(north(10.0, 3000)).await.unwrap();
    assert!((handle.snapshot().distance - 10.0).abs() < 0.1);
    handle.close().await;
}

#[tokio::test]
async fn test_hydration_failure_degrades_to_new_run() {
    let (engine, _, remote) = test_engine();
    remote.set_offline(true);

    // Not stored locally, and the remote lookup fails.
    let handle = RunTracker::spawn(
        engine,
        passthrough_tracking(),
        Run::new(USER).with_id(7),
        None,
    );
    let snapshot = handle.ready().await.unwrap();
    assert_eq!(snapshot.state, RunState::Ready);
    assert_eq!(snapshot.id, Some(7));
    handle.close().await;
}

#[tokio::test]
async fn test_snapshot_subscribers_see_updates() {
    let (engine, _, _) = test_engine();
    let handle = RunTracker::spawn(engine, passthrough_tracking(), Run::new(USER), None);
    let mut rx = handle.subscribe();
    handle.start().await.unwrap();

    let running = rx
        .wait_for(|s| s.state == RunState::Running)
        .await
        .unwrap()
        .clone();
    assert!(running.id.is_some());
    handle.close().await;
}
