// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run-Tracker replay tool
//!
//! Feeds newline-delimited location samples (from a file or stdin) through
//! a tracked run, persisting locally and mirroring to the remote service.

use run_tracker::{
    config::Config,
    db::FileStore,
    error::TrackerError,
    models::{LocationSample, Run},
    remote::HttpRemote,
    services::{RouteService, RunHandle, RunTracker, SyncEngine, UpdateOutcome},
    time_utils::format_millis_rfc3339,
};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(user = %config.user, remote = %config.remote_base_url, "Starting Run-Tracker");

    let local = Arc::new(FileStore::open(&config.store_path).await?);
    tracing::info!(path = %config.store_path, "Local store opened");

    let remote = Arc::new(HttpRemote::new(
        config.remote_base_url.clone(),
        config.remote_token.clone(),
    ));
    let engine = SyncEngine::new(config.user.clone(), local, remote);
    let reconciler = engine.spawn_reconciler(config.reconcile_interval);

    // Optional supervised event route
    let mut template = Run::new(config.user.clone());
    let mut route = None;
    if let Ok(event) = std::env::var("EVENT_ID") {
        if let Ok(path) = std::env::var("EVENT_ROUTE_PATH") {
            tracing::info!(path = %path, "Loading event routes");
            let routes = RouteService::load_from_file(&path, &config.tracking.route)?;
            route = routes.get(&event).cloned();
            if route.is_none() {
                tracing::warn!(event = %event, "Event route not found in file");
            }
        }
        template = template.for_event(event);
    }

    let handle = RunTracker::spawn(engine.clone(), config.tracking.clone(), template, route);
    handle.ready().await?;
    handle.start().await?;

    let (recorded, filtered, dropped) = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(path = %path, "Replaying samples from file");
            let file = tokio::fs::File::open(&path).await?;
            replay(&handle, BufReader::new(file)).await?
        }
        None => replay(&handle, BufReader::new(tokio::io::stdin())).await?,
    };

    // A route may already have ended the run.
    if let Err(e) = handle.stop(true).await {
        tracing::info!(error = %e, "Run was already stopped");
    }
    let snapshot = handle.snapshot();
    handle.close().await;

    reconciler.abort();
    let report = engine.reconcile().await?;
    engine.shutdown().await;

    tracing::info!(
        run_id = ?snapshot.id,
        started = %snapshot.id.map(format_millis_rfc3339).unwrap_or_default(),
        distance_m = snapshot.distance,
        kcal = snapshot.kcal,
        running_ms = snapshot.running_ms,
        disqualified = snapshot.disqualified,
        recorded,
        filtered,
        dropped,
        pending = report.failed,
        "Replay finished"
    );
    Ok(())
}

/// Feed every line of `reader` to the tracker. Returns (recorded, filtered, dropped).
async fn replay<B: AsyncBufRead + Unpin>(
    handle: &RunHandle,
    reader: B,
) -> Result<(usize, usize, usize), Box<dyn std::error::Error>> {
    let mut lines = reader.lines();
    let (mut recorded, mut filtered, mut dropped) = (0, 0, 0);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let sample: LocationSample = match serde_json::from_str(&line) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed sample line");
                dropped += 1;
                continue;
            }
        };
        match handle.update(sample).await {
            Ok(UpdateOutcome::Recorded(_)) => recorded += 1,
            Ok(UpdateOutcome::Filtered) => filtered += 1,
            Ok(UpdateOutcome::Dropped) => dropped += 1,
            Ok(UpdateOutcome::Ignored) => break,
            Ok(UpdateOutcome::Located) => {}
            Err(e @ TrackerError::LocalStore(_)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(error = %e, "Sample rejected");
                dropped += 1;
            }
        }
    }
    Ok((recorded, filtered, dropped))
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("run_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
