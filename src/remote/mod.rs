// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote run service.
//!
//! Only the data shapes matter to the tracking core; `HttpRemote` is the
//! production transport and `MockRemote` an in-memory stand-in.

pub mod http;
pub mod mock;

pub use http::HttpRemote;
pub use mock::MockRemote;

use futures_util::stream::BoxStream;
use std::future::Future;

use crate::error::Result;
use crate::models::{RankingEntry, Run, RunData, RunProjection, RunRef};

/// Push-style feed of ranked lists for one event.
pub type RankingStream = BoxStream<'static, Result<Vec<RankingEntry>>>;

/// Logical operations offered by the remote service.
///
/// Transport and server failures surface as `RemoteUnavailable`; an absent
/// run as `NotFound`.
pub trait RemoteService: Send + Sync + 'static {
    fn create_run(&self, run: &Run) -> impl Future<Output = Result<()>> + Send;

    /// `data.path` carries only the points appended since the last sync.
    fn update_run(&self, data: &RunData) -> impl Future<Output = Result<()>> + Send;

    fn get_run_update(
        &self,
        user: &str,
        by: &RunRef,
        since: Option<i64>,
    ) -> impl Future<Output = Result<RunData>> + Send;

    fn list_runs(
        &self,
        until: Option<i64>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RunProjection>>> + Send;

    fn list_runs_since(&self, since: i64) -> impl Future<Output = Result<Vec<RunProjection>>> + Send;

    fn unfinished_run(&self) -> impl Future<Output = Result<Option<RunData>>> + Send;

    fn delete_run(&self, id: i64) -> impl Future<Output = Result<()>> + Send;

    fn ranking_feed(&self, event: &str) -> impl Future<Output = Result<RankingStream>> + Send;
}
