// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live event ranking subscription.

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::RankingEntry;
use crate::remote::RemoteService;
use crate::retry::RetryPolicy;

/// Keeps the latest ranking of one event, reconnecting with backoff when
/// the feed fails or closes.
pub struct RankingSubscriber {
    ranking: watch::Receiver<Vec<RankingEntry>>,
    task: JoinHandle<()>,
}

impl RankingSubscriber {
    pub fn spawn<R: RemoteService>(
        remote: Arc<R>,
        event: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        let event = event.into();
        let (tx, ranking) = watch::channel(Vec::new());

        let task = tokio::spawn(async move {
            let mut attempt = 0;
            loop {
                match remote.ranking_feed(&event).await {
                    Ok(mut feed) => {
                        tracing::info!(event = %event, "Ranking feed connected");
                        attempt = 0;
                        while let Some(item) = feed.next().await {
                            match item {
                                Ok(entries) => {
                                    tx.send_replace(entries);
                                }
                                Err(e) => {
                                    tracing::warn!(event = %event, error = %e, "Ranking feed error");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(event = %event, attempt, error = %e, "Ranking feed unavailable");
                    }
                }

                if tx.is_closed() {
                    break;
                }
                let delay = policy.delay(attempt);
                tracing::debug!(event = %event, delay_ms = delay.as_millis() as u64, "Reconnecting ranking feed");
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        });

        Self { ranking, task }
    }

    /// Latest ranking; empty until the first list arrives.
    pub fn latest(&self) -> Vec<RankingEntry> {
        self.ranking.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<RankingEntry>> {
        self.ranking.clone()
    }
}

impl Drop for RankingSubscriber {
    fn drop(&mut self) {
        self.task.abort();
    }
}
