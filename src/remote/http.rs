// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP client for the remote run service.
//!
//! Handles:
//! - Run creation and incremental updates
//! - Run lookups by id, room or event
//! - Run list queries
//! - The newline-delimited JSON ranking feed

use futures_util::{stream, StreamExt};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{Result, TrackerError};
use crate::models::{RankingEntry, Run, RunData, RunProjection, RunRef};
use crate::remote::{RankingStream, RemoteService};

/// Remote run service client.
#[derive(Clone)]
pub struct HttpRemote {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRemote {
    /// Create a client for `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| TrackerError::RemoteUnavailable(e.to_string()))?;
        check_response(response).await
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.send(self.http.get(url).query(query)).await?;
        parse_json(response).await
    }
}

/// Check response status and map failures to tracker errors.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(TrackerError::NotFound(if body.is_empty() {
            "remote run".to_string()
        } else {
            body
        }));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!("Remote run service rate limit hit (429)");
    }
    Err(TrackerError::RemoteUnavailable(format!(
        "HTTP {}: {}",
        status, body
    )))
}

async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| TrackerError::RemoteUnavailable(format!("JSON parse error: {}", e)))
}

fn run_ref_query(by: &RunRef) -> (&'static str, String) {
    match by {
        RunRef::Id(id) => ("id", id.to_string()),
        RunRef::Room(room) => ("room", room.clone()),
        RunRef::Event(event) => ("event", event.clone()),
    }
}

impl RemoteService for HttpRemote {
    async fn create_run(&self, run: &Run) -> Result<()> {
        let url = format!("{}/runs", self.base_url);
        self.send(self.http.post(&url).json(run)).await?;
        Ok(())
    }

    async fn update_run(&self, data: &RunData) -> Result<()> {
        let id = data
            .run
            .id
            .ok_or_else(|| TrackerError::Validation("run has no id".to_string()))?;
        let url = format!("{}/runs/{}", self.base_url, id);
        self.send(self.http.put(&url).json(data)).await?;
        Ok(())
    }

    async fn get_run_update(&self, user: &str, by: &RunRef, since: Option<i64>) -> Result<RunData> {
        let url = format!(
            "{}/users/{}/runs/update",
            self.base_url,
            urlencoding::encode(user)
        );
        let mut query = vec![run_ref_query(by)];
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }
        self.get_json(&url, &query).await
    }

    async fn list_runs(&self, until: Option<i64>, limit: usize) -> Result<Vec<RunProjection>> {
        let url = format!("{}/runs", self.base_url);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(until) = until {
            query.push(("until", until.to_string()));
        }
        self.get_json(&url, &query).await
    }

    async fn list_runs_since(&self, since: i64) -> Result<Vec<RunProjection>> {
        let url = format!("{}/runs/since", self.base_url);
        self.get_json(&url, &[("since", since.to_string())]).await
    }

    async fn unfinished_run(&self) -> Result<Option<RunData>> {
        let url = format!("{}/runs/unfinished", self.base_url);
        let response = self.send(self.http.get(&url)).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        parse_json(response).await
    }

    async fn delete_run(&self, id: i64) -> Result<()> {
        let url = format!("{}/runs/{}", self.base_url, id);
        self.send(self.http.delete(&url)).await?;
        Ok(())
    }

    async fn ranking_feed(&self, event: &str) -> Result<RankingStream> {
        let url = format!(
            "{}/events/{}/ranking",
            self.base_url,
            urlencoding::encode(event)
        );
        let response = self.send(self.http.get(&url)).await?;
        let bytes = Box::pin(response.bytes_stream());

        // One JSON array per line.
        let feed = stream::unfold((bytes, Vec::<u8>::new()), |(mut bytes, mut buffer)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let ranking = serde_json::from_slice::<Vec<RankingEntry>>(&line).map_err(|e| {
                        TrackerError::RemoteUnavailable(format!("Ranking parse error: {}", e))
                    });
                    return Some((ranking, (bytes, buffer)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        return Some((
                            Err(TrackerError::RemoteUnavailable(e.to_string())),
                            (bytes, buffer),
                        ))
                    }
                    None => return None,
                }
            }
        });

        Ok(feed.boxed())
    }
}
