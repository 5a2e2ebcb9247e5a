// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Crash-durable local store backed by a single JSON document.
//!
//! Every mutation rewrites the document to a sibling temp file, fsyncs it and
//! renames it over the previous version before returning, so a crash leaves
//! either the old or the new document on disk, never a torn one.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::db::records::StoreData;
use crate::db::{LocalStore, SyncWatermark};
use crate::error::{Result, TrackerError};
use crate::models::{PathPoint, Run, RunKey, RunRef};

/// JSON-file local store.
pub struct FileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                TrackerError::LocalStore(format!("Corrupt store {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => {
                return Err(TrackerError::LocalStore(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::info!(path = %path.display(), "Opened local run store");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T>(&self, f: impl FnOnce(&StoreData) -> Result<T>) -> Result<T> {
        let data = self.data.lock().await;
        f(&data)
    }

    /// Apply `f` to a copy, persist the copy, then publish it in memory.
    async fn write<T>(&self, f: impl FnOnce(&mut StoreData) -> Result<T>) -> Result<T> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *data = next;
        Ok(out)
    }

    async fn persist(&self, data: &StoreData) -> Result<()> {
        let bytes = serde_json::to_vec(data)
            .map_err(|e| TrackerError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let tmp = self.path.with_extension("tmp");
        let io_err = |e: std::io::Error| {
            TrackerError::LocalStore(format!("Failed to write {}: {}", self.path.display(), e))
        };

        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
        file.write_all(&bytes).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

impl LocalStore for FileStore {
    async fn insert_run(&self, run: &Run) -> Result<()> {
        self.write(|d| d.insert_run(run)).await
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        self.write(|d| d.update_run(run)).await
    }

    async fn append_path(&self, key: &RunKey, points: &[PathPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        self.write(|d| d.append_path(key, points)).await
    }

    async fn commit_update(&self, run: &Run, points: &[PathPoint]) -> Result<()> {
        self.write(|d| d.commit_update(run, points)).await
    }

    async fn find_run(&self, user: &str, by: &RunRef) -> Result<Run> {
        self.read(|d| d.find_run(user, by)).await
    }

    async fn get_path_since(&self, key: &RunKey, since: Option<i64>) -> Result<Vec<PathPoint>> {
        self.read(|d| d.get_path_since(key, since)).await
    }

    async fn last_path(&self, key: &RunKey) -> Result<Option<PathPoint>> {
        self.read(|d| d.last_path(key)).await
    }

    async fn list_finished_runs(
        &self,
        user: &str,
        until: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Run>> {
        self.read(|d| Ok(d.list_finished_runs(user, until, limit)))
            .await
    }

    async fn list_runs_since(&self, user: &str, since: i64) -> Result<Vec<Run>> {
        self.read(|d| Ok(d.list_runs_since(user, since))).await
    }

    async fn unfinished_run(&self, user: &str) -> Result<Option<Run>> {
        self.read(|d| Ok(d.unfinished_run(user))).await
    }

    async fn delete_run(&self, key: &RunKey) -> Result<()> {
        self.write(|d| d.delete_run(key)).await
    }

    async fn put_sync_watermark(&self, key: &RunKey, since: Option<i64>) -> Result<()> {
        self.write(|d| {
            d.put_watermark(key, since);
            Ok(())
        })
        .await
    }

    async fn get_sync_watermark(&self, key: &RunKey) -> Result<Option<SyncWatermark>> {
        self.read(|d| Ok(d.get_watermark(key))).await
    }

    async fn delete_sync_watermark(&self, key: &RunKey) -> Result<()> {
        self.write(|d| {
            d.delete_watermark(key);
            Ok(())
        })
        .await
    }

    async fn list_sync_watermarks(&self) -> Result<Vec<SyncWatermark>> {
        self.read(|d| Ok(d.list_watermarks())).await
    }
}
