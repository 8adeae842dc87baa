//! Per-session staging of chunked uploads.
//!
//! Each upload gets its own [`UploadId`] and temporary directory. Chunks are
//! written there as numbered files and only joined when the client completes
//! the session, so concurrent uploads never observe each other's data.
//! Dropping a session (completion, cancellation or expiry) removes its
//! directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use cf_core::{Error, Result, UploadId};

/// Staged chunks of one upload.
#[derive(Debug)]
pub struct UploadSession {
    id: UploadId,
    dir: TempDir,
    chunks: Vec<PathBuf>,
    total_bytes: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn id(&self) -> UploadId {
        self.id
    }

    /// Chunk files in upload order.
    pub fn chunks(&self) -> &[PathBuf] {
        &self.chunks
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Directory holding the staged chunks.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Acknowledgement for a stored chunk.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ChunkReceipt {
    #[schema(value_type = String)]
    pub upload_id: UploadId,
    pub index: usize,
    pub received_bytes: u64,
    pub total_bytes: u64,
}

/// `None` once the session has been taken for compilation.
type SessionSlot = Arc<Mutex<Option<UploadSession>>>;

/// Registry of in-progress uploads.
#[derive(Debug)]
pub struct UploadSessions {
    sessions: DashMap<UploadId, SessionSlot>,
    staging_root: PathBuf,
    max_upload_bytes: u64,
    ttl: Duration,
}

impl UploadSessions {
    /// Session directories are created under `staging_root`.
    pub fn new(staging_root: impl Into<PathBuf>, max_upload_bytes: u64, ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            staging_root: staging_root.into(),
            max_upload_bytes,
            ttl,
        }
    }

    /// Open a new, empty session.
    pub async fn create(&self) -> Result<UploadId> {
        let staging_root = self.staging_root.clone();
        let dir = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&staging_root)?;
            tempfile::Builder::new()
                .prefix(".upload-")
                .tempdir_in(&staging_root)
        })
        .await
        .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))??;

        let id = UploadId::new();
        let now = Utc::now();
        let session = UploadSession {
            id,
            dir,
            chunks: Vec::new(),
            total_bytes: 0,
            created_at: now,
            updated_at: now,
        };

        self.sessions.insert(id, Arc::new(Mutex::new(Some(session))));
        tracing::debug!(upload_id = %id, "Upload session created");
        Ok(id)
    }

    /// Store the next chunk of an upload.
    ///
    /// When `index` is given it must equal the number of chunks already
    /// stored; chunks are never reordered or overwritten.
    pub async fn append_chunk(
        &self,
        id: UploadId,
        index: Option<usize>,
        data: &[u8],
    ) -> Result<ChunkReceipt> {
        if data.is_empty() {
            return Err(Error::Validation("chunk is empty".into()));
        }

        let slot = self.slot(id)?;
        let mut guard = slot.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| Error::not_found("Upload", id))?;

        let next = session.chunks.len();
        if let Some(index) = index {
            if index != next {
                return Err(Error::Validation(format!(
                    "expected chunk index {next}, got {index}"
                )));
            }
        }

        let received = data.len() as u64;
        if session.total_bytes + received > self.max_upload_bytes {
            return Err(Error::PayloadTooLarge(format!(
                "upload would exceed {} bytes",
                self.max_upload_bytes
            )));
        }

        let path = session.dir.path().join(format!("chunk_{next:06}.part"));
        tokio::fs::write(&path, data).await?;

        session.chunks.push(path);
        session.total_bytes += received;
        session.updated_at = Utc::now();

        Ok(ChunkReceipt {
            upload_id: id,
            index: next,
            received_bytes: received,
            total_bytes: session.total_bytes,
        })
    }

    /// Remove a session from the registry and hand it over for compilation.
    ///
    /// Waits for an in-flight chunk write on the same session to finish.
    pub async fn take(&self, id: UploadId) -> Result<UploadSession> {
        let (_, slot) = self
            .sessions
            .remove(&id)
            .ok_or_else(|| Error::not_found("Upload", id))?;

        let mut guard = slot.lock().await;
        guard.take().ok_or_else(|| Error::not_found("Upload", id))
    }

    /// Discard a session and its chunks. Returns whether it existed.
    pub async fn remove(&self, id: UploadId) -> bool {
        match self.take(id).await {
            Ok(session) => {
                tracing::debug!(upload_id = %id, chunks = session.chunks.len(), "Upload session discarded");
                true
            }
            Err(_) => false,
        }
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle for longer than the configured TTL.
    ///
    /// Sessions that are currently locked (a chunk is being written) are
    /// active by definition and are skipped.
    pub fn reap_expired(&self) -> usize {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now() - ttl;

        let expired: Vec<UploadId> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                let guard = entry.value().try_lock().ok()?;
                let stale = matches!(guard.as_ref(), Some(s) if s.updated_at < cutoff);
                stale.then(|| *entry.key())
            })
            .collect();

        let mut reaped = 0;
        for id in expired {
            if let Some((_, slot)) = self.sessions.remove(&id) {
                if let Ok(mut guard) = slot.try_lock() {
                    guard.take();
                }
                reaped += 1;
                tracing::info!(upload_id = %id, "Expired upload session removed");
            }
        }
        reaped
    }

    fn slot(&self, id: UploadId) -> Result<SessionSlot> {
        self.sessions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found("Upload", id))
    }
}

/// Periodically reap expired sessions until cancelled.
pub async fn run_reaper(sessions: Arc<UploadSessions>, interval: Duration, cancel: CancellationToken) {
    tracing::info!("Upload session reaper started (interval {:?})", interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let reaped = sessions.reap_expired();
                if reaped > 0 {
                    tracing::info!(reaped, "Reaped expired upload sessions");
                }
            }
        }
    }

    tracing::info!("Upload session reaper stopped");
}
