//! Filesystem-backed media store.
//!
//! Maps a [`VideoId`] to `{root}/{id}.webm` and produces lazily-read byte
//! streams over those files. Nothing is cached: existence and size come from
//! the filesystem on every call, so the store can never disagree with what
//! the ingestion pipeline actually wrote.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

use cf_av::Workspace;
use cf_core::config::StorageConfig;
use cf_core::{Container, Error, Result, VideoId, STORED_CONTAINER};

/// Read buffer used when the configured size is zero.
const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// A byte stream over part of a stored file.
///
/// Owns its file handle; dropping the stream (on completion, client
/// disconnect or error) closes the file.
pub type ByteStream = ReaderStream<Take<File>>;

/// A stored video as reported by [`MediaStore::list`].
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct VideoEntry {
    #[schema(value_type = String)]
    pub id: VideoId,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Resolves video identifiers to files under a storage root.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    container: Container,
    read_chunk_size: usize,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, read_chunk_size: usize) -> Self {
        let read_chunk_size = if read_chunk_size == 0 {
            DEFAULT_READ_CHUNK
        } else {
            read_chunk_size
        };

        Self {
            root: root.into(),
            container: STORED_CONTAINER,
            read_chunk_size,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root, config.read_chunk_size)
    }

    /// Create the storage root if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Container every stored file is written in.
    pub fn container(&self) -> Container {
        self.container
    }

    /// Deterministic path of the file backing `id`.
    pub fn path_for(&self, id: &VideoId) -> PathBuf {
        self.root
            .join(format!("{}.{}", id, self.container.extension()))
    }

    /// Whether a regular file backs `id` right now.
    pub async fn exists(&self, id: &VideoId) -> bool {
        tokio::fs::metadata(self.path_for(id))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Current byte length of the file backing `id`.
    pub async fn size(&self, id: &VideoId) -> Result<u64> {
        let metadata = tokio::fs::metadata(self.path_for(id))
            .await
            .map_err(|e| not_found_or_io(e, id))?;

        if !metadata.is_file() {
            return Err(Error::not_found("Video", id));
        }
        Ok(metadata.len())
    }

    /// Stream bytes `[start, end]` (inclusive) of the file backing `id`.
    ///
    /// The range is checked against the size of the opened handle and is
    /// never clamped.
    pub async fn open_range(&self, id: &VideoId, start: u64, end: u64) -> Result<ByteStream> {
        let (mut file, size) = self.open(id).await?;

        if start > end || end >= size {
            return Err(Error::invalid_range(format!("bytes={start}-{end}"), size));
        }

        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }

        Ok(ReaderStream::with_capacity(
            file.take(end - start + 1),
            self.read_chunk_size,
        ))
    }

    /// Stream the whole file backing `id`.
    ///
    /// Same bytes as `open_range(id, 0, size - 1)`; an empty file yields an
    /// empty stream.
    pub async fn open_full(&self, id: &VideoId) -> Result<ByteStream> {
        let (file, size) = self.open(id).await?;
        Ok(ReaderStream::with_capacity(file.take(size), self.read_chunk_size))
    }

    /// Start a staging workspace whose output becomes the file for `id`.
    pub fn workspace(&self, id: &VideoId) -> Result<Workspace> {
        Workspace::new(&self.path_for(id))
    }

    /// Move a finished workspace into place and return the stored size.
    pub async fn persist(&self, workspace: Workspace) -> Result<u64> {
        let path = tokio::task::spawn_blocking(move || workspace.finalize())
            .await
            .map_err(|e| Error::Internal(format!("spawn_blocking join error: {e}")))??;

        let size = tokio::fs::metadata(&path).await?.len();
        tracing::info!(path = %path.display(), size, "Stored video");
        Ok(size)
    }

    /// List every stored video, sorted by id.
    ///
    /// Staging directories and files that are not valid video names are
    /// skipped. A missing root lists as empty.
    pub async fn list(&self) -> Result<Vec<VideoEntry>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if cf_av::is_staging_name(name) {
                continue;
            }
            let Some(id) = self.id_from_file_name(name) else {
                continue;
            };

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            entries.push(VideoEntry {
                id,
                size_bytes: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    fn id_from_file_name(&self, name: &str) -> Option<VideoId> {
        let stem = name.strip_suffix(self.container.extension())?.strip_suffix('.')?;
        stem.parse().ok()
    }

    async fn open(&self, id: &VideoId) -> Result<(File, u64)> {
        let file = File::open(self.path_for(id))
            .await
            .map_err(|e| not_found_or_io(e, id))?;

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(Error::not_found("Video", id));
        }
        Ok((file, metadata.len()))
    }
}

fn not_found_or_io(e: std::io::Error, id: &VideoId) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::not_found("Video", id)
    } else {
        Error::from(e)
    }
}
