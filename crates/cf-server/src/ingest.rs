//! Turning uploads into stored videos.
//!
//! Both upload paths end here: a completed chunk session or a set of
//! multipart files is compiled into one WebM file inside a staging
//! workspace, persisted under a fresh [`VideoId`], then transcribed. The
//! transcript is handed to the queue publisher without waiting for it.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use cf_av::Workspace;
use cf_core::{CompileMode, Container, Error, Result, VideoId, STORED_CONTAINER};

use crate::context::AppContext;
use crate::queue;
use crate::sessions::UploadSession;
use crate::store::MediaStore;
use crate::transcription;

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    #[schema(value_type = String)]
    pub video_id: VideoId,
    /// Path the video is served from.
    pub video_link: String,
    pub size_bytes: u64,
    pub transcription: Option<String>,
    /// Why `transcription` is missing, when transcription was attempted.
    pub transcription_error: Option<String>,
}

/// Public link for a stored video.
pub fn video_link(id: &VideoId) -> String {
    format!("/videos/{id}.{}", STORED_CONTAINER.extension())
}

/// A whole file received through the multipart endpoint.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub container: Container,
    pub size_bytes: u64,
}

/// Files staged for one multipart upload, in arrival order.
#[derive(Debug)]
pub struct PendingUpload {
    id: VideoId,
    workspace: Workspace,
    files: Vec<StagedFile>,
}

impl PendingUpload {
    pub fn new(store: &MediaStore) -> Result<Self> {
        let id = VideoId::generate();
        let workspace = store.workspace(&id)?;
        Ok(Self {
            id,
            workspace,
            files: Vec::new(),
        })
    }

    /// Where the next file should be written.
    pub fn next_path(&self, container: Container) -> PathBuf {
        self.workspace.temp_file(&format!(
            "part_{:03}.{}",
            self.files.len(),
            container.extension()
        ))
    }

    pub fn push(&mut self, file: StagedFile) {
        self.files.push(file);
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Compile and store a finished chunk session.
///
/// The session is consumed; its staged chunks are deleted once the compiled
/// file exists, whether or not compilation succeeded.
pub async fn complete_session(ctx: &AppContext, session: UploadSession) -> Result<UploadResponse> {
    if session.chunks().is_empty() {
        return Err(Error::Validation("upload has no chunks".into()));
    }

    let id = VideoId::generate();
    let workspace = ctx.store.workspace(&id)?;

    tracing::info!(
        upload_id = %session.id(),
        video_id = %id,
        chunks = session.chunks().len(),
        bytes = session.total_bytes(),
        age_secs = (Utc::now() - session.created_at()).num_seconds(),
        "Compiling upload"
    );

    compile(ctx, &workspace, session.chunks()).await?;
    drop(session);

    let size = ctx.store.persist(workspace).await?;
    Ok(finish(ctx, id, size).await)
}

/// Compile and store files received in one multipart request.
///
/// A single non-WebM file is transcoded; several files must all be WebM and
/// are compiled like chunks.
pub async fn complete_files(ctx: &AppContext, pending: PendingUpload) -> Result<UploadResponse> {
    let PendingUpload {
        id,
        workspace,
        files,
    } = pending;

    match files.as_slice() {
        [] => return Err(Error::Validation("no files uploaded".into())),
        [single] if single.container != STORED_CONTAINER => {
            tracing::info!(video_id = %id, from = %single.container, "Transcoding upload");
            cf_av::transcode_to_webm(&ctx.tools, &single.path, &workspace.output()).await?;
        }
        files if files.iter().all(|f| f.container == STORED_CONTAINER) => {
            let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
            tracing::info!(video_id = %id, files = paths.len(), "Compiling upload");
            compile(ctx, &workspace, &paths).await?;
        }
        _ => {
            return Err(Error::Validation(format!(
                "multiple files must all be .{}",
                STORED_CONTAINER.extension()
            )))
        }
    }

    let size = ctx.store.persist(workspace).await?;
    Ok(finish(ctx, id, size).await)
}

/// Join `chunks` into the workspace output according to the compile mode.
async fn compile(ctx: &AppContext, workspace: &Workspace, chunks: &[PathBuf]) -> Result<()> {
    let ingest = &ctx.config.ingest;

    match ingest.compile_mode {
        CompileMode::Append if ingest.remux_after_compile => {
            let joined = workspace.temp_file(&format!("joined.{}", STORED_CONTAINER.extension()));
            cf_av::append_chunks(chunks, &joined).await?;
            cf_av::remux(&ctx.tools, &joined, &workspace.output()).await?;
        }
        CompileMode::Append => {
            cf_av::append_chunks(chunks, &workspace.output()).await?;
        }
        CompileMode::Ffmpeg => {
            cf_av::concat_with_ffmpeg(workspace, &ctx.tools, chunks).await?;
        }
    }
    Ok(())
}

/// Transcribe a stored video and queue the transcript.
///
/// Never fails: transcription problems are reported in the response.
async fn finish(ctx: &AppContext, id: VideoId, size_bytes: u64) -> UploadResponse {
    let mut response = UploadResponse {
        video_link: video_link(&id),
        video_id: id,
        size_bytes,
        transcription: None,
        transcription_error: None,
    };

    let Some(transcriber) = &ctx.transcriber else {
        return response;
    };

    let path = ctx.store.path_for(&response.video_id);
    let mime = ctx.store.container().mime_type();

    match transcription::transcribe_with_timeout(
        transcriber.as_ref(),
        &path,
        mime,
        ctx.transcription_timeout(),
    )
    .await
    {
        Ok(text) => {
            tracing::info!(video_id = %response.video_id, chars = text.len(), "Transcription complete");
            if let Some(publisher) = &ctx.publisher {
                queue::spawn_publish(publisher.clone(), text.clone(), ctx.queue_timeout());
            }
            response.transcription = Some(text);
        }
        Err(e) => {
            tracing::warn!(video_id = %response.video_id, error = %e, "Transcription failed");
            response.transcription_error = Some(e.to_string());
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use cf_av::ToolRegistry;
    use cf_core::config::Config;
    use tokio::sync::mpsc;

    use crate::queue::QueuePublisher;
    use crate::transcription::Transcriber;

    struct FixedTranscriber(std::result::Result<&'static str, &'static str>);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn transcribe(&self, path: &Path, mime_type: &str) -> Result<String> {
            assert!(path.exists());
            assert_eq!(mime_type, "video/webm");
            self.0
                .map(str::to_string)
                .map_err(|e| Error::upstream("fixed", e))
        }
    }

    struct ChannelPublisher(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl QueuePublisher for ChannelPublisher {
        fn name(&self) -> &'static str {
            "channel"
        }

        async fn publish(&self, payload: &str) -> Result<()> {
            let _ = self.0.send(payload.to_string());
            Ok(())
        }
    }

    fn context(root: &Path) -> AppContext {
        let mut config = Config::default();
        config.storage.root = root.to_path_buf();
        config.transcription.enabled = false;
        AppContext::from_config(config, ToolRegistry::empty())
    }

    async fn session_with(ctx: &AppContext, chunks: &[&[u8]]) -> UploadSession {
        let id = ctx.sessions.create().await.unwrap();
        for chunk in chunks {
            ctx.sessions.append_chunk(id, None, chunk).await.unwrap();
        }
        ctx.sessions.take(id).await.unwrap()
    }

    #[test]
    fn link_points_at_webm() {
        let id: VideoId = "abc".parse().unwrap();
        assert_eq!(video_link(&id), "/videos/abc.webm");
    }

    #[tokio::test]
    async fn append_mode_concatenates_bytes() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());
        let session = session_with(&ctx, &[b"hello ", b"chunked ", b"world"]).await;
        let staged = session.dir().to_path_buf();

        let resp = complete_session(&ctx, session).await.unwrap();
        assert_eq!(resp.size_bytes, 19);
        assert_eq!(resp.video_link, format!("/videos/{}.webm", resp.video_id));
        assert!(resp.transcription.is_none());
        assert!(resp.transcription_error.is_none());

        let stored = std::fs::read(ctx.store.path_for(&resp.video_id)).unwrap();
        assert_eq!(stored, b"hello chunked world");
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn ffmpeg_mode_without_ffmpeg_is_tool_error() {
        let root = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root = root.path().to_path_buf();
        config.transcription.enabled = false;
        config.ingest.compile_mode = CompileMode::Ffmpeg;
        let ctx = AppContext::from_config(config, ToolRegistry::empty());

        let session = session_with(&ctx, &[b"a", b"b"]).await;
        let err = complete_session(&ctx, session).await.unwrap_err();
        assert_eq!(err.http_status(), 502);
        assert!(ctx.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transcript_is_returned_and_published() {
        let root = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = context(root.path())
            .with_transcriber(Some(Arc::new(FixedTranscriber(Ok("spoken words")))))
            .with_publisher(Some(Arc::new(ChannelPublisher(tx))));

        let session = session_with(&ctx, &[b"data"]).await;
        let resp = complete_session(&ctx, session).await.unwrap();
        assert_eq!(resp.transcription.as_deref(), Some("spoken words"));

        let published = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(published, "spoken words");
    }

    #[tokio::test]
    async fn transcription_failure_keeps_the_upload() {
        let root = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = context(root.path())
            .with_transcriber(Some(Arc::new(FixedTranscriber(Err("quota exceeded")))))
            .with_publisher(Some(Arc::new(ChannelPublisher(tx))));

        let session = session_with(&ctx, &[b"data"]).await;
        let resp = complete_session(&ctx, session).await.unwrap();
        assert!(resp.transcription.is_none());
        assert!(resp.transcription_error.unwrap().contains("quota exceeded"));
        assert!(ctx.store.exists(&resp.video_id).await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn multipart_webm_files_are_joined() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());

        let mut pending = PendingUpload::new(&ctx.store).unwrap();
        for part in [&b"first-"[..], &b"second"[..]] {
            let path = pending.next_path(Container::Webm);
            std::fs::write(&path, part).unwrap();
            pending.push(StagedFile {
                path,
                container: Container::Webm,
                size_bytes: part.len() as u64,
            });
        }
        assert_eq!(pending.total_bytes(), 12);

        let resp = complete_files(&ctx, pending).await.unwrap();
        let stored = std::fs::read(ctx.store.path_for(&resp.video_id)).unwrap();
        assert_eq!(stored, b"first-second");
    }

    #[tokio::test]
    async fn mixed_multipart_containers_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());

        let mut pending = PendingUpload::new(&ctx.store).unwrap();
        for container in [Container::Webm, Container::Mp4] {
            let path = pending.next_path(container);
            std::fs::write(&path, b"x").unwrap();
            pending.push(StagedFile {
                path,
                container,
                size_bytes: 1,
            });
        }

        let err = complete_files(&ctx, pending).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(ctx.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_multipart_upload_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let ctx = context(root.path());
        let pending = PendingUpload::new(&ctx.store).unwrap();
        assert!(pending.is_empty());
        assert!(matches!(
            complete_files(&ctx, pending).await,
            Err(Error::Validation(_))
        ));
    }
}
