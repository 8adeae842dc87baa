//! Shared test harness for integration tests.
//!
//! [`TestHarness`] owns a temporary storage root, builds a full
//! [`AppContext`] with transcription disabled by default, and serves it on a
//! random port. The server stops when the harness is dropped.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use cf_av::ToolRegistry;
use cf_core::config::Config;
use cf_core::VideoId;
use cf_server::context::AppContext;

pub struct TestHarness {
    pub ctx: AppContext,
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    storage: TempDir,
    cancel: CancellationToken,
}

impl TestHarness {
    /// Start a server with test defaults.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Start a server after adjusting the test configuration.
    pub async fn start_with(configure: impl FnOnce(&mut Config)) -> Self {
        let storage = tempfile::tempdir().expect("failed to create storage root");

        let mut config = Config::default();
        config.storage.root = storage.path().to_path_buf();
        config.storage.read_chunk_size = 4096;
        config.transcription.enabled = false;
        config.queue.enabled = false;
        configure(&mut config);

        let tools = ToolRegistry::discover(&config.tools);
        let ctx = AppContext::from_config(config, tools);
        ctx.store.ensure_root().await.expect("failed to create storage root");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        let cancel = CancellationToken::new();
        tokio::spawn(cf_server::serve(listener, ctx.clone(), cancel.clone()));

        Self {
            ctx,
            addr,
            client: reqwest::Client::new(),
            storage,
            cancel,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn storage(&self) -> &Path {
        self.storage.path()
    }

    /// Place a stored video directly on disk.
    pub fn put_video(&self, id: &str, bytes: &[u8]) -> VideoId {
        let id: VideoId = id.parse().expect("invalid video id");
        std::fs::write(self.ctx.store.path_for(&id), bytes).expect("failed to write video");
        id
    }

    /// Open an upload session and return its id.
    pub async fn create_upload(&self) -> String {
        let resp = self
            .client
            .post(self.url("/api/uploads"))
            .send()
            .await
            .expect("create upload request failed");
        assert_eq!(resp.status(), 201);
        let body: serde_json::Value = resp.json().await.expect("invalid create response");
        body["upload_id"].as_str().expect("missing upload_id").to_string()
    }

    pub async fn send_chunk(&self, upload_id: &str, data: &[u8]) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/uploads/{upload_id}/chunks")))
            .body(data.to_vec())
            .send()
            .await
            .expect("chunk request failed")
    }

    pub async fn complete(&self, upload_id: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/uploads/{upload_id}/complete")))
            .send()
            .await
            .expect("complete request failed")
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Deterministic test bytes whose value encodes their offset.
pub fn fixture(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
