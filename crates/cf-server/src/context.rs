//! Application context shared by all route handlers via Axum state.
//!
//! Everything in [`AppContext`] is immutable after startup or internally
//! synchronized, so cloning the context per request is cheap and lock-free.

use std::sync::Arc;
use std::time::Duration;

use cf_av::ToolRegistry;
use cf_core::config::Config;

use crate::queue::{self, QueuePublisher};
use crate::sessions::UploadSessions;
use crate::store::MediaStore;
use crate::transcription::{self, Transcriber};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<MediaStore>,
    pub sessions: Arc<UploadSessions>,
    pub tools: Arc<ToolRegistry>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub publisher: Option<Arc<dyn QueuePublisher>>,
}

impl AppContext {
    /// Wire every component from configuration.
    ///
    /// Upload sessions stage their chunks inside the storage root so the
    /// compiled file can be renamed into place.
    pub fn from_config(config: Config, tools: ToolRegistry) -> Self {
        let store = MediaStore::from_config(&config.storage);
        let sessions = UploadSessions::new(
            store.root(),
            config.ingest.max_upload_bytes,
            Duration::from_secs(config.ingest.session_ttl_secs),
        );
        let transcriber = transcription::from_config(&config.transcription);
        let publisher = queue::from_config(&config.queue);

        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            sessions: Arc::new(sessions),
            tools: Arc::new(tools),
            transcriber,
            publisher,
        }
    }

    /// Replace the transcriber (or disable transcription with `None`).
    pub fn with_transcriber(mut self, transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        self.transcriber = transcriber;
        self
    }

    /// Replace the queue publisher (or disable publishing with `None`).
    pub fn with_publisher(mut self, publisher: Option<Arc<dyn QueuePublisher>>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.config.transcription.timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.config.queue.timeout_secs)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("store", &self.store)
            .field("sessions", &self.sessions.len())
            .field("transcriber", &self.transcriber.as_ref().map(|t| t.name()))
            .field("publisher", &self.publisher.as_ref().map(|p| p.name()))
            .finish_non_exhaustive()
    }
}
