//! clipforge configuration.
//!
//! [`Config`] is read from a JSON file, then secrets are overlaid from the
//! environment. Every section has defaults, so `{}` is a complete config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::media::{CompileMode, Container};
use crate::Error;

/// Environment variable overriding [`TranscriptionConfig::api_key`].
pub const ENV_DEEPGRAM_API_KEY: &str = "DEEPGRAM_API_KEY";
/// Older name of [`ENV_DEEPGRAM_API_KEY`], still honored when the new one
/// is unset.
pub const ENV_DEEPGRAM_API_KEY_LEGACY: &str = "Deepgram_API";
/// Environment variable overriding [`QueueConfig::url`].
pub const ENV_QUEUE_URL: &str = "CLIPFORGE_QUEUE_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub tools: ToolsConfig,
    pub transcription: TranscriptionConfig,
    pub queue: QueueConfig,
}

impl Config {
    /// Parse a config document. Unknown keys are ignored.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Read `path` if given, using defaults for anything that cannot be read
    /// or parsed. The CLI parses strictly through [`Config::from_json`]
    /// when the file exists.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "ignoring unparsable config: {e}");
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "config file unreadable, using defaults: {e}");
                Self::default()
            }
        }
    }

    /// Overlay secrets and endpoints taken from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) =
            lookup(ENV_DEEPGRAM_API_KEY).or_else(|| lookup(ENV_DEEPGRAM_API_KEY_LEGACY))
        {
            self.transcription.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_QUEUE_URL) {
            self.queue.url = url;
        }
    }

    /// Settings that are legal but probably not what the operator meant.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.storage.read_chunk_size == 0 {
            warnings.push("storage.read_chunk_size is 0; the default of 64 KiB will be used".into());
        }

        let max_chunk = u64::try_from(self.ingest.max_chunk_bytes).unwrap_or(u64::MAX);
        if max_chunk > self.ingest.max_upload_bytes {
            warnings.push(
                "ingest.max_chunk_bytes exceeds ingest.max_upload_bytes; a single chunk can fill the upload".into(),
            );
        }

        if !self
            .ingest
            .allowed_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case("webm"))
        {
            warnings.push("ingest.allowed_extensions does not include webm".into());
        }

        for ext in &self.ingest.allowed_extensions {
            if ext.parse::<Container>().is_err() {
                warnings.push(format!(
                    "ingest.allowed_extensions entry '{ext}' is not a supported container"
                ));
            }
        }

        let has_key = self
            .transcription
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if self.transcription.enabled && !has_key {
            warnings.push(format!(
                "transcription is enabled but no api_key is set (config or {ENV_DEEPGRAM_API_KEY})"
            ));
        }

        if self.queue.enabled && self.queue.url.is_empty() {
            warnings.push("queue is enabled but queue.url is empty".into());
        }

        warnings
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow cross-origin requests from any origin.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors: true,
        }
    }
}

/// Where compiled videos live and how they are read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    /// Buffer size used when streaming a file to a client.
    pub read_chunk_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./uploads"),
            read_chunk_size: 64 * 1024,
        }
    }
}

/// Upload and compilation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Largest accepted request body for a single chunk.
    pub max_chunk_bytes: usize,
    /// Largest accepted total size of one upload session.
    pub max_upload_bytes: u64,
    /// Idle sessions older than this are discarded with their chunks.
    pub session_ttl_secs: u64,
    pub compile_mode: CompileMode,
    /// Extensions accepted by the multipart upload endpoint.
    pub allowed_extensions: Vec<String>,
    /// Run an `ffmpeg -c copy` pass over compiled output.
    pub remux_after_compile: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 50 * 1024 * 1024,
            max_upload_bytes: 2 * 1024 * 1024 * 1024,
            session_ttl_secs: 3600,
            compile_mode: CompileMode::Append,
            allowed_extensions: vec!["webm".into(), "mp4".into(), "mkv".into(), "mov".into()],
            remux_after_compile: false,
        }
    }
}

impl IngestConfig {
    /// Whether a multipart file name passes the extension filter.
    pub fn accepts(&self, file_name: &str) -> Option<Container> {
        let container = Container::from_file_name(file_name)?;
        let ext = file_name.rsplit_once('.').map(|(_, e)| e)?;
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            .then_some(container)
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Upper bound for any single ffmpeg invocation.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            timeout_secs: 600,
        }
    }
}

/// Speech-to-text provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub enabled: bool,
    /// Pre-recorded transcription endpoint.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub smart_format: bool,
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.deepgram.com/v1/listen".into(),
            api_key: None,
            model: None,
            smart_format: true,
            timeout_secs: 120,
        }
    }
}

/// Transcript publishing via the RabbitMQ HTTP management API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub enabled: bool,
    /// Base URL of the management API, e.g. `http://rabbitmq:15672`.
    pub url: String,
    pub vhost: String,
    /// Exchange to publish through; empty means the default exchange.
    pub exchange: String,
    pub routing_key: String,
    /// Declare a durable queue named `routing_key` before publishing through
    /// the default exchange.
    pub declare_queue: bool,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://rabbitmq:15672".into(),
            vhost: "/".into(),
            exchange: String::new(),
            routing_key: "transcription-queue".into(),
            declare_queue: true,
            username: "guest".into(),
            password: "guest".into(),
            timeout_secs: 10,
        }
    }
}
