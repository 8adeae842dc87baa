//! Speech-to-text for stored videos.
//!
//! The [`Transcriber`] trait is the seam the ingestion pipeline calls once
//! per stored video. [`DeepgramTranscriber`] implements it against the
//! Deepgram pre-recorded HTTP API, streaming the file as the request body.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use cf_core::config::TranscriptionConfig;
use cf_core::{Error, Result};

/// A speech-to-text provider.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Transcribe the media file at `path`.
    async fn transcribe(&self, path: &Path, mime_type: &str) -> Result<String>;
}

/// Run `transcriber` with an upper bound on its duration.
pub async fn transcribe_with_timeout(
    transcriber: &dyn Transcriber,
    path: &Path,
    mime_type: &str,
    limit: Duration,
) -> Result<String> {
    match tokio::time::timeout(limit, transcriber.transcribe(path, mime_type)).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(
            format!("{} transcription", transcriber.name()),
            limit,
        )),
    }
}

/// Build the configured transcriber, if transcription is usable.
pub fn from_config(config: &TranscriptionConfig) -> Option<Arc<dyn Transcriber>> {
    if !config.enabled {
        tracing::info!("Transcription disabled");
        return None;
    }

    let Some(api_key) = config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
    else {
        tracing::warn!("Transcription enabled but no API key configured; skipping transcription");
        return None;
    };

    Some(Arc::new(DeepgramTranscriber::new(config, api_key)))
}

// ---------------------------------------------------------------------------
// Deepgram
// ---------------------------------------------------------------------------

/// Deepgram pre-recorded transcription client.
pub struct DeepgramTranscriber {
    client: Client,
    endpoint: String,
    api_key: String,
    model: Option<String>,
    smart_format: bool,
}

impl DeepgramTranscriber {
    pub fn new(config: &TranscriptionConfig, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build transcription HTTP client: {e}");
                Client::new()
            });

        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            smart_format: config.smart_format,
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("smart_format", self.smart_format.to_string())];
        if let Some(model) = &self.model {
            params.push(("model", model.clone()));
        }
        params
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    fn name(&self) -> &'static str {
        "deepgram"
    }

    async fn transcribe(&self, path: &Path, mime_type: &str) -> Result<String> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();

        tracing::debug!(path = %path.display(), bytes = len, "Sending video to Deepgram");

        let resp = self
            .client
            .post(&self.endpoint)
            .query(&self.query())
            .header(AUTHORIZATION, format!("Token {}", self.api_key))
            .header(CONTENT_TYPE, mime_type)
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| Error::upstream("deepgram", format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream("deepgram", format!("{status}: {body}")));
        }

        let parsed: ListenResponse = resp
            .json()
            .await
            .map_err(|e| Error::upstream("deepgram", format!("parse error: {e}")))?;

        parsed
            .transcript()
            .ok_or_else(|| Error::upstream("deepgram", "response carried no transcript"))
    }
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
}

impl ListenResponse {
    /// Best alternative of the first channel.
    fn transcript(self) -> Option<String> {
        self.results
            .channels
            .into_iter()
            .next()?
            .alternatives
            .into_iter()
            .next()
            .map(|a| a.transcript)
    }
}
