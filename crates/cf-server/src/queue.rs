//! Publishing transcripts to a message queue.
//!
//! Publishing is fire-and-forget: [`spawn_publish`] runs in its own task
//! under a timeout, logs the outcome, and never reports back to the request
//! that produced the transcript.
//!
//! [`RabbitMqHttpPublisher`] talks to the RabbitMQ management plugin over
//! HTTP, so no AMQP connection has to be held open by the server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;

use cf_core::config::QueueConfig;
use cf_core::{Error, Result};

/// Exchange name the management API uses for the default exchange.
const DEFAULT_EXCHANGE: &str = "amq.default";

/// Characters escaped in a URL path segment (RFC 3986 unreserved are kept).
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Destination for transcript messages.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Publish one message.
    async fn publish(&self, payload: &str) -> Result<()>;
}

/// Build the configured publisher, if publishing is enabled.
pub fn from_config(config: &QueueConfig) -> Option<Arc<dyn QueuePublisher>> {
    if !config.enabled {
        return None;
    }
    Some(Arc::new(RabbitMqHttpPublisher::new(config)))
}

/// Publish `payload` in a background task bounded by `limit`.
///
/// Errors are logged, not returned.
pub fn spawn_publish(
    publisher: Arc<dyn QueuePublisher>,
    payload: String,
    limit: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = publisher.name();
        match tokio::time::timeout(limit, publisher.publish(&payload)).await {
            Ok(Ok(())) => {
                tracing::info!(publisher = name, bytes = payload.len(), "Transcript published");
            }
            Ok(Err(e)) => {
                tracing::warn!(publisher = name, error = %e, "Failed to publish transcript");
            }
            Err(_) => {
                tracing::warn!(publisher = name, timeout = ?limit, "Publishing transcript timed out");
            }
        }
    })
}

// ---------------------------------------------------------------------------
// RabbitMQ management API
// ---------------------------------------------------------------------------

/// Publishes through `POST /api/exchanges/{vhost}/{exchange}/publish`.
pub struct RabbitMqHttpPublisher {
    client: Client,
    base_url: String,
    vhost: String,
    exchange: String,
    routing_key: String,
    declare_queue: bool,
    username: String,
    password: String,
}

impl RabbitMqHttpPublisher {
    pub fn new(config: &QueueConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build queue HTTP client: {e}");
                Client::new()
            });

        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            vhost: config.vhost.clone(),
            exchange: config.exchange.clone(),
            routing_key: config.routing_key.clone(),
            declare_queue: config.declare_queue,
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    fn exchange_name(&self) -> &str {
        if self.exchange.is_empty() {
            DEFAULT_EXCHANGE
        } else {
            &self.exchange
        }
    }

    fn publish_url(&self) -> String {
        format!(
            "{}/api/exchanges/{}/{}/publish",
            self.base_url,
            encode(&self.vhost),
            encode(self.exchange_name())
        )
    }

    fn queue_url(&self) -> String {
        format!(
            "{}/api/queues/{}/{}",
            self.base_url,
            encode(&self.vhost),
            encode(&self.routing_key)
        )
    }

    /// Make sure the target queue exists; the default exchange routes by
    /// queue name.
    async fn ensure_queue(&self) -> Result<()> {
        let resp = self
            .client
            .put(self.queue_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({ "durable": true }))
            .send()
            .await
            .map_err(|e| Error::upstream("rabbitmq", format!("queue declare failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                "rabbitmq",
                format!("queue declare returned {status}: {body}"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

#[async_trait]
impl QueuePublisher for RabbitMqHttpPublisher {
    fn name(&self) -> &'static str {
        "rabbitmq"
    }

    async fn publish(&self, payload: &str) -> Result<()> {
        if self.declare_queue && self.exchange.is_empty() {
            self.ensure_queue().await?;
        }

        let body = json!({
            "properties": {},
            "routing_key": self.routing_key,
            "payload": payload,
            "payload_encoding": "string",
        });

        let resp = self
            .client
            .post(self.publish_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::upstream("rabbitmq", format!("publish failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream("rabbitmq", format!("{status}: {body}")));
        }

        let parsed: PublishResponse = resp
            .json()
            .await
            .map_err(|e| Error::upstream("rabbitmq", format!("parse error: {e}")))?;

        if !parsed.routed {
            return Err(Error::upstream(
                "rabbitmq",
                format!("message to '{}' was not routed", self.routing_key),
            ));
        }

        tracing::debug!(routing_key = %self.routing_key, "Message routed");
        Ok(())
    }
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}
