//! Out-of-band webhook delivery.
//!
//! When a task was created with a webhook configuration, the engine posts a
//! small JSON payload to the configured URL once the task reaches a terminal
//! state. Delivery is fire-and-forget: a failed POST is logged and never
//! affects the task outcome, and nothing is retried.

use async_trait::async_trait;
use capstan_types::{TaskStatus, WebhookConfig};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Body of one webhook POST.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookPayload {
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// Terminal outcome, `completed` or `failed`.
    pub event: String,
    pub status: TaskStatus,
    pub timestamp: String,
    /// Structured handler result, when one was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WebhookPayload {
    pub fn new(task_id: impl Into<String>, event: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            event: event.into(),
            timestamp: status.timestamp.clone(),
            status,
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Option<Value>) -> Self {
        self.data = data;
        self
    }
}

/// Delivery seam, swapped for a recording sink in tests.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, config: &WebhookConfig, payload: &WebhookPayload);
}

/// POSTs payloads with a shared [`reqwest::Client`]. The configured token,
/// when present, is sent as a bearer credential.
pub struct HttpWebhookSink {
    client: reqwest::Client,
}

impl HttpWebhookSink {
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpWebhookSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn deliver(&self, config: &WebhookConfig, payload: &WebhookPayload) {
        let mut request = self.client.post(&config.url).json(payload);
        if let Some(token) = &config.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    task_id = %payload.task_id,
                    url = %config.url,
                    status = %response.status(),
                    "webhook delivery rejected"
                );
            }
            Ok(_) => {
                tracing::debug!(task_id = %payload.task_id, url = %config.url, "webhook delivered");
            }
            Err(e) => {
                tracing::warn!(
                    task_id = %payload.task_id,
                    url = %config.url,
                    error = %e,
                    "webhook delivery failed"
                );
            }
        }
    }
}
