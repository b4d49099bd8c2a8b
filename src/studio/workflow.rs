//! Relay to the external workflow engine.
//!
//! Agents that live outside this process (n8n flows) are reached through a
//! single webhook. Callers always get a `WorkflowOutcome` back; transport
//! failures are folded into it instead of being raised.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_WEBHOOK_URL: &str = "http://n8n:5678/webhook/orion-execute-agent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: None,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn execute(&self, agent: &str, user_id: Option<i64>, payload: Value) -> WorkflowOutcome;
}

/// Posts `{agent, user_id, payload}` to a webhook URL.
pub struct WebhookWorkflowEngine {
    client: reqwest::Client,
    url: String,
}

impl WebhookWorkflowEngine {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build workflow HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, body: &Value) -> anyhow::Result<(u16, Value)> {
        let resp = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .context("Failed to reach workflow engine")?;
        let status = resp.status().as_u16();
        let bytes = resp
            .bytes()
            .await
            .context("Failed to read workflow engine response")?;

        let result = if bytes.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok((status, result))
    }
}

#[async_trait]
impl WorkflowEngine for WebhookWorkflowEngine {
    async fn execute(&self, agent: &str, user_id: Option<i64>, payload: Value) -> WorkflowOutcome {
        let body = serde_json::json!({
            "agent": agent,
            "user_id": user_id,
            "payload": payload,
        });

        match self.post(&body).await {
            Ok((status, result)) => {
                debug!(agent, status, "Workflow engine responded");
                WorkflowOutcome {
                    success: (200..300).contains(&status),
                    status_code: Some(status),
                    result: Some(result),
                    error: None,
                }
            }
            Err(e) => {
                warn!(agent, error = %format!("{:#}", e), "Workflow engine call failed");
                WorkflowOutcome::failed(format!("{:#}", e))
            }
        }
    }
}
