//! WhatsApp Cloud API webhook: subscription handshake, inbound message
//! parsing, and the reply path through the workflow engine.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::workflow::WorkflowEngine;

/// Agent name under which inbound messages are relayed.
pub const WHATSAPP_AGENT: &str = "whatsapp";

const ACKNOWLEDGEMENT: &str = "Message received. We'll get back to you shortly.";

/// Answer Meta's `hub.*` verification request. Returns the challenge to echo
/// when the token matches the configured one.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected: Option<&str>,
) -> Option<String> {
    let expected = expected.filter(|t| !t.is_empty())?;
    if mode.is_some_and(|m| m != "subscribe") || token != Some(expected) {
        return None;
    }
    Some(challenge.unwrap_or("0").to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender phone number.
    pub from: String,
    pub text: Option<String>,
}

impl InboundMessage {
    /// Parse `entry[0].changes[0].value.messages[0]` of a webhook delivery.
    pub fn from_payload(payload: &Value) -> anyhow::Result<Self> {
        let message = payload
            .pointer("/entry/0/changes/0/value/messages/0")
            .context("Payload carries no message")?;
        let from = message
            .get("from")
            .and_then(Value::as_str)
            .context("Message has no sender")?
            .to_string();
        let text = message
            .pointer("/text/body")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self { from, text })
    }
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Sends text messages through the Cloud API `messages` endpoint.
pub struct CloudApiSender {
    client: reqwest::Client,
    api_url: String,
    access_token: String,
}

impl CloudApiSender {
    pub fn new(
        api_url: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build WhatsApp HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            access_token: access_token.into(),
        })
    }
}

#[async_trait]
impl MessageSender for CloudApiSender {
    async fn send_text(&self, to: &str, body: &str) -> anyhow::Result<()> {
        self.client
            .post(&self.api_url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": { "body": body },
            }))
            .send()
            .await
            .context("Failed to send WhatsApp message")?
            .error_for_status()
            .context("WhatsApp API returned error status")?;
        Ok(())
    }
}

/// Relay an inbound message to the workflow engine and send its reply back
/// to the sender. Returns the reply text.
pub async fn handle_inbound(
    payload: &Value,
    engine: &dyn WorkflowEngine,
    sender: Option<&dyn MessageSender>,
) -> anyhow::Result<String> {
    let message = InboundMessage::from_payload(payload)?;
    let text = message
        .text
        .as_deref()
        .context("Message has no text body")?;
    info!(from = %message.from, "Inbound WhatsApp message");

    let outcome = engine
        .execute(
            WHATSAPP_AGENT,
            None,
            serde_json::json!({ "from": message.from, "text": text }),
        )
        .await;
    if !outcome.success {
        warn!(error = ?outcome.error, status = ?outcome.status_code, "Workflow engine did not handle message");
    }

    let reply = outcome
        .result
        .as_ref()
        .and_then(|r| r.get("reply"))
        .and_then(Value::as_str)
        .unwrap_or(ACKNOWLEDGEMENT)
        .to_string();

    match sender {
        Some(sender) => sender.send_text(&message.from, &reply).await?,
        None => warn!("WhatsApp sender not configured; reply not delivered"),
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::workflow::WorkflowOutcome;
    use std::sync::Mutex;

    struct FixedEngine(WorkflowOutcome);

    #[async_trait]
    impl WorkflowEngine for FixedEngine {
        async fn execute(&self, _agent: &str, _user_id: Option<i64>, _payload: Value) -> WorkflowOutcome {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send_text(&self, to: &str, body: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn delivery(text: Option<&str>) -> Value {
        let mut message = serde_json::json!({ "from": "5511999990000" });
        if let Some(text) = text {
            message["text"] = serde_json::json!({ "body": text });
        }
        serde_json::json!({
            "entry": [{ "changes": [{ "value": { "messages": [message] } }] }]
        })
    }

    #[test]
    fn test_verify_subscription() {
        let ok = verify_subscription(Some("subscribe"), Some("tok"), Some("123"), Some("tok"));
        assert_eq!(ok.as_deref(), Some("123"));
        assert_eq!(
            verify_subscription(None, Some("tok"), None, Some("tok")).as_deref(),
            Some("0")
        );
        assert!(verify_subscription(Some("subscribe"), Some("bad"), Some("1"), Some("tok")).is_none());
        assert!(verify_subscription(Some("unsubscribe"), Some("tok"), Some("1"), Some("tok")).is_none());
        // Unconfigured token never verifies.
        assert!(verify_subscription(None, None, Some("1"), None).is_none());
        assert!(verify_subscription(None, Some(""), Some("1"), Some("")).is_none());
    }

    #[test]
    fn test_parse_inbound_message() {
        let msg = InboundMessage::from_payload(&delivery(Some("hi"))).unwrap();
        assert_eq!(msg.from, "5511999990000");
        assert_eq!(msg.text.as_deref(), Some("hi"));

        let no_text = InboundMessage::from_payload(&delivery(None)).unwrap();
        assert!(no_text.text.is_none());

        assert!(InboundMessage::from_payload(&serde_json::json!({"entry": []})).is_err());
    }

    #[tokio::test]
    async fn test_handle_inbound_sends_engine_reply() {
        let engine = FixedEngine(WorkflowOutcome {
            success: true,
            status_code: Some(200),
            result: Some(serde_json::json!({"reply": "Hello from ORION"})),
            error: None,
        });
        let sender = RecordingSender::default();

        let reply = handle_inbound(&delivery(Some("hi")), &engine, Some(&sender))
            .await
            .unwrap();
        assert_eq!(reply, "Hello from ORION");
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &[("5511999990000".to_string(), "Hello from ORION".to_string())]);
    }

    #[tokio::test]
    async fn test_handle_inbound_falls_back_to_acknowledgement() {
        let engine = FixedEngine(WorkflowOutcome::failed("connection refused"));
        let reply = handle_inbound(&delivery(Some("hi")), &engine, None).await.unwrap();
        assert_eq!(reply, ACKNOWLEDGEMENT);
    }

    #[tokio::test]
    async fn test_handle_inbound_rejects_non_text() {
        let engine = FixedEngine(WorkflowOutcome::failed("unused"));
        let err = handle_inbound(&delivery(None), &engine, None).await.unwrap_err();
        assert!(err.to_string().contains("no text body"));
    }
}
