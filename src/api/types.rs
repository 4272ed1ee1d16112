//! API request and response types

use crate::conversation::MessageKind;
use crate::runtime::InboundMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Webhook envelope
// ============================================================================

/// `hub.*` parameters of the subscription handshake
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Notification body posted by the WhatsApp Cloud API
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
    /// Delivery and read receipts
    pub statuses: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct WhatsAppMessage {
    #[serde(default)]
    pub from: String,
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub text: Option<TextBody>,
    pub interactive: Option<Interactive>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct Interactive {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub button_reply: Option<Reply>,
    pub list_reply: Option<Reply>,
}

#[derive(Debug, Deserialize)]
pub struct Reply {
    pub id: String,
}

impl WhatsAppMessage {
    /// Text for the state machine: the typed body, or the option id of a
    /// button/list reply (never its title)
    fn content(&self) -> Option<(MessageKind, String)> {
        match self.kind.as_str() {
            "text" => self
                .text
                .as_ref()
                .map(|t| (MessageKind::PlainText, t.body.clone())),
            "interactive" => {
                let interactive = self.interactive.as_ref()?;
                let reply = match interactive.kind.as_str() {
                    "button_reply" => interactive.button_reply.as_ref(),
                    "list_reply" => interactive.list_reply.as_ref(),
                    other => {
                        tracing::warn!(kind = other, "Unknown interactive reply type");
                        None
                    }
                }?;
                Some((MessageKind::StructuredChoice, reply.id.clone()))
            }
            other => {
                tracing::debug!(kind = other, "Ignoring unsupported message type");
                None
            }
        }
    }
}

impl WebhookPayload {
    /// Messages worth a turn, in delivery order. Status notifications and
    /// messages without a sender or text are dropped.
    pub fn inbound_messages(&self) -> Vec<InboundMessage> {
        let mut inbound = Vec::new();
        for change in self.entry.iter().flat_map(|e| &e.changes) {
            if change.value.statuses.is_some() {
                tracing::debug!("Ignoring status notification");
                continue;
            }
            for message in &change.value.messages {
                match message.content() {
                    Some((kind, text)) if !message.from.is_empty() && !text.is_empty() => {
                        inbound.push(InboundMessage::new(
                            &message.from,
                            message.id.clone(),
                            kind,
                            text,
                        ));
                    }
                    _ => tracing::debug!(from = %message.from, "Message ignored"),
                }
            }
        }
        inbound
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Acknowledgement for webhook deliveries
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
