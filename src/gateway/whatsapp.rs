//! WhatsApp Cloud API client

use super::{truncate_title, GatewayError, MAX_BUTTONS};
use crate::conversation::{ChoiceOption, ListSection};
use crate::runtime::Gateway;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://graph.facebook.com/v18.0";

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub phone_number_id: String,
    pub access_token: String,
}

/// Sends messages through `{api_url}/{phone_number_id}/messages`
pub struct WhatsAppGateway {
    client: Client,
    config: WhatsAppConfig,
}

impl WhatsAppGateway {
    pub fn new(config: WhatsAppConfig, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_url.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }

    async fn post(&self, to: &str, kind: &'static str, payload: Value) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!(to, kind, "Message sent");
        Ok(())
    }
}

#[async_trait]
impl Gateway for WhatsAppGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), GatewayError> {
        self.post(to, "text", text_payload(to, body)).await
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        options: &[ChoiceOption],
    ) -> Result<(), GatewayError> {
        self.post(to, "buttons", buttons_payload(to, body, options))
            .await
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<(), GatewayError> {
        self.post(to, "list", list_payload(to, body, button_label, sections))
            .await
    }
}

// ============================================================================
// Payloads
// ============================================================================

fn text_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "text",
        "text": { "body": body }
    })
}

/// Extra options past [`MAX_BUTTONS`] are dropped
fn buttons_payload(to: &str, body: &str, options: &[ChoiceOption]) -> Value {
    let buttons: Vec<Value> = options
        .iter()
        .take(MAX_BUTTONS)
        .map(|option| {
            json!({
                "type": "reply",
                "reply": { "id": option.id, "title": truncate_title(&option.title) }
            })
        })
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": buttons }
        }
    })
}

fn list_payload(to: &str, body: &str, button_label: &str, sections: &[ListSection]) -> Value {
    let sections: Vec<Value> = sections
        .iter()
        .map(|section| {
            let rows: Vec<Value> = section
                .rows
                .iter()
                .map(|row| {
                    let mut value = json!({ "id": row.id, "title": truncate_title(&row.title) });
                    if let Some(description) = &row.description {
                        value["description"] = json!(description);
                    }
                    value
                })
                .collect();
            json!({ "title": truncate_title(&section.title), "rows": rows })
        })
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "list",
            "body": { "text": body },
            "action": {
                "button": truncate_title(button_label),
                "sections": sections
            }
        }
    })
}
