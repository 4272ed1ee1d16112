//! Gateway that only logs, for running without channel credentials

use super::GatewayError;
use crate::conversation::{ChoiceOption, ListSection};
use crate::runtime::Gateway;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogGateway;

#[async_trait]
impl Gateway for LogGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), GatewayError> {
        tracing::info!(to, body, "Outbound text");
        Ok(())
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        options: &[ChoiceOption],
    ) -> Result<(), GatewayError> {
        let ids: Vec<&str> = options.iter().map(|o| o.id.as_str()).collect();
        tracing::info!(to, body, ?ids, "Outbound buttons");
        Ok(())
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<(), GatewayError> {
        let rows: Vec<&str> = sections
            .iter()
            .flat_map(|s| &s.rows)
            .map(|r| r.id.as_str())
            .collect();
        tracing::info!(to, body, button_label, ?rows, "Outbound list");
        Ok(())
    }
}
