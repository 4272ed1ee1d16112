//! Outbound messaging channels
//!
//! Production implementations of [`Gateway`](crate::runtime::Gateway).

mod error;
mod log;
mod whatsapp;

pub use error::GatewayError;
pub use log::LogGateway;
pub use whatsapp::{
    WhatsAppConfig, WhatsAppGateway, DEFAULT_API_URL as DEFAULT_WHATSAPP_API_URL,
};

/// Reply buttons per message accepted by the channel
pub const MAX_BUTTONS: usize = 3;

/// Display length of button and list row titles
pub const MAX_TITLE_CHARS: usize = 20;

/// Cut `title` to [`MAX_TITLE_CHARS`] characters
pub fn truncate_title(title: &str) -> String {
    title.chars().take(MAX_TITLE_CHARS).collect()
}
