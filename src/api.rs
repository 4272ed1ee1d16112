//! HTTP API: the WhatsApp webhook plus health and index endpoints

mod handlers;
mod signature;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::config::WebhookConfig;
use crate::runtime::ProductionDispatcher;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ProductionDispatcher>,
    pub webhook: Arc<WebhookConfig>,
}

impl AppState {
    pub fn new(dispatcher: ProductionDispatcher, webhook: WebhookConfig) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            webhook: Arc::new(webhook),
        }
    }
}
