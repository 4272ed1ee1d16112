//! Tracker Chat - WhatsApp conversation engine for vehicle tracking
//!
//! Users log in, pick a vehicle, then locate or block it through a
//! per-user conversation state machine driven by webhook deliveries.

mod api;
mod config;
mod conversation;
mod gateway;
mod oracle;
mod runtime;
mod session;

use api::{create_router, AppState};
use config::Config;
use gateway::{LogGateway, WhatsAppGateway};
use oracle::{FixtureOracle, TrackerApiOracle};
use runtime::{Dispatcher, Gateway, Oracle};
use session::SessionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracker_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;
    let timeout = config.dispatcher.oracle_timeout;

    let store = Arc::new(SessionStore::new(config.idle_timeout, config.dedup_capacity));

    let oracle: Arc<dyn Oracle> = if let Some(url) = config.tracker_api_url.as_deref() {
        tracing::info!(url, "Using tracker API");
        Arc::new(TrackerApiOracle::new(url, timeout)?)
    } else {
        tracing::warn!("TRACKER_CHAT_TRACKER_API_URL not set, serving demo accounts");
        let fixture = config
            .fixture_channels
            .iter()
            .fold(FixtureOracle::demo(), |oracle, (address, identifier)| {
                oracle.with_channel(address.as_str(), identifier.as_str())
            });
        Arc::new(fixture)
    };

    let gateway: Arc<dyn Gateway> = if let Some(whatsapp) = config.whatsapp.clone() {
        tracing::info!(phone_number_id = %whatsapp.phone_number_id, "Using WhatsApp Cloud API");
        Arc::new(WhatsAppGateway::new(whatsapp, timeout)?)
    } else {
        tracing::warn!("WHATSAPP_TOKEN or WHATSAPP_PHONE_NUMBER_ID not set, logging replies only");
        Arc::new(LogGateway)
    };

    if config.webhook.app_secret.is_none() {
        tracing::warn!("WHATSAPP_APP_SECRET not set, webhook signatures are not checked");
    }

    tracing::info!(
        auth_flow = %config.dispatcher.auth_flow,
        idle_timeout_minutes = config.idle_timeout.num_minutes(),
        dedup_capacity = config.dedup_capacity,
        "Conversation engine configured"
    );

    let dispatcher = Dispatcher::new(store, oracle, gateway, config.dispatcher.clone());
    let state = AppState::new(dispatcher, config.webhook.clone());

    let app = create_router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Tracker chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
