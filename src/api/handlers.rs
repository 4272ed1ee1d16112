//! HTTP request handlers

use super::signature::{self, SIGNATURE_HEADER};
use super::types::{
    ErrorResponse, HealthResponse, IndexResponse, VerifyQuery, WebhookAck, WebhookPayload,
};
use super::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use std::collections::BTreeMap;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        // GET for the subscription handshake, POST for notifications
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .with_state(state)
}

// ============================================================
// Service info
// ============================================================

async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        name: "Vehicle tracking chat service",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        endpoints: BTreeMap::from([
            ("/health", "Health check"),
            ("/webhook", "WhatsApp webhook (GET to verify, POST for messages)"),
        ]),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        active_sessions: state.dispatcher.active_sessions(),
        timestamp: Utc::now(),
    })
}

// ============================================================
// Webhook
// ============================================================

async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<String, AppError> {
    let subscribing = query.mode.as_deref() == Some("subscribe");
    let token_matches = state
        .webhook
        .verify_token
        .as_deref()
        .is_some_and(|expected| query.verify_token.as_deref() == Some(expected));

    if subscribing && token_matches {
        tracing::info!("Webhook verified");
        Ok(query.challenge.unwrap_or_default())
    } else {
        tracing::warn!(mode = ?query.mode, "Webhook verification failed");
        Err(AppError::Forbidden("Forbidden".to_string()))
    }
}

/// Always acknowledges a well-formed, correctly signed delivery, whatever
/// happens in the turns it triggers
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    if let Some(secret) = state.webhook.app_secret.as_deref() {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if !signature::verify(secret, &body, header) {
            tracing::warn!("Invalid webhook signature");
            return Err(AppError::Unauthorized("Invalid signature".to_string()));
        }
    }

    if body.is_empty() {
        return Ok(Json(WebhookAck { status: "no data" }));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid payload: {e}")))?;

    for message in payload.inbound_messages() {
        let outcome = state.dispatcher.process(message).await;
        tracing::debug!(?outcome, "Webhook message processed");
    }

    Ok(Json(WebhookAck { status: "ok" }))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
