//! HTTP surface: the Pub/Sub push endpoint and a health check.
//!
//! The webhook acknowledges as soon as the cursor is queued. The provider
//! gets no signal about downstream failures and will not redeliver.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::envelope::PushEnvelope;
use crate::pipeline::SequencerHandle;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub sequencer: SequencerHandle,
}

/// Build the Axum router for the webhook service.
pub fn webhook_routes(sequencer: SequencerHandle) -> Router {
    let state = AppState { sequencer };

    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "inbox-ledger"
    }))
}

// ── Webhook ─────────────────────────────────────────────────────────────

async fn webhook(
    State(state): State<AppState>,
    payload: Result<Json<PushEnvelope>, JsonRejection>,
) -> impl IntoResponse {
    let envelope = match payload {
        Ok(Json(envelope)) => envelope,
        Err(e) => {
            warn!(error = %e, "Error parsing push envelope");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid request"})),
            );
        }
    };

    let notification = match envelope.message.decode() {
        Ok(n) => n,
        Err(e) => {
            warn!(
                pubsub_id = %envelope.message.message_id,
                error = %e,
                "Error decoding notification data"
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid data"})),
            );
        }
    };

    let lag_ms = envelope
        .message
        .published_at()
        .map(|t| (Utc::now() - t).num_milliseconds());
    info!(
        pubsub_id = %envelope.message.message_id,
        email = %notification.email_address,
        cursor = %notification.history_id,
        lag_ms = ?lag_ms,
        "Notification received"
    );

    if let Err(e) = state.sequencer.enqueue(notification.history_id).await {
        error!(cursor = %notification.history_id, error = %e, "Cursor dropped");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "pipeline unavailable"})),
        );
    }

    debug!(cursor = %notification.history_id, "Cursor queued");
    (StatusCode::OK, Json(serde_json::json!({"status": "success"})))
}
