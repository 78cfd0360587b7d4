// src/api/handlers.rs — HTTP handlers for the chat bridge

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::types::{ErrorResponse, MessageRequest, MessageResponse};
use super::ApiState;

/// POST /v1/messages — run one chat turn.
pub async fn post_message(
    State(state): State<ApiState>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    if req.user_id.trim().is_empty() || req.channel_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "user_id and channel_id are required".into(),
            }),
        ));
    }

    let request_id = uuid::Uuid::new_v4();
    tracing::info!(%request_id, user = %req.user_id, channel = %req.channel_id, "inbound turn");

    let reply = state
        .gateway
        .handle_message(&req.user_id, &req.channel_id, &req.text)
        .await;

    Ok(Json(MessageResponse {
        reply: reply.text,
        is_final: reply.is_final,
    }))
}

/// GET /v1/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
