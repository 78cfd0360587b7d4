// src/api/mod.rs — HTTP bridge to the chat platform

pub mod gateway;
pub mod handlers;
pub mod types;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::infra::config::ApiConfig;
use gateway::ChatGateway;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub gateway: Arc<ChatGateway>,
}

/// Build the axum router with all routes.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/v1/messages", post(handlers::post_message))
        .route("/v1/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// Start the server (blocking until shutdown).
pub async fn start_server(config: &ApiConfig, state: ApiState) -> anyhow::Result<()> {
    let router = build_router(state);

    tracing::info!("chat bridge listening on http://{}", config.bind);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
