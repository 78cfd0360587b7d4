// src/api/types.rs

use serde::{Deserialize, Serialize};

/// One inbound chat turn as the platform delivers it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub user_id: String,
    pub channel_id: String,
    pub text: String,
}

/// What the core hands back for the turn.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub reply: String,
    /// false while the session is suspended on a clarifying question.
    pub is_final: bool,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
