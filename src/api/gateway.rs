// src/api/gateway.rs — Chat platform boundary
//
// Both consumers (HTTP endpoint and terminal) funnel through here. The
// gateway owns the two platform-level verbs the core cares about —
// "stop" (cancel the in-flight turn) and "reset" (destroy the session) —
// and turns boundary errors into plain-language replies. Help/about-style
// commands belong to the platform, not to this binary.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::core::controller::Controller;
use crate::core::types::TurnReply;
use crate::infra::errors::CloudhandError;
use crate::session::store::SessionStore;
use crate::session::SessionKey;

pub struct ChatGateway {
    controller: Arc<Controller>,
    store: Arc<SessionStore>,
    cancels: Mutex<HashMap<SessionKey, CancellationToken>>,
}

impl ChatGateway {
    pub fn new(controller: Arc<Controller>, store: Arc<SessionStore>) -> Self {
        Self {
            controller,
            store,
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one inbound `(user, channel, text)` turn.
    pub async fn handle_message(&self, user: &str, channel: &str, text: &str) -> TurnReply {
        let key = SessionKey::new(user, channel);
        let text = text.trim();

        if text.is_empty() {
            return TurnReply::final_text("Tell me what to do on the instance.");
        }
        if text.eq_ignore_ascii_case("stop") {
            return self.stop(&key);
        }
        if text.eq_ignore_ascii_case("reset") {
            return self.reset(&key);
        }

        // Register the cancel token unless a turn already holds the key;
        // a second concurrent turn will bounce off the session lock.
        let token = CancellationToken::new();
        let registered = {
            let mut cancels = self.cancels.lock().expect("cancel registry poisoned");
            match cancels.entry(key.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(token.clone());
                    true
                }
            }
        };

        let result = self.controller.handle_turn(&key, text, token).await;

        if registered {
            self.cancels
                .lock()
                .expect("cancel registry poisoned")
                .remove(&key);
        }

        match result {
            Ok(reply) => reply,
            Err(e) => TurnReply::final_text(friendly_error(&e)),
        }
    }

    fn stop(&self, key: &SessionKey) -> TurnReply {
        let cancels = self.cancels.lock().expect("cancel registry poisoned");
        match cancels.get(key) {
            Some(token) => {
                token.cancel();
                TurnReply::final_text("Stopping the current task.")
            }
            None => TurnReply::final_text("Nothing is running for this conversation."),
        }
    }

    fn reset(&self, key: &SessionKey) -> TurnReply {
        match self.store.reset(key) {
            Ok(true) => TurnReply::final_text("Session reset. Starting fresh."),
            Ok(false) => TurnReply::final_text("No session to reset."),
            Err(e) => TurnReply::final_text(friendly_error(&e)),
        }
    }
}

/// Plain-language failure summary naming the failure kind — never a raw
/// stack trace.
pub fn friendly_error(e: &CloudhandError) -> String {
    match e {
        CloudhandError::SessionBusy { .. } => {
            "A task is already running for this conversation. Send 'stop' to cancel it first."
                .to_string()
        }
        CloudhandError::Authentication { host, .. } => format!(
            "I could not authenticate to {host}. The credentials look invalid or expired — \
             please check them. (failure kind: authentication)"
        ),
        CloudhandError::Connection { host, .. } => format!(
            "I could not reach {host}. The instance may be down or unreachable. \
             (failure kind: connection)"
        ),
        CloudhandError::PlannerProtocol(detail) => format!(
            "The planning service returned something I refused to execute: {detail}. \
             (failure kind: planner-protocol)"
        ),
        CloudhandError::Proposer { message, .. } => format!(
            "The planning service is unavailable: {message}. (failure kind: proposer)"
        ),
        other => format!(
            "The request could not be completed. (failure kind: {})",
            other.kind()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friendly_error_names_kind() {
        let e = CloudhandError::Authentication {
            host: "host-1".into(),
            message: "denied".into(),
        };
        let text = friendly_error(&e);
        assert!(text.contains("host-1"));
        assert!(text.contains("authentication"));
        assert!(!text.contains("denied"), "raw detail stays out of chat");
    }

    #[test]
    fn test_friendly_busy_suggests_stop() {
        let e = CloudhandError::SessionBusy { key: "u/c".into() };
        assert!(friendly_error(&e).contains("stop"));
    }
}
