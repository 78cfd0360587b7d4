// src/proposer/mod.rs — NL step-proposal boundary
//
// The external service only proposes; sequencing, validation, and stop
// policy belong to the planner. Everything returned here is advisory.

pub mod http;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::CloudhandError;

/// Raw proposal as the NL service emitted it. `kind` is a free string at
/// this layer; the planner validates it into the closed `Step` set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepProposal {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// True when the service considers the intent satisfied.
    #[serde(default)]
    pub done: bool,
}

/// Seam to the NL service. Implemented by the HTTP client in production
/// and by scripted mocks in tests.
#[async_trait]
pub trait StepProposer: Send + Sync {
    async fn propose_step(
        &self,
        intent: &str,
        history_summary: &str,
    ) -> Result<StepProposal, CloudhandError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_deserializes_with_defaults() {
        let p: StepProposal = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(p.done);
        assert!(p.kind.is_empty());
        assert!(p.payload.is_null());
    }

    #[test]
    fn test_proposal_roundtrip() {
        let p: StepProposal = serde_json::from_str(
            r#"{"kind": "shell_command", "payload": {"command": "ls"}, "done": false}"#,
        )
        .unwrap();
        assert_eq!(p.kind, "shell_command");
        assert_eq!(p.payload["command"], "ls");

        let json = serde_json::to_string(&p).unwrap();
        let back: StepProposal = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, p.kind);
    }
}
