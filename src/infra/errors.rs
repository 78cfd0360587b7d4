// src/infra/errors.rs — Error types for cloudhand

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudhandError {
    // Remote host boundary
    #[error("Connection to '{host}' failed: {message}")]
    Connection { host: String, message: String },

    #[error("Authentication to '{host}' rejected: {message}")]
    Authentication { host: String, message: String },

    #[error("Command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: u64 },

    // Session store
    #[error("Session '{key}' is already running a request")]
    SessionBusy { key: String },

    // NL service boundary
    #[error("Proposer returned a malformed step: {0}")]
    PlannerProtocol(String),

    #[error("Proposer service error: {message}")]
    Proposer { message: String, retriable: bool },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CloudhandError {
    /// Boundary errors abort the turn with a structured message and are
    /// never retried automatically (auth, busy session, malformed step,
    /// failed connection establishment).
    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            CloudhandError::Connection { .. }
                | CloudhandError::Authentication { .. }
                | CloudhandError::SessionBusy { .. }
                | CloudhandError::PlannerProtocol(_)
        )
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, CloudhandError::Proposer { retriable: true, .. })
    }

    /// Short stable label for the failure kind, used in user-facing
    /// summaries and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CloudhandError::Connection { .. } => "connection",
            CloudhandError::Authentication { .. } => "authentication",
            CloudhandError::Timeout { .. } => "timeout",
            CloudhandError::SessionBusy { .. } => "session-busy",
            CloudhandError::PlannerProtocol(_) => "planner-protocol",
            CloudhandError::Proposer { .. } => "proposer",
            CloudhandError::Config(_) => "config",
            CloudhandError::Io(_) => "io",
            CloudhandError::Other(_) => "other",
        }
    }
}
