// src/core/types.rs — Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One planned action. Proposals from the NL service are validated into
/// this closed set before anything touches the remote host; an
/// unrecognized kind never gets past the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    ShellCommand { command: String },
    CloneRepository { url: String, destination: String },
    AskUser { question: String },
    Terminate { reason: TerminateReason },
}

impl Step {
    /// Identity used to detect resubmission of an action that already
    /// failed (the planner's tie-break rule).
    pub fn fingerprint(&self) -> Option<String> {
        match self {
            Step::ShellCommand { command } => Some(format!("sh:{}", command.trim())),
            Step::CloneRepository { url, destination } => {
                Some(format!("clone:{}:{}", url.trim(), destination.trim()))
            }
            Step::AskUser { .. } | Step::Terminate { .. } => None,
        }
    }

    /// One-line description for histories and summaries.
    pub fn describe(&self) -> String {
        match self {
            Step::ShellCommand { command } => command.clone(),
            Step::CloneRepository { url, destination } => {
                format!("git clone {url} {destination}")
            }
            Step::AskUser { question } => format!("ask: {question}"),
            Step::Terminate { reason } => format!("terminate ({reason})"),
        }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateReason {
    /// The NL service signalled the intent is satisfied.
    Done,
    /// The configured per-turn step cap was reached.
    StepLimit,
    /// The last failure was classified Fatal.
    FatalFailure,
    /// The user stopped the request.
    Cancelled,
}

impl std::fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminateReason::Done => write!(f, "done"),
            TerminateReason::StepLimit => write!(f, "step limit reached"),
            TerminateReason::FatalFailure => write!(f, "fatal failure"),
            TerminateReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Captured outcome of one executed command. stdout/stderr are excerpts:
/// tail-truncated to the configured cap, with the truncation flagged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The Error Classifier's verdict on a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Retry the same step once with backoff before re-planning.
    Transient,
    /// Fold into planner context; may surface as a question to the user.
    UserActionable,
    /// Terminate the loop immediately.
    Fatal,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Transient => write!(f, "transient"),
            Classification::UserActionable => write!(f, "user-actionable"),
            Classification::Fatal => write!(f, "fatal"),
        }
    }
}

/// One history entry: a step plus everything observed about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub result: Option<ExecResult>,
    pub classification: Option<Classification>,
    /// Filled in when an AskUser step is answered on a later turn.
    pub user_reply: Option<String>,
    pub at: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(step: Step) -> Self {
        Self {
            step,
            result: None,
            classification: None,
            user_reply: None,
            at: Utc::now(),
        }
    }

    pub fn with_result(step: Step, result: ExecResult) -> Self {
        Self {
            step,
            result: Some(result),
            classification: None,
            user_reply: None,
            at: Utc::now(),
        }
    }

    pub fn failed(&self) -> bool {
        self.result.as_ref().map(|r| !r.success()).unwrap_or(false)
            || self.classification.is_some()
    }
}

/// Where a session sits between turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Planning,
    Executing,
    AwaitingUser,
}

/// What the core hands back to the chat platform for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub text: String,
    /// false while the session is suspended awaiting the user's answer.
    pub is_final: bool,
}

impl TurnReply {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    pub fn question(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}
