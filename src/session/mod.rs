// src/session/mod.rs — Per-conversation state

pub mod snapshot;
pub mod store;

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{SessionStatus, StepRecord};

/// One conversation: a (user, channel) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user: String,
    pub channel: String,
}

impl SessionKey {
    pub fn new(user: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            channel: channel.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user, self.channel)
    }
}

/// State the execution loop reads and mutates across a conversation.
/// Only the loop holding this session's exclusive handle may mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    pub working_dir: String,
    pub env_overrides: BTreeMap<String, String>,
    /// Append-only within a session; bounded with oldest-first eviction.
    pub history: VecDeque<StepRecord>,
    pub last_error: Option<String>,
    pub status: SessionStatus,
    /// The intent being worked while suspended in AwaitingUser.
    pub pending_intent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey, working_dir: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key,
            working_dir: working_dir.into(),
            env_overrides: BTreeMap::new(),
            history: VecDeque::new(),
            last_error: None,
            status: SessionStatus::Idle,
            pending_intent: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a record, trimming the oldest entries beyond `cap`.
    pub fn push_record(&mut self, record: StepRecord, cap: usize) {
        self.history.push_back(record);
        while self.history.len() > cap {
            self.history.pop_front();
        }
        self.updated_at = Utc::now();
    }

    /// How many times an action with this fingerprint has already failed.
    pub fn failure_count(&self, fingerprint: &str) -> usize {
        self.history
            .iter()
            .filter(|r| r.failed() && r.step.fingerprint().as_deref() == Some(fingerprint))
            .count()
    }

    /// The most recent unanswered AskUser record, if the session is
    /// suspended on one.
    pub fn open_question_mut(&mut self) -> Option<&mut StepRecord> {
        self.history
            .iter_mut()
            .rev()
            .find(|r| matches!(r.step, crate::core::types::Step::AskUser { .. }) && r.user_reply.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExecResult, Step};

    fn session() -> Session {
        Session::new(SessionKey::new("u1", "c1"), "/home/u1")
    }

    #[test]
    fn test_key_display() {
        assert_eq!(SessionKey::new("alice", "ops").to_string(), "alice/ops");
    }

    #[test]
    fn test_history_bounded_oldest_first() {
        let mut s = session();
        for i in 0..10 {
            s.push_record(
                StepRecord::new(Step::ShellCommand {
                    command: format!("echo {i}"),
                }),
                3,
            );
        }
        assert_eq!(s.history.len(), 3);
        assert_eq!(
            s.history.front().unwrap().step.describe(),
            "echo 7",
            "oldest entries evicted first"
        );
    }

    #[test]
    fn test_failure_count_matches_fingerprint() {
        let mut s = session();
        let step = Step::ShellCommand {
            command: "make build".into(),
        };
        for _ in 0..2 {
            s.push_record(
                StepRecord::with_result(
                    step.clone(),
                    ExecResult {
                        exit_code: 2,
                        ..Default::default()
                    },
                ),
                50,
            );
        }
        s.push_record(
            StepRecord::with_result(
                step.clone(),
                ExecResult {
                    exit_code: 0,
                    ..Default::default()
                },
            ),
            50,
        );
        let fp = step.fingerprint().unwrap();
        assert_eq!(s.failure_count(&fp), 2);
        assert_eq!(s.failure_count("sh:other"), 0);
    }

    #[test]
    fn test_open_question_found_and_cleared() {
        let mut s = session();
        s.push_record(
            StepRecord::new(Step::AskUser {
                question: "which branch?".into(),
            }),
            50,
        );
        assert!(s.open_question_mut().is_some());
        s.open_question_mut().unwrap().user_reply = Some("main".into());
        assert!(s.open_question_mut().is_none());
    }
}
