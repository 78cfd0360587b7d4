// src/planner/mod.rs — Step sequencing and stop policy
//
// The NL service generates step *content*; this module owns everything
// else: validating proposals into the closed Step set, the stop
// conditions (done / step cap / fatal), and the tie-break that refuses
// to resubmit an action that has already failed twice.

use std::sync::Arc;

use crate::core::truncation::truncate_tail;
use crate::core::types::{Classification, Step, TerminateReason};
use crate::infra::config::TurnConfig;
use crate::infra::errors::CloudhandError;
use crate::proposer::{StepProposal, StepProposer};
use crate::session::Session;

/// Cap on the rendered history summary so NL prompts stay bounded.
const SUMMARY_CAP_BYTES: usize = 4 * 1024;
/// Per-entry cap on quoted stderr inside the summary.
const STDERR_EXCERPT_CHARS: usize = 200;
/// Failures of the same action before the planner forces a question.
const RESUBMIT_LIMIT: usize = 2;

pub struct Planner {
    proposer: Arc<dyn StepProposer>,
    cfg: TurnConfig,
}

impl Planner {
    pub fn new(proposer: Arc<dyn StepProposer>, cfg: TurnConfig) -> Self {
        Self { proposer, cfg }
    }

    /// Decide the next step for this session. `steps_taken` counts steps
    /// already executed in the current turn.
    pub async fn next_step(
        &self,
        session: &Session,
        intent: &str,
        steps_taken: usize,
    ) -> Result<Step, CloudhandError> {
        // Fatal classification on the last step ends the turn regardless
        // of what the service would propose next.
        if let Some(last) = session.history.back() {
            if last.classification == Some(Classification::Fatal) {
                return Ok(Step::Terminate {
                    reason: TerminateReason::FatalFailure,
                });
            }
        }

        // Step cap fails closed: no proposal is even requested.
        if steps_taken >= self.cfg.max_steps {
            tracing::warn!(steps_taken, cap = self.cfg.max_steps, "step cap reached");
            return Ok(Step::Terminate {
                reason: TerminateReason::StepLimit,
            });
        }

        let summary = history_summary(session);
        let proposal = self.proposer.propose_step(intent, &summary).await?;

        if proposal.done {
            return Ok(Step::Terminate {
                reason: TerminateReason::Done,
            });
        }

        let step = validate_proposal(&proposal)?;

        // Tie-break: an action that failed twice is not run a third time.
        if let Some(fp) = step.fingerprint() {
            if session.failure_count(&fp) >= RESUBMIT_LIMIT {
                tracing::info!(step = %step.describe(), "forcing AskUser after repeated failure");
                return Ok(Step::AskUser {
                    question: format!(
                        "`{}` has failed twice already. How should I proceed?",
                        step.describe()
                    ),
                });
            }
        }

        Ok(step)
    }
}

/// Validate an advisory proposal into the closed Step set. Unrecognized
/// kinds or missing payload fields never reach remote execution.
pub fn validate_proposal(proposal: &StepProposal) -> Result<Step, CloudhandError> {
    let payload_str = |field: &str| -> Result<String, CloudhandError> {
        match proposal.payload.get(field).and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            _ => Err(CloudhandError::PlannerProtocol(format!(
                "kind '{}' is missing payload field '{}'",
                proposal.kind, field
            ))),
        }
    };

    match proposal.kind.as_str() {
        "shell_command" => Ok(Step::ShellCommand {
            command: payload_str("command")?,
        }),
        "clone_repository" => Ok(Step::CloneRepository {
            url: payload_str("url")?,
            destination: payload_str("destination")?,
        }),
        "ask_user" => Ok(Step::AskUser {
            question: payload_str("question")?,
        }),
        "terminate" => Ok(Step::Terminate {
            reason: TerminateReason::Done,
        }),
        other => Err(CloudhandError::PlannerProtocol(format!(
            "unrecognized step kind '{other}'"
        ))),
    }
}

/// Render recent history as proposer context: commands, outcomes,
/// classifications, stderr tails, questions and their answers.
pub fn history_summary(session: &Session) -> String {
    let mut lines = Vec::new();
    lines.push(format!("working_dir: {}", session.working_dir));
    if !session.env_overrides.is_empty() {
        let env: Vec<String> = session
            .env_overrides
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        lines.push(format!("env: {}", env.join(" ")));
    }

    for record in &session.history {
        let mut line = format!("- {}", record.step.describe());
        if let Some(ref result) = record.result {
            if result.success() {
                line.push_str(" -> ok");
            } else {
                line.push_str(&format!(" -> failed (exit {}", result.exit_code));
                if let Some(c) = record.classification {
                    line.push_str(&format!(", {c}"));
                }
                line.push(')');
                let stderr: String = result.stderr.chars().take(STDERR_EXCERPT_CHARS).collect();
                if !stderr.trim().is_empty() {
                    line.push_str(&format!(": {}", stderr.trim()));
                }
            }
        } else if let Some(c) = record.classification {
            line.push_str(&format!(" -> failed ({c})"));
        }
        if let Some(ref reply) = record.user_reply {
            line.push_str(&format!(" | user answered: {reply}"));
        }
        lines.push(line);
    }

    truncate_tail(&lines.join("\n"), SUMMARY_CAP_BYTES).content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExecResult, StepRecord};
    use crate::session::SessionKey;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct CannedProposer {
        proposal: StepProposal,
    }

    #[async_trait]
    impl StepProposer for CannedProposer {
        async fn propose_step(
            &self,
            _intent: &str,
            _history: &str,
        ) -> Result<StepProposal, CloudhandError> {
            Ok(self.proposal.clone())
        }
    }

    fn planner_with(proposal: StepProposal) -> Planner {
        Planner::new(
            Arc::new(CannedProposer { proposal }),
            TurnConfig::default(),
        )
    }

    fn shell_proposal(command: &str) -> StepProposal {
        StepProposal {
            kind: "shell_command".into(),
            payload: serde_json::json!({ "command": command }),
            done: false,
        }
    }

    fn session() -> Session {
        Session::new(SessionKey::new("u", "c"), "/home/u")
    }

    #[tokio::test]
    async fn test_validates_shell_command() {
        let planner = planner_with(shell_proposal("ls -la"));
        let step = planner.next_step(&session(), "list files", 0).await.unwrap();
        assert_eq!(
            step,
            Step::ShellCommand {
                command: "ls -la".into()
            }
        );
    }

    #[tokio::test]
    async fn test_done_terminates() {
        let planner = planner_with(StepProposal {
            done: true,
            ..Default::default()
        });
        let step = planner.next_step(&session(), "intent", 3).await.unwrap();
        assert_eq!(
            step,
            Step::Terminate {
                reason: TerminateReason::Done
            }
        );
    }

    #[tokio::test]
    async fn test_step_cap_fails_closed() {
        struct PanickyProposer;
        #[async_trait]
        impl StepProposer for PanickyProposer {
            async fn propose_step(
                &self,
                _i: &str,
                _h: &str,
            ) -> Result<StepProposal, CloudhandError> {
                panic!("proposer must not be called past the cap");
            }
        }
        let planner = Planner::new(Arc::new(PanickyProposer), TurnConfig::default());
        let cap = TurnConfig::default().max_steps;
        let step = planner.next_step(&session(), "intent", cap).await.unwrap();
        assert_eq!(
            step,
            Step::Terminate {
                reason: TerminateReason::StepLimit
            }
        );
    }

    #[tokio::test]
    async fn test_fatal_history_terminates_without_proposal() {
        let planner = planner_with(shell_proposal("echo next"));
        let mut s = session();
        let mut record = StepRecord::with_result(
            Step::ShellCommand {
                command: "df".into(),
            },
            ExecResult {
                exit_code: 1,
                stderr: "No space left on device".into(),
                ..Default::default()
            },
        );
        record.classification = Some(Classification::Fatal);
        s.push_record(record, 50);

        let step = planner.next_step(&s, "intent", 1).await.unwrap();
        assert_eq!(
            step,
            Step::Terminate {
                reason: TerminateReason::FatalFailure
            }
        );
    }

    #[tokio::test]
    async fn test_tie_break_after_two_failures() {
        let planner = planner_with(shell_proposal("make build"));
        let mut s = session();
        for _ in 0..2 {
            let mut record = StepRecord::with_result(
                Step::ShellCommand {
                    command: "make build".into(),
                },
                ExecResult {
                    exit_code: 2,
                    ..Default::default()
                },
            );
            record.classification = Some(Classification::UserActionable);
            s.push_record(record, 50);
        }

        let step = planner.next_step(&s, "build it", 2).await.unwrap();
        match step {
            Step::AskUser { question } => assert!(question.contains("make build")),
            other => panic!("expected AskUser, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_one_failure_still_resubmittable() {
        let planner = planner_with(shell_proposal("make build"));
        let mut s = session();
        let mut record = StepRecord::with_result(
            Step::ShellCommand {
                command: "make build".into(),
            },
            ExecResult {
                exit_code: 2,
                ..Default::default()
            },
        );
        record.classification = Some(Classification::UserActionable);
        s.push_record(record, 50);

        let step = planner.next_step(&s, "build it", 1).await.unwrap();
        assert!(matches!(step, Step::ShellCommand { .. }));
    }

    #[test]
    fn test_unrecognized_kind_rejected() {
        let proposal = StepProposal {
            kind: "reboot_host".into(),
            payload: serde_json::Value::Null,
            done: false,
        };
        let err = validate_proposal(&proposal).unwrap_err();
        assert!(matches!(err, CloudhandError::PlannerProtocol(_)));
    }

    #[test]
    fn test_missing_payload_rejected() {
        let proposal = StepProposal {
            kind: "clone_repository".into(),
            payload: serde_json::json!({ "url": "https://github.com/x/y" }),
            done: false,
        };
        let err = validate_proposal(&proposal).unwrap_err();
        assert!(err.to_string().contains("destination"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let proposal = shell_proposal("   ");
        assert!(validate_proposal(&proposal).is_err());
    }

    #[test]
    fn test_summary_includes_outcomes() {
        let mut s = session();
        s.env_overrides.insert("PORT".into(), "8080".into());
        s.push_record(
            StepRecord::with_result(
                Step::ShellCommand {
                    command: "ls".into(),
                },
                ExecResult {
                    exit_code: 0,
                    ..Default::default()
                },
            ),
            50,
        );
        let mut failed = StepRecord::with_result(
            Step::ShellCommand {
                command: "cat missing".into(),
            },
            ExecResult {
                exit_code: 1,
                stderr: "cat: missing: No such file or directory".into(),
                ..Default::default()
            },
        );
        failed.classification = Some(Classification::UserActionable);
        s.push_record(failed, 50);

        let summary = history_summary(&s);
        assert!(summary.contains("working_dir: /home/u"));
        assert!(summary.contains("PORT=8080"));
        assert!(summary.contains("- ls -> ok"));
        assert!(summary.contains("failed (exit 1, user-actionable)"));
        assert!(summary.contains("No such file"));
    }

    #[test]
    fn test_summary_bounded() {
        let mut s = session();
        for i in 0..500 {
            s.push_record(
                StepRecord::with_result(
                    Step::ShellCommand {
                        command: format!("echo step number {i} with some padding text"),
                    },
                    ExecResult {
                        exit_code: 0,
                        ..Default::default()
                    },
                ),
                1000,
            );
        }
        let summary = history_summary(&s);
        assert!(summary.len() <= SUMMARY_CAP_BYTES + 100);
        // The tail (most recent steps) is what survives.
        assert!(summary.contains("step number 499"));
    }
}
