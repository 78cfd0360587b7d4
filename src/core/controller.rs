// src/core/controller.rs — The plan-execute-observe loop
//
// One turn = one run of the state machine:
//   Idle -> Planning -> Executing -> { Observing -> Planning
//                                    | AwaitingUser | Terminal }
// The controller is the only code that mutates a session, and it only
// ever does so while holding the session's exclusive handle.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::classifier::{classify_error, classify_exec};
use crate::core::types::{
    Classification, ExecResult, SessionStatus, Step, StepRecord, TerminateReason, TurnReply,
};
use crate::infra::config::Config;
use crate::infra::errors::CloudhandError;
use crate::planner::Planner;
use crate::remote::{ExecContext, RemoteExecutor};
use crate::session::store::{SessionHandle, SessionStore};
use crate::session::{Session, SessionKey};

enum LoopState {
    Planning,
    Executing(Step),
    AwaitingUser(String),
    Terminal(TerminateReason),
}

/// What one execution attempt produced: either a fully captured result or
/// an executor-level error already turned into a classification.
enum Attempt {
    Completed(ExecResult),
    Errored(CloudhandError, Classification),
}

pub struct Controller {
    planner: Planner,
    executor: Arc<dyn RemoteExecutor>,
    store: Arc<SessionStore>,
    command_timeout: Duration,
    retry_backoff: Duration,
    max_history: usize,
    summary_steps: usize,
    home_dir: String,
}

impl Controller {
    pub fn new(
        planner: Planner,
        executor: Arc<dyn RemoteExecutor>,
        store: Arc<SessionStore>,
        cfg: &Config,
    ) -> Self {
        Self {
            planner,
            executor,
            store,
            command_timeout: Duration::from_secs(cfg.remote.command_timeout_secs),
            retry_backoff: Duration::from_millis(cfg.turn.retry_backoff_ms),
            max_history: cfg.session.max_history,
            summary_steps: cfg.turn.summary_steps,
            home_dir: format!("/home/{}", cfg.remote.user),
        }
    }

    /// Run one chat turn for `key`. Takes the session's exclusive handle,
    /// drives the loop, and always releases — including on abort.
    pub async fn handle_turn(
        &self,
        key: &SessionKey,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<TurnReply, CloudhandError> {
        let mut handle: SessionHandle = self.store.get_or_create(key)?;

        let outcome = self.run_turn(&mut handle.session, text, &cancel).await;

        match outcome {
            Ok(reply) => {
                self.store.release(handle);
                Ok(reply)
            }
            Err(e) => {
                if e.is_boundary() {
                    tracing::error!(session = %key, kind = e.kind(), "turn aborted: {e}");
                } else {
                    tracing::warn!(session = %key, kind = e.kind(), "turn failed: {e}");
                }
                // The turn aborted; the session itself stays usable.
                handle.session.status = SessionStatus::Idle;
                handle.session.pending_intent = None;
                handle.session.last_error = Some(e.to_string());
                self.store.release(handle);
                Err(e)
            }
        }
    }

    async fn run_turn(
        &self,
        session: &mut Session,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReply, CloudhandError> {
        // Resuming from AwaitingUser: this message answers the open
        // question and the original intent continues.
        let intent = if session.status == SessionStatus::AwaitingUser {
            if let Some(q) = session.open_question_mut() {
                q.user_reply = Some(text.to_string());
            }
            session.status = SessionStatus::Idle;
            session
                .pending_intent
                .clone()
                .unwrap_or_else(|| text.to_string())
        } else {
            session.pending_intent = Some(text.to_string());
            text.to_string()
        };

        let mut steps_taken = 0usize;
        let mut state = LoopState::Planning;

        let reason = loop {
            if cancel.is_cancelled() {
                break TerminateReason::Cancelled;
            }

            match state {
                LoopState::Planning => {
                    session.status = SessionStatus::Planning;
                    let step = tokio::select! {
                        _ = cancel.cancelled() => break TerminateReason::Cancelled,
                        step = self.planner.next_step(session, &intent, steps_taken) => step?,
                    };
                    state = match step {
                        Step::Terminate { reason } => LoopState::Terminal(reason),
                        Step::AskUser { question } => LoopState::AwaitingUser(question),
                        executable => LoopState::Executing(executable),
                    };
                }

                LoopState::Executing(step) => {
                    session.status = SessionStatus::Executing;
                    steps_taken += 1;
                    state = self.execute_and_observe(session, step, cancel).await?;
                }

                LoopState::AwaitingUser(question) => {
                    session.push_record(
                        StepRecord::new(Step::AskUser {
                            question: question.clone(),
                        }),
                        self.max_history,
                    );
                    session.status = SessionStatus::AwaitingUser;
                    tracing::info!(session = %session.key, "suspending for user input");
                    return Ok(TurnReply::question(question));
                }

                LoopState::Terminal(reason) => break reason,
            }
        };

        session.status = SessionStatus::Idle;
        session.pending_intent = None;
        Ok(TurnReply::final_text(self.summarize(session, reason)))
    }

    /// Execute one step, fold the observation into the session, and
    /// decide the next state. Transient failures retry exactly once.
    async fn execute_and_observe(
        &self,
        session: &mut Session,
        step: Step,
        cancel: &CancellationToken,
    ) -> Result<LoopState, CloudhandError> {
        let first = match self.attempt(session, &step, cancel).await? {
            Some(attempt) => attempt,
            None => return Ok(LoopState::Terminal(TerminateReason::Cancelled)),
        };

        let attempt = if self.should_retry(&first) {
            self.observe(session, &step, first);
            tracing::info!(step = %step.describe(), "transient failure, retrying once");
            tokio::time::sleep(self.retry_backoff).await;
            match self.attempt(session, &step, cancel).await? {
                Some(second) => second,
                None => return Ok(LoopState::Terminal(TerminateReason::Cancelled)),
            }
        } else {
            first
        };

        // A connection failure that survived the retry is a boundary
        // abort, not a re-planning input.
        let attempt = match attempt {
            Attempt::Errored(e @ CloudhandError::Connection { .. }, c) => {
                self.observe_error(session, &step, &e, c);
                return Err(e);
            }
            other => other,
        };

        let classification = match &attempt {
            Attempt::Completed(result) if result.success() => None,
            Attempt::Completed(result) => Some(classify_exec(result)),
            Attempt::Errored(_, c) => Some(*c),
        };
        self.observe(session, &step, attempt);

        match classification {
            Some(Classification::Fatal) => {
                tracing::error!(step = %step.describe(), "fatal failure, terminating");
                Ok(LoopState::Terminal(TerminateReason::FatalFailure))
            }
            // UserActionable and second-chance Transient both go back to
            // planning; the failure is in the summary the proposer sees.
            _ => Ok(LoopState::Planning),
        }
    }

    fn should_retry(&self, attempt: &Attempt) -> bool {
        match attempt {
            Attempt::Errored(_, Classification::Transient) => true,
            Attempt::Completed(result) => {
                !result.success() && classify_exec(result) == Classification::Transient
            }
            _ => false,
        }
    }

    /// Run one attempt of a step. Returns `None` when cancelled mid-flight
    /// (the ssh child is killed by dropping its future).
    async fn attempt(
        &self,
        session: &mut Session,
        step: &Step,
        cancel: &CancellationToken,
    ) -> Result<Option<Attempt>, CloudhandError> {
        let ctx = ExecContext {
            working_dir: session.working_dir.clone(),
            env: session.env_overrides.clone(),
        };

        let outcome = {
            let fut = async {
                match step {
                    Step::ShellCommand { command } => {
                        self.run_shell(session, &ctx, command).await
                    }
                    Step::CloneRepository { url, destination } => {
                        let result = self
                            .executor
                            .clone_repository(&ctx, url, destination, self.command_timeout)
                            .await?;
                        if result.success() {
                            // The composite's final sub-step: enter the clone.
                            session.working_dir =
                                resolve_path(&session.working_dir, &self.home_dir, destination);
                        }
                        Ok(result)
                    }
                    // Validated out before Executing; arm kept for totality.
                    Step::AskUser { .. } | Step::Terminate { .. } => Ok(ExecResult::default()),
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => None,
                result = fut => Some(result),
            }
        };

        let result = match outcome {
            None => {
                tracing::info!(step = %step.describe(), "cancelled in flight");
                return Ok(None);
            }
            Some(result) => result,
        };

        match result {
            Ok(exec) => Ok(Some(Attempt::Completed(exec))),
            Err(e @ CloudhandError::Authentication { .. }) => {
                // Auth failures abort immediately with the boundary error.
                self.observe_error(session, step, &e, Classification::Fatal);
                Err(e)
            }
            Err(e @ (CloudhandError::Timeout { .. } | CloudhandError::Connection { .. })) => {
                let c = classify_error(&e);
                Ok(Some(Attempt::Errored(e, c)))
            }
            Err(e) => Err(e),
        }
    }

    /// Shell steps with session-state side effects (`cd`, `export`,
    /// `NAME=value`) are resolved against the session rather than run as
    /// lone remote commands; everything else goes to the executor as-is.
    async fn run_shell(
        &self,
        session: &mut Session,
        ctx: &ExecContext,
        command: &str,
    ) -> Result<ExecResult, CloudhandError> {
        if let Some(path) = parse_cd(command) {
            let target = resolve_path(&session.working_dir, &self.home_dir, &path);
            return if self
                .executor
                .dir_exists(ctx, &target, self.command_timeout)
                .await?
            {
                session.working_dir = target.clone();
                Ok(ExecResult {
                    exit_code: 0,
                    stdout: target,
                    ..Default::default()
                })
            } else {
                Ok(ExecResult {
                    exit_code: 1,
                    stderr: format!("cd: no such directory: {target}"),
                    ..Default::default()
                })
            };
        }

        if let Some((name, value)) = parse_export(command) {
            session.env_overrides.insert(name.clone(), value.clone());
            return Ok(ExecResult {
                exit_code: 0,
                stdout: format!("set {name}={value}"),
                ..Default::default()
            });
        }

        self.executor
            .execute(ctx, command, self.command_timeout)
            .await
    }

    fn observe(&self, session: &mut Session, step: &Step, attempt: Attempt) {
        let mut record = match attempt {
            Attempt::Completed(result) => {
                let mut r = StepRecord::with_result(step.clone(), result);
                if let Some(res) = r.result.as_ref() {
                    if !res.success() {
                        r.classification = Some(classify_exec(res));
                    }
                }
                r
            }
            Attempt::Errored(e, classification) => {
                let mut r = StepRecord::new(step.clone());
                r.classification = Some(classification);
                session.last_error = Some(e.to_string());
                r
            }
        };
        if record.failed() {
            session.last_error = record
                .result
                .as_ref()
                .map(|r| r.stderr.trim().to_string())
                .or_else(|| session.last_error.clone());
        }
        session.push_record(record, self.max_history);
    }

    fn observe_error(
        &self,
        session: &mut Session,
        step: &Step,
        error: &CloudhandError,
        classification: Classification,
    ) {
        let mut record = StepRecord::new(step.clone());
        record.classification = Some(classification);
        session.last_error = Some(error.to_string());
        session.push_record(record, self.max_history);
    }

    /// Plain-language final summary: outcome plus the last N steps.
    fn summarize(&self, session: &Session, reason: TerminateReason) -> String {
        let headline = match reason {
            TerminateReason::Done => "Task completed.",
            TerminateReason::StepLimit => {
                "Stopped: the step limit for one request was reached."
            }
            TerminateReason::FatalFailure => "Task failed.",
            TerminateReason::Cancelled => "Task cancelled.",
        };

        let mut lines = vec![headline.to_string()];
        let recent: Vec<&StepRecord> = session
            .history
            .iter()
            .rev()
            .take(self.summary_steps)
            .collect();
        for record in recent.into_iter().rev() {
            let mark = if record.failed() { "failed" } else { "ok" };
            let mut line = format!("  [{mark}] {}", record.step.describe());
            if let Some(c) = record.classification {
                line.push_str(&format!(" ({c})"));
            }
            lines.push(line);
        }
        if let (TerminateReason::FatalFailure, Some(err)) = (reason, &session.last_error) {
            lines.push(format!("Last error: {err}"));
        }
        lines.join("\n")
    }
}

/// `cd` with a single path argument and no chaining.
fn parse_cd(command: &str) -> Option<String> {
    let trimmed = command.trim();
    if trimmed.contains("&&") || trimmed.contains(';') || trimmed.contains('|') {
        return None;
    }
    if trimmed == "cd" {
        return Some("~".into());
    }
    trimmed
        .strip_prefix("cd ")
        .map(|rest| rest.trim().trim_matches('\'').trim_matches('"').to_string())
        .filter(|p| !p.is_empty())
}

/// `export NAME=value` or a bare `NAME=value` assignment.
fn parse_export(command: &str) -> Option<(String, String)> {
    let trimmed = command.trim();
    if trimmed.contains("&&") || trimmed.contains(';') || trimmed.contains('|') {
        return None;
    }
    let assignment = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim();
    let (name, value) = assignment.split_once('=')?;
    let name = name.trim();
    if name.is_empty()
        || name.contains(char::is_whitespace)
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        || name.chars().next().is_some_and(|c| c.is_ascii_digit())
    {
        return None;
    }
    let value = value.trim().trim_matches('\'').trim_matches('"').to_string();
    Some((name.to_string(), value))
}

/// Resolve a possibly-relative path against the session's working dir,
/// expanding `~` to the remote user's home.
fn resolve_path(working_dir: &str, home: &str, path: &str) -> String {
    if path == "~" {
        home.to_string()
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("{}/{}", home.trim_end_matches('/'), rest)
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", working_dir.trim_end_matches('/'), path)
    }
}
