// tests/gateway_test.rs — Integration tests: chat boundary (stop/reset,
// busy handling, plain-language errors)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use cloudhand::api::gateway::ChatGateway;
use cloudhand::core::controller::Controller;
use cloudhand::core::types::ExecResult;
use cloudhand::infra::config::Config;
use cloudhand::infra::errors::CloudhandError;
use cloudhand::planner::Planner;
use cloudhand::proposer::{StepProposal, StepProposer};
use cloudhand::remote::{ExecContext, RemoteExecutor};
use cloudhand::session::store::SessionStore;
use cloudhand::session::SessionKey;

/// Proposer that always asks for one shell step, then completes.
struct OneShellProposer {
    command: String,
}

#[async_trait]
impl StepProposer for OneShellProposer {
    async fn propose_step(
        &self,
        _intent: &str,
        history: &str,
    ) -> Result<StepProposal, CloudhandError> {
        if history.contains(&self.command) {
            Ok(StepProposal {
                done: true,
                ..Default::default()
            })
        } else {
            Ok(StepProposal {
                kind: "shell_command".into(),
                payload: serde_json::json!({ "command": self.command }),
                done: false,
            })
        }
    }
}

/// Executor whose commands take `delay` to finish.
struct SlowExecutor {
    delay: Duration,
}

#[async_trait]
impl RemoteExecutor for SlowExecutor {
    async fn execute(
        &self,
        _ctx: &ExecContext,
        _command: &str,
        _timeout: Duration,
    ) -> Result<ExecResult, CloudhandError> {
        tokio::time::sleep(self.delay).await;
        Ok(ExecResult::default())
    }

    async fn clone_repository(
        &self,
        _ctx: &ExecContext,
        _url: &str,
        _destination: &str,
        _timeout: Duration,
    ) -> Result<ExecResult, CloudhandError> {
        Ok(ExecResult::default())
    }

    async fn dir_exists(
        &self,
        _ctx: &ExecContext,
        _path: &str,
        _timeout: Duration,
    ) -> Result<bool, CloudhandError> {
        Ok(true)
    }
}

fn gateway_with_delay(delay: Duration) -> (Arc<ChatGateway>, Arc<SessionStore>) {
    let mut cfg = Config::default();
    cfg.turn.retry_backoff_ms = 5;
    let store = Arc::new(SessionStore::new(cfg.session.clone(), "/home/dev"));
    let planner = Planner::new(
        Arc::new(OneShellProposer {
            command: "uptime".into(),
        }),
        cfg.turn.clone(),
    );
    let controller = Arc::new(Controller::new(
        planner,
        Arc::new(SlowExecutor { delay }),
        store.clone(),
        &cfg,
    ));
    (Arc::new(ChatGateway::new(controller, store.clone())), store)
}

#[tokio::test]
async fn test_simple_turn_completes() {
    let (gateway, _) = gateway_with_delay(Duration::from_millis(1));
    let reply = gateway.handle_message("u", "c", "check uptime").await;
    assert!(reply.is_final);
    assert!(reply.text.contains("Task completed"));
    assert!(reply.text.contains("uptime"));
}

#[tokio::test]
async fn test_stop_cancels_running_turn() {
    let (gateway, store) = gateway_with_delay(Duration::from_secs(30));

    let g = Arc::clone(&gateway);
    let turn = tokio::spawn(async move { g.handle_message("u", "c", "long task").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stop_reply = gateway.handle_message("u", "c", "stop").await;
    assert!(stop_reply.text.contains("Stopping"));

    let reply = turn.await.unwrap();
    assert!(reply.text.contains("Task cancelled"));

    // Unlocked and resumable within one step boundary.
    let handle = store.get_or_create(&SessionKey::new("u", "c")).unwrap();
    drop(handle);
}

#[tokio::test]
async fn test_stop_with_nothing_running() {
    let (gateway, _) = gateway_with_delay(Duration::from_millis(1));
    let reply = gateway.handle_message("u", "c", "stop").await;
    assert!(reply.text.contains("Nothing is running"));
}

#[tokio::test]
async fn test_busy_session_gets_friendly_reply() {
    let (gateway, _) = gateway_with_delay(Duration::from_secs(2));

    let g = Arc::clone(&gateway);
    let turn = tokio::spawn(async move { g.handle_message("u", "c", "long task").await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = gateway.handle_message("u", "c", "second task").await;
    assert!(second.is_final);
    assert!(second.text.contains("already running"));

    // Stop the first turn so the test doesn't wait the full delay.
    gateway.handle_message("u", "c", "stop").await;
    turn.await.unwrap();
}

#[tokio::test]
async fn test_reset_destroys_session() {
    let (gateway, store) = gateway_with_delay(Duration::from_millis(1));

    gateway.handle_message("u", "c", "check uptime").await;
    assert_eq!(store.len(), 1);

    let reply = gateway.handle_message("u", "c", "reset").await;
    assert!(reply.text.contains("reset"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_reset_without_session() {
    let (gateway, _) = gateway_with_delay(Duration::from_millis(1));
    let reply = gateway.handle_message("u", "c", "reset").await;
    assert!(reply.text.contains("No session"));
}

#[tokio::test]
async fn test_different_sessions_run_concurrently() {
    let (gateway, _) = gateway_with_delay(Duration::from_millis(150));

    let g1 = Arc::clone(&gateway);
    let g2 = Arc::clone(&gateway);
    let start = std::time::Instant::now();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { g1.handle_message("alice", "c", "task a").await }),
        tokio::spawn(async move { g2.handle_message("bob", "c", "task b").await }),
    );
    let elapsed = start.elapsed();

    assert!(a.unwrap().text.contains("Task completed"));
    assert!(b.unwrap().text.contains("Task completed"));
    // Two sessions with a 150ms command each; serial execution would
    // need ~300ms.
    assert!(
        elapsed < Duration::from_millis(280),
        "sessions should not serialize against each other (took {elapsed:?})"
    );
}
