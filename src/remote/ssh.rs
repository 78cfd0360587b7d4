// src/remote/ssh.rs — SSH-backed remote executor
//
// Commands are wrapped in a remote `timeout` guard and additionally
// bounded locally; a command that overruns is killed, not left running
// unaccounted. Output is captured in full and returned as a tail-kept
// excerpt with truncation flagged.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use url::Url;

use super::pool::ConnectionPool;
use super::{ExecContext, RemoteExecutor};
use crate::core::truncation::truncate_tail;
use crate::core::types::ExecResult;
use crate::infra::config::RemoteConfig;
use crate::infra::errors::CloudhandError;

/// Slack on top of the remote `timeout` guard before the local kill fires.
const LOCAL_GRACE: Duration = Duration::from_secs(5);

pub struct SshExecutor {
    cfg: RemoteConfig,
    pool: ConnectionPool,
}

impl SshExecutor {
    pub fn new(cfg: RemoteConfig) -> Result<Self, CloudhandError> {
        // Fail at startup, not mid-turn, when there is no ssh client.
        which::which("ssh")
            .map_err(|_| CloudhandError::Config("ssh binary not found on PATH".into()))?;
        let pool = ConnectionPool::new(cfg.clone());
        Ok(Self { cfg, pool })
    }

    fn output_cap(&self) -> usize {
        self.cfg.output_cap_kb * 1024
    }

    /// Build the command line that runs remotely: cd into the session's
    /// working directory, apply env overrides, guard with `timeout`.
    fn remote_command(&self, ctx: &ExecContext, command: &str, timeout: Duration) -> String {
        let mut env_prefix = String::new();
        for (name, value) in &ctx.env {
            env_prefix.push_str(&format!("{}={} ", name, shell_quote(value)));
        }
        let logic = format!(
            "cd {} && {}{}",
            shell_quote(&ctx.working_dir),
            env_prefix,
            command
        );
        format!(
            "timeout {}s sh -c {}",
            timeout.as_secs().max(1),
            shell_quote(&logic)
        )
    }

    fn excerpt(&self, raw: &[u8]) -> (String, bool) {
        let text = String::from_utf8_lossy(raw);
        let t = truncate_tail(&text, self.output_cap());
        (t.content, t.was_truncated)
    }

    async fn run(
        &self,
        ctx: &ExecContext,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecResult, CloudhandError> {
        let lease = self.pool.acquire().await?;
        let remote = self.remote_command(ctx, command, timeout);
        let started = Instant::now();

        let mut cmd = Command::new("ssh");
        cmd.arg("-S")
            .arg(&lease.socket)
            .args(["-o", "BatchMode=yes"])
            .arg("-p")
            .arg(self.cfg.port.to_string())
            .arg(self.pool.target())
            .arg("--")
            .arg(&remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = %command, "remote execute");

        let child = cmd.spawn().map_err(|e| CloudhandError::Connection {
            host: self.cfg.host.clone(),
            message: format!("failed to spawn ssh: {e}"),
        })?;

        let output = match tokio::time::timeout(timeout + LOCAL_GRACE, child.wait_with_output())
            .await
        {
            // Dropping the future kills the child via kill_on_drop.
            Err(_) => {
                tracing::warn!(command = %command, "remote command killed on local timeout");
                return Err(CloudhandError::Timeout {
                    command: command.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
            Ok(Err(e)) => {
                return Err(CloudhandError::Connection {
                    host: self.cfg.host.clone(),
                    message: format!("ssh process failed: {e}"),
                });
            }
            Ok(Ok(output)) => output,
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let (stdout, stdout_truncated) = self.excerpt(&output.stdout);
        let (stderr, stderr_truncated) = self.excerpt(&output.stderr);

        // Exit 255 is ssh's own failure, not the remote command's.
        if exit_code == 255 {
            self.pool.invalidate().await;
            let lowered = stderr.to_lowercase();
            if lowered.contains("permission denied") || lowered.contains("authentication") {
                return Err(CloudhandError::Authentication {
                    host: self.cfg.host.clone(),
                    message: stderr.trim().to_string(),
                });
            }
            return Err(CloudhandError::Connection {
                host: self.cfg.host.clone(),
                message: stderr.trim().to_string(),
            });
        }

        Ok(ExecResult {
            exit_code,
            stdout,
            stderr,
            duration: started.elapsed(),
            stdout_truncated,
            stderr_truncated,
        })
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(
        &self,
        ctx: &ExecContext,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecResult, CloudhandError> {
        self.run(ctx, command, timeout).await
    }

    async fn clone_repository(
        &self,
        ctx: &ExecContext,
        url: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<ExecResult, CloudhandError> {
        if !is_repository_url(url) {
            return Ok(sub_step_failure(
                "url-check",
                128,
                format!("not a valid repository url: {url}"),
            ));
        }

        let dest_check = self
            .run(ctx, &format!("test -e {}", shell_quote(destination)), timeout)
            .await?;
        if dest_check.success() {
            return Ok(sub_step_failure(
                "destination-check",
                1,
                format!("destination '{destination}' already exists"),
            ));
        }

        let mut clone = self
            .run(
                ctx,
                &format!(
                    "git clone {} {}",
                    shell_quote(url),
                    shell_quote(destination)
                ),
                timeout,
            )
            .await?;
        if !clone.success() {
            clone.stderr = format!("[clone:clone] {}", clone.stderr);
            return Ok(clone);
        }

        if !self.dir_exists(ctx, destination, timeout).await? {
            return Ok(sub_step_failure(
                "verify",
                1,
                format!("clone reported success but '{destination}' is missing"),
            ));
        }

        Ok(clone)
    }

    async fn dir_exists(
        &self,
        ctx: &ExecContext,
        path: &str,
        timeout: Duration,
    ) -> Result<bool, CloudhandError> {
        let result = self
            .run(ctx, &format!("test -d {}", shell_quote(path)), timeout)
            .await?;
        Ok(result.success())
    }
}

fn sub_step_failure(sub_step: &str, exit_code: i32, message: String) -> ExecResult {
    ExecResult {
        exit_code,
        stderr: format!("[clone:{sub_step}] {message}"),
        ..Default::default()
    }
}

/// Accepts http(s)/ssh/git URLs plus scp-like `user@host:path` forms.
pub fn is_repository_url(raw: &str) -> bool {
    if raw.trim().is_empty() || raw.contains(char::is_whitespace) {
        return false;
    }
    if let Ok(url) = Url::parse(raw) {
        return matches!(url.scheme(), "http" | "https" | "ssh" | "git");
    }
    // scp-like: git@github.com:owner/repo.git
    match raw.split_once('@') {
        Some((user, rest)) => !user.is_empty() && rest.contains(':'),
        None => false,
    }
}

/// POSIX single-quote escaping.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
