// src/remote/mod.rs — Remote execution boundary

pub mod pool;
pub mod ssh;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::core::types::ExecResult;
use crate::infra::errors::CloudhandError;

/// Session state a command runs under: every invocation starts from the
/// session's working directory with its environment overrides applied.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    pub working_dir: String,
    pub env: BTreeMap<String, String>,
}

impl ExecContext {
    pub fn new(working_dir: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
        }
    }
}

/// Executes commands on the remote host. Implemented over ssh in
/// production and scripted in tests.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run one command. The result is always fully captured (or the call
    /// fails with Timeout/Connection) — never partially observed.
    async fn execute(
        &self,
        ctx: &ExecContext,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecResult, CloudhandError>;

    /// Composite clone: URL check → destination check → clone → verify.
    /// Exposed as one atomic operation; a failed sub-step aborts the rest
    /// and names itself in the recorded stderr.
    async fn clone_repository(
        &self,
        ctx: &ExecContext,
        url: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<ExecResult, CloudhandError>;

    /// Whether `path` is a directory on the remote host (relative paths
    /// resolve against the context's working directory).
    async fn dir_exists(
        &self,
        ctx: &ExecContext,
        path: &str,
        timeout: Duration,
    ) -> Result<bool, CloudhandError>;
}
