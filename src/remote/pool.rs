// src/remote/pool.rs — Per-host connection pool
//
// One control-master socket per target host, shared by every session that
// targets it. A semaphore caps commands in flight; permits are scoped so
// a timeout or failure can never leak one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::infra::config::RemoteConfig;
use crate::infra::errors::CloudhandError;
use crate::infra::paths;

/// A connection is considered stale after this much inactivity and is
/// re-checked before reuse.
const STALE_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct Master {
    socket: PathBuf,
    last_used: Instant,
}

/// Pool of one authenticated channel per host, plus the in-flight cap.
pub struct ConnectionPool {
    cfg: RemoteConfig,
    limiter: Arc<Semaphore>,
    master: Mutex<Option<Master>>,
}

/// Held for the duration of one remote command. Dropping it releases the
/// per-host slot.
pub struct ConnectionLease {
    pub socket: PathBuf,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionPool {
    pub fn new(cfg: RemoteConfig) -> Self {
        let limiter = Arc::new(Semaphore::new(cfg.max_concurrent.max(1)));
        Self {
            cfg,
            limiter,
            master: Mutex::new(None),
        }
    }

    pub fn target(&self) -> String {
        format!("{}@{}", self.cfg.user, self.cfg.host)
    }

    fn socket_path(&self) -> PathBuf {
        paths::control_sockets_dir().join(format!("{}-{}.sock", self.cfg.host, self.cfg.port))
    }

    /// Acquire a slot and a live control-master socket, establishing or
    /// re-establishing the master as needed.
    pub async fn acquire(&self) -> Result<ConnectionLease, CloudhandError> {
        let permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CloudhandError::Connection {
                host: self.cfg.host.clone(),
                message: "connection pool closed".into(),
            })?;

        let mut master = self.master.lock().await;

        let needs_establish = match master.as_ref() {
            None => true,
            Some(m) => m.last_used.elapsed() > STALE_AFTER && !self.check_master(&m.socket).await,
        };

        if needs_establish {
            let socket = self.socket_path();
            self.establish(&socket).await?;
            *master = Some(Master {
                socket,
                last_used: Instant::now(),
            });
        }

        let m = master.as_mut().expect("master populated above");
        m.last_used = Instant::now();
        Ok(ConnectionLease {
            socket: m.socket.clone(),
            _permit: permit,
        })
    }

    /// Drop the cached master so the next acquire re-authenticates.
    pub async fn invalidate(&self) {
        let mut master = self.master.lock().await;
        if let Some(m) = master.take() {
            // Best effort: ask ssh to tear the master down.
            let _ = Command::new("ssh")
                .args(["-S"])
                .arg(&m.socket)
                .args(["-O", "exit", &self.target()])
                .output()
                .await;
        }
    }

    /// `ssh -O check` against an existing socket.
    async fn check_master(&self, socket: &PathBuf) -> bool {
        Command::new("ssh")
            .arg("-S")
            .arg(socket)
            .args(["-O", "check", &self.target()])
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Start a background control master, validating authentication.
    async fn establish(&self, socket: &PathBuf) -> Result<(), CloudhandError> {
        tokio::fs::create_dir_all(paths::control_sockets_dir())
            .await
            .map_err(CloudhandError::Io)?;
        // A dead socket file makes ssh refuse to bind; clear it first.
        let _ = tokio::fs::remove_file(socket).await;

        let mut cmd = Command::new("ssh");
        cmd.args(["-M", "-fN"])
            .arg("-S")
            .arg(socket)
            .args(["-o", "BatchMode=yes"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.cfg.connect_timeout_secs))
            .arg("-p")
            .arg(self.cfg.port.to_string());
        if let Some(ref identity) = self.cfg.identity_file {
            cmd.args(["-i", identity]);
        }
        cmd.arg(self.target());

        let output = cmd.output().await.map_err(|e| CloudhandError::Connection {
            host: self.cfg.host.clone(),
            message: format!("failed to spawn ssh: {e}"),
        })?;

        if output.status.success() {
            tracing::info!(host = %self.cfg.host, "remote connection established");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let lowered = stderr.to_lowercase();
        if lowered.contains("permission denied") || lowered.contains("authentication") {
            Err(CloudhandError::Authentication {
                host: self.cfg.host.clone(),
                message: stderr.trim().to_string(),
            })
        } else {
            Err(CloudhandError::Connection {
                host: self.cfg.host.clone(),
                message: stderr.trim().to_string(),
            })
        }
    }
}
