// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub proposer: ProposerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub turn: TurnConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

/// `[remote]` — the target host and per-command limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub host: String,
    pub user: String,
    pub port: u16,
    /// Private key path. `None` lets ssh pick its defaults/agent.
    pub identity_file: Option<String>,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// Max commands in flight against one host.
    pub max_concurrent: usize,
    /// Cap on stdout/stderr returned per command (tail-kept).
    pub output_cap_kb: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            user: "cloudhand".into(),
            port: 22,
            identity_file: None,
            connect_timeout_secs: 10,
            command_timeout_secs: 30,
            max_concurrent: 4,
            output_cap_kb: 8,
        }
    }
}

/// `[proposer]` — the external NL step-proposal service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposerConfig {
    pub base_url: String,
    /// Name of the env var holding the bearer token, if the service needs one.
    pub api_key_env: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8700".into(),
            api_key_env: None,
            request_timeout_secs: 60,
        }
    }
}

/// `[session]` — per-conversation state limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_history: usize,
    pub idle_timeout_secs: u64,
    pub eviction_interval_secs: u64,
    /// Write JSON snapshots to the sessions dir on release.
    pub persist: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: 50,
            idle_timeout_secs: 1800,
            eviction_interval_secs: 300,
            persist: false,
        }
    }
}

/// `[turn]` — execution loop limits for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Hard cap on steps per turn; the planner terminates at the cap.
    pub max_steps: usize,
    /// Backoff before the single transient retry.
    pub retry_backoff_ms: u64,
    /// How many recent steps the final summary shows.
    pub summary_steps: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_steps: 12,
            retry_backoff_ms: 500,
            summary_steps: 5,
        }
    }
}

/// `[api]` — chat-platform HTTP bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8710".into(),
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
