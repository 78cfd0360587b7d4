// src/session/snapshot.rs — JSON session snapshots
//
// Sessions live in memory; when persistence is enabled each release
// writes one JSON file per session key. The layout is fixed:
// {session_key, working_dir, environment, history[], status} — nothing
// else is part of the persisted surface.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Session, SessionKey};
use crate::core::types::{SessionStatus, StepRecord};
use crate::infra::errors::CloudhandError;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_key: SessionKey,
    pub working_dir: String,
    pub environment: BTreeMap<String, String>,
    pub history: VecDeque<StepRecord>,
    pub status: SessionStatus,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            session_key: session.key.clone(),
            working_dir: session.working_dir.clone(),
            environment: session.env_overrides.clone(),
            history: session.history.clone(),
            status: session.status,
        }
    }
}

impl SessionSnapshot {
    pub fn into_session(self) -> Session {
        let mut session = Session::new(self.session_key, self.working_dir);
        session.env_overrides = self.environment;
        session.history = self.history;
        session.status = self.status;
        session
    }
}

fn snapshot_path(dir: &Path, key: &SessionKey) -> PathBuf {
    // Key parts can contain anything the chat platform allows; keep the
    // filename flat and unambiguous.
    let name = format!(
        "{}--{}.json",
        sanitize(&key.user),
        sanitize(&key.channel)
    );
    dir.join(name)
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

pub fn save(dir: &Path, session: &Session) -> Result<(), CloudhandError> {
    std::fs::create_dir_all(dir)?;
    let snapshot = SessionSnapshot::from(session);
    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| CloudhandError::Config(format!("snapshot encode: {e}")))?;
    std::fs::write(snapshot_path(dir, &session.key), json)?;
    Ok(())
}

pub fn load(dir: &Path, key: &SessionKey) -> Result<Option<Session>, CloudhandError> {
    let path = snapshot_path(dir, key);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let snapshot: SessionSnapshot = serde_json::from_str(&content)
        .map_err(|e| CloudhandError::Config(format!("snapshot decode: {e}")))?;
    Ok(Some(snapshot.into_session()))
}

pub fn remove(dir: &Path, key: &SessionKey) -> Result<(), CloudhandError> {
    let path = snapshot_path(dir, key);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Step;

    fn sample_session() -> Session {
        let mut s = Session::new(SessionKey::new("alice", "ops"), "/home/alice");
        s.env_overrides.insert("RUST_LOG".into(), "debug".into());
        s.push_record(
            StepRecord::new(Step::ShellCommand {
                command: "uptime".into(),
            }),
            50,
        );
        s.status = SessionStatus::AwaitingUser;
        s
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let session = sample_session();
        save(dir.path(), &session).unwrap();

        let loaded = load(dir.path(), &session.key).unwrap().unwrap();
        assert_eq!(loaded.working_dir, "/home/alice");
        assert_eq!(loaded.env_overrides.get("RUST_LOG").unwrap(), "debug");
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.status, SessionStatus::AwaitingUser);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(dir.path(), &SessionKey::new("nobody", "nowhere")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let session = sample_session();
        save(dir.path(), &session).unwrap();
        remove(dir.path(), &session.key).unwrap();
        assert!(load(dir.path(), &session.key).unwrap().is_none());
    }

    #[test]
    fn test_hostile_key_parts_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = sample_session();
        session.key = SessionKey::new("../../etc", "a/b c");
        save(dir.path(), &session).unwrap();
        // File lands inside the snapshot dir, not up the tree.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
