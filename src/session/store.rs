// src/session/store.rs — Concurrency-safe session store
//
// At most one execution loop holds a given session at any time. A second
// request for the same key is rejected with SessionBusyError, never
// interleaved. The exclusivity flag also shields a held session from the
// idle-eviction sweep.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{snapshot, Session, SessionKey};
use crate::core::types::SessionStatus;
use crate::infra::config::SessionConfig;
use crate::infra::errors::CloudhandError;

#[derive(Debug)]
struct Slot {
    session: Session,
    busy: bool,
    last_activity: Instant,
}

pub struct SessionStore {
    slots: Arc<Mutex<HashMap<SessionKey, Slot>>>,
    cfg: SessionConfig,
    default_working_dir: String,
    /// When set, sessions are mirrored to JSON snapshots: loaded on first
    /// use, written on release, removed on reset.
    snapshot_dir: Option<PathBuf>,
}

/// Exclusive access to one session for the duration of a turn. Dropping
/// the handle without `release` unlocks the slot but discards mutations —
/// a panicked or aborted turn can never wedge the session as busy.
#[derive(Debug)]
pub struct SessionHandle {
    pub session: Session,
    key: SessionKey,
    slots: Arc<Mutex<HashMap<SessionKey, Slot>>>,
    released: bool,
}

impl SessionStore {
    pub fn new(cfg: SessionConfig, default_working_dir: impl Into<String>) -> Self {
        let snapshot_dir = cfg.persist.then(crate::infra::paths::sessions_dir);
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            cfg,
            default_working_dir: default_working_dir.into(),
            snapshot_dir,
        }
    }

    /// Override the snapshot directory (tests use a tempdir).
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    /// Take the exclusive handle for `key`, creating the session on first
    /// use. Fails with SessionBusyError when another turn holds it.
    pub fn get_or_create(&self, key: &SessionKey) -> Result<SessionHandle, CloudhandError> {
        let mut slots = self.slots.lock().expect("session store poisoned");

        let slot = slots.entry(key.clone()).or_insert_with(|| {
            let session = self
                .load_snapshot(key)
                .unwrap_or_else(|| {
                    tracing::info!(session = %key, "creating session");
                    Session::new(key.clone(), self.default_working_dir.clone())
                });
            Slot {
                session,
                busy: false,
                last_activity: Instant::now(),
            }
        });

        if slot.busy {
            return Err(CloudhandError::SessionBusy {
                key: key.to_string(),
            });
        }

        slot.busy = true;
        slot.last_activity = Instant::now();
        Ok(SessionHandle {
            session: slot.session.clone(),
            key: key.clone(),
            slots: self.slots.clone(),
            released: false,
        })
    }

    /// Write the mutated session back and unlock the slot.
    pub fn release(&self, mut handle: SessionHandle) {
        {
            let mut slots = self.slots.lock().expect("session store poisoned");
            if let Some(slot) = slots.get_mut(&handle.key) {
                slot.session = handle.session.clone();
                slot.busy = false;
                slot.last_activity = Instant::now();
            }
        }
        if let Some(ref dir) = self.snapshot_dir {
            if let Err(e) = snapshot::save(dir, &handle.session) {
                tracing::warn!(session = %handle.key, "snapshot failed: {e}");
            }
        }
        handle.released = true;
    }

    /// Destroy the session for `key` (explicit user reset). A busy
    /// session cannot be reset out from under its turn.
    pub fn reset(&self, key: &SessionKey) -> Result<bool, CloudhandError> {
        let mut slots = self.slots.lock().expect("session store poisoned");
        match slots.get(key) {
            Some(slot) if slot.busy => Err(CloudhandError::SessionBusy {
                key: key.to_string(),
            }),
            Some(_) => {
                slots.remove(key);
                if let Some(ref dir) = self.snapshot_dir {
                    let _ = snapshot::remove(dir, key);
                }
                tracing::info!(session = %key, "session reset");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn load_snapshot(&self, key: &SessionKey) -> Option<Session> {
        let dir = self.snapshot_dir.as_ref()?;
        match snapshot::load(dir, key) {
            Ok(Some(session)) => {
                tracing::info!(session = %key, "restored session from snapshot");
                Some(session)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(session = %key, "snapshot load failed: {e}");
                None
            }
        }
    }

    /// Remove sessions idle longer than `max_age`. Held sessions are
    /// skipped — eviction never races an in-flight loop. An evicted key
    /// starts over from a fresh session, so its snapshot goes too.
    pub fn evict_idle(&self, max_age: Duration) -> usize {
        let mut slots = self.slots.lock().expect("session store poisoned");
        let before = slots.len();
        slots.retain(|key, slot| {
            let keep = slot.busy || slot.last_activity.elapsed() <= max_age;
            if !keep {
                tracing::info!(session = %key, "evicting idle session");
                if let Some(ref dir) = self.snapshot_dir {
                    let _ = snapshot::remove(dir, key);
                }
            }
            keep
        });
        before - slots.len()
    }

    /// Peek at a session's status without taking the handle.
    pub fn status_of(&self, key: &SessionKey) -> Option<SessionStatus> {
        let slots = self.slots.lock().expect("session store poisoned");
        slots.get(key).map(|s| s.session.status)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().expect("session store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Background sweep at the configured interval.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = self;
        let interval = Duration::from_secs(store.cfg.eviction_interval_secs.max(1));
        let max_age = Duration::from_secs(store.cfg.idle_timeout_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let evicted = store.evict_idle(max_age);
                if evicted > 0 {
                    tracing::debug!(evicted, "idle session sweep");
                }
            }
        })
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Unlock without writing state back; the turn did not complete.
        if let Ok(mut slots) = self.slots.lock() {
            if let Some(slot) = slots.get_mut(&self.key) {
                slot.busy = false;
                slot.last_activity = Instant::now();
            }
        }
    }
}
