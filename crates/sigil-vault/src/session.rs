//! Session lock state and passphrase verification.
//!
//! A single process-wide [`SessionManager`] owns the authenticated
//! flag. Sessions always start locked; there is no way to carry an
//! authenticated session across a process restart. The passphrase hash
//! is argon2id in PHC string form, persisted to a small state file —
//! never to the vault, which belongs to the secret store alone.

use std::path::PathBuf;
use std::sync::Mutex;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::{Result, VaultError};

/// Lock state of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Authenticated,
}

/// Why the session transitioned to locked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockReason {
    Explicit,
    IdleTimeout,
}

/// Observable session changes, broadcast so a UI can redraw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Unlocked,
    Locked(LockReason),
    PasswordChanged,
}

struct Inner {
    state: SessionState,
    last_activity: Instant,
    started: Instant,
    timeout_secs: u32,
    password_hash: Option<String>,
    /// Latched when an idle timeout fires; cleared by authenticate/extend.
    timed_out: bool,
}

/// Lock/unlock state machine guarding every signing operation.
pub struct SessionManager {
    inner: Mutex<Inner>,
    state_path: Option<PathBuf>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create a locked session. If `state_path` exists, the stored
    /// passphrase hash is loaded from it.
    pub fn new(timeout_secs: u32, state_path: Option<PathBuf>) -> Self {
        let password_hash = state_path
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let (events, _) = broadcast::channel(32);
        let now = Instant::now();
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Locked,
                last_activity: now,
                started: now,
                timeout_secs,
                password_hash,
                timed_out: false,
            }),
            state_path,
            events,
        }
    }

    /// Subscribe to session state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    /// Whether a passphrase has been configured yet.
    pub fn has_password(&self) -> bool {
        self.lock_inner().password_hash.is_some()
    }

    /// Seconds since the session object was created.
    pub fn uptime_secs(&self) -> u64 {
        self.lock_inner().started.elapsed().as_secs()
    }

    /// Change the passphrase. `current` must verify against the
    /// existing hash when one is configured; `new` must be non-empty.
    ///
    /// Argon2id is deliberately slow; call from a blocking context.
    pub fn set_password(&self, current: Option<&str>, new: &str) -> Result<()> {
        if new.is_empty() {
            return Err(VaultError::EmptyPassphrase);
        }

        let mut inner = self.lock_inner();
        if let Some(existing) = &inner.password_hash {
            let current = current.ok_or(VaultError::WrongPassphrase)?;
            verify_hash(existing, current)?;
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(new.as_bytes(), &salt)
            .map_err(|e| VaultError::Kdf(e.to_string()))?
            .to_string();
        inner.password_hash = Some(hash.clone());
        drop(inner);

        self.persist_hash(&hash)?;
        let _ = self.events.send(SessionEvent::PasswordChanged);
        tracing::info!("session passphrase changed");
        Ok(())
    }

    /// Unlock the session. With no configured passphrase this succeeds
    /// unconditionally (first-run).
    ///
    /// Argon2id is deliberately slow; call from a blocking context.
    pub fn authenticate(&self, passphrase: &str) -> Result<()> {
        let mut inner = self.lock_inner();
        if let Some(hash) = &inner.password_hash {
            verify_hash(hash, passphrase)?;
        }
        inner.state = SessionState::Authenticated;
        inner.last_activity = Instant::now();
        inner.timed_out = false;
        drop(inner);

        let _ = self.events.send(SessionEvent::Unlocked);
        tracing::info!("session unlocked");
        Ok(())
    }

    /// Lock the session explicitly.
    pub fn lock(&self) {
        let mut inner = self.lock_inner();
        let was_authenticated = inner.state == SessionState::Authenticated;
        inner.state = SessionState::Locked;
        drop(inner);

        if was_authenticated {
            let _ = self.events.send(SessionEvent::Locked(LockReason::Explicit));
            tracing::info!("session locked");
        }
    }

    /// Record activity, deferring the idle timeout.
    pub fn extend(&self) {
        let mut inner = self.lock_inner();
        inner.last_activity = Instant::now();
        inner.timed_out = false;
    }

    /// Enforce the idle timeout. Returns true while the session is
    /// timed out; the answer only flips back on authenticate or extend.
    /// `timeout_secs == 0` disables auto-lock.
    pub fn check_timeout(&self) -> bool {
        let mut inner = self.lock_inner();
        if inner.timed_out {
            return true;
        }
        if inner.state != SessionState::Authenticated || inner.timeout_secs == 0 {
            return false;
        }
        if inner.last_activity.elapsed().as_secs() >= u64::from(inner.timeout_secs) {
            inner.state = SessionState::Locked;
            inner.timed_out = true;
            drop(inner);
            let _ = self
                .events
                .send(SessionEvent::Locked(LockReason::IdleTimeout));
            tracing::info!("session locked after idle timeout");
            return true;
        }
        false
    }

    /// Update the idle timeout.
    pub fn set_timeout_secs(&self, timeout_secs: u32) {
        self.lock_inner().timeout_secs = timeout_secs;
    }

    fn persist_hash(&self, hash: &str) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VaultError::Unavailable(e.to_string()))?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, hash).map_err(|e| VaultError::Unavailable(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| VaultError::Unavailable(e.to_string()))
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned session mutex is unrecoverable state corruption.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn verify_hash(hash: &str, passphrase: &str) -> Result<()> {
    let parsed = PasswordHash::new(hash).map_err(|e| VaultError::Kdf(e.to_string()))?;
    Argon2::default()
        .verify_password(passphrase.as_bytes(), &parsed)
        .map_err(|_| VaultError::WrongPassphrase)
}
