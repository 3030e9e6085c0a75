//! The approval cache: remembered allow/deny decisions per requesting
//! application and event kind.
//!
//! Expiry is lazy: a stale decision is evicted the next time it is
//! looked up. Deny decisions are remembered with the same semantics as
//! Allow.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use sigil_types::approval::{ApprovalDecision, ApprovalTtl, Decision};

use crate::{PolicyError, Result};

/// Answer to an approval lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AskOutcome {
    Allow,
    Deny,
    /// No live decision; the caller must surface an approval request
    /// and then call [`ApprovalPolicy::remember`].
    Unknown,
}

/// Per-kind, per-application remember-decisions cache.
pub struct ApprovalPolicy {
    decisions: Mutex<HashMap<(String, u16), ApprovalDecision>>,
    store_path: Option<PathBuf>,
}

impl ApprovalPolicy {
    /// Create a cache persisted at `<data_dir>/approvals.json`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let store_path = data_dir.into().join("approvals.json");
        let decisions = load(&store_path).unwrap_or_default();
        Self {
            decisions: Mutex::new(decisions),
            store_path: Some(store_path),
        }
    }

    /// Create a purely in-memory cache.
    pub fn in_memory() -> Self {
        Self {
            decisions: Mutex::new(HashMap::new()),
            store_path: None,
        }
    }

    /// Look up the remembered decision for `(application_id, kind)`.
    pub fn ask(&self, application_id: &str, kind: u16) -> AskOutcome {
        self.ask_at(application_id, kind, unix_now())
    }

    /// Clock-injected form of [`ask`](Self::ask).
    pub fn ask_at(&self, application_id: &str, kind: u16, now: u64) -> AskOutcome {
        let mut decisions = self.lock();
        let key = (application_id.to_string(), kind);
        match decisions.get(&key) {
            None => AskOutcome::Unknown,
            Some(decision) if decision.is_expired(now) => {
                decisions.remove(&key);
                tracing::debug!(application_id, kind, "approval decision expired");
                AskOutcome::Unknown
            }
            Some(decision) => match decision.decision {
                Decision::Allow => AskOutcome::Allow,
                Decision::Deny => AskOutcome::Deny,
            },
        }
    }

    /// Record the user's choice.
    pub fn remember(
        &self,
        application_id: &str,
        kind: u16,
        decision: Decision,
        ttl: ApprovalTtl,
    ) -> Result<()> {
        self.remember_at(application_id, kind, decision, ttl, unix_now())
    }

    /// Clock-injected form of [`remember`](Self::remember).
    pub fn remember_at(
        &self,
        application_id: &str,
        kind: u16,
        decision: Decision,
        ttl: ApprovalTtl,
        now: u64,
    ) -> Result<()> {
        let record = ApprovalDecision {
            application_id: application_id.to_string(),
            event_kind: kind,
            decision,
            created_at: now,
            ttl,
        };
        let snapshot: Vec<ApprovalDecision> = {
            let mut decisions = self.lock();
            decisions.insert((application_id.to_string(), kind), record);
            decisions.values().cloned().collect()
        };
        self.persist(&snapshot)?;
        tracing::info!(application_id, kind, ?decision, ?ttl, "approval remembered");
        Ok(())
    }

    /// Drop every remembered decision for an application.
    pub fn forget_application(&self, application_id: &str) -> Result<()> {
        let snapshot: Vec<ApprovalDecision> = {
            let mut decisions = self.lock();
            decisions.retain(|(app, _), _| app != application_id);
            decisions.values().cloned().collect()
        };
        self.persist(&snapshot)
    }

    fn persist(&self, snapshot: &[ApprovalDecision]) -> Result<()> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PolicyError::Storage(e.to_string()))?;
        }
        let data = serde_json::to_string_pretty(snapshot)
            .map_err(|e| PolicyError::Storage(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(|e| PolicyError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| PolicyError::Storage(e.to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, u16), ApprovalDecision>> {
        match self.decisions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn load(path: &Path) -> Option<HashMap<(String, u16), ApprovalDecision>> {
    let data = std::fs::read_to_string(path).ok()?;
    let records: Vec<ApprovalDecision> = serde_json::from_str(&data).ok()?;
    Some(
        records
            .into_iter()
            .map(|d| ((d.application_id.clone(), d.event_kind), d))
            .collect(),
    )
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_750_000_000;

    #[test]
    fn test_unknown_before_remember() {
        let policy = ApprovalPolicy::in_memory();
        assert_eq!(policy.ask_at("app", 1, NOW), AskOutcome::Unknown);
    }

    #[test]
    fn test_allow_and_deny_remembered() {
        let policy = ApprovalPolicy::in_memory();
        policy
            .remember_at("app", 1, Decision::Allow, ApprovalTtl::OneHour, NOW)
            .expect("remember");
        policy
            .remember_at("app", 7, Decision::Deny, ApprovalTtl::OneHour, NOW)
            .expect("remember");

        assert_eq!(policy.ask_at("app", 1, NOW + 10), AskOutcome::Allow);
        assert_eq!(policy.ask_at("app", 7, NOW + 10), AskOutcome::Deny);
        // A different application shares nothing.
        assert_eq!(policy.ask_at("other", 1, NOW + 10), AskOutcome::Unknown);
    }

    #[test]
    fn test_lazy_expiry() {
        let policy = ApprovalPolicy::in_memory();
        policy
            .remember_at("app", 1, Decision::Allow, ApprovalTtl::TenMinutes, NOW)
            .expect("remember");

        assert_eq!(policy.ask_at("app", 1, NOW + 599), AskOutcome::Allow);
        assert_eq!(policy.ask_at("app", 1, NOW + 600), AskOutcome::Unknown);
        // Evicted on that lookup, so still unknown even for earlier times.
        assert_eq!(policy.ask_at("app", 1, NOW), AskOutcome::Unknown);
    }

    #[test]
    fn test_forever_survives_any_clock() {
        let policy = ApprovalPolicy::in_memory();
        policy
            .remember_at("app", 1, Decision::Allow, ApprovalTtl::Forever, NOW)
            .expect("remember");
        assert_eq!(policy.ask_at("app", 1, u64::MAX), AskOutcome::Allow);
    }

    #[test]
    fn test_newer_decision_replaces() {
        let policy = ApprovalPolicy::in_memory();
        policy
            .remember_at("app", 1, Decision::Allow, ApprovalTtl::Forever, NOW)
            .expect("remember");
        policy
            .remember_at("app", 1, Decision::Deny, ApprovalTtl::Forever, NOW + 1)
            .expect("remember");
        assert_eq!(policy.ask_at("app", 1, NOW + 2), AskOutcome::Deny);
    }

    #[test]
    fn test_forget_application() {
        let policy = ApprovalPolicy::in_memory();
        policy
            .remember_at("app", 1, Decision::Allow, ApprovalTtl::Forever, NOW)
            .expect("remember");
        policy
            .remember_at("keep", 1, Decision::Allow, ApprovalTtl::Forever, NOW)
            .expect("remember");
        policy.forget_application("app").expect("forget");
        assert_eq!(policy.ask_at("app", 1, NOW), AskOutcome::Unknown);
        assert_eq!(policy.ask_at("keep", 1, NOW), AskOutcome::Allow);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let policy = ApprovalPolicy::new(dir.path());
            policy
                .remember_at("app", 1, Decision::Allow, ApprovalTtl::ThirtyDays, NOW)
                .expect("remember");
        }
        let policy = ApprovalPolicy::new(dir.path());
        assert_eq!(policy.ask_at("app", 1, NOW + 10), AskOutcome::Allow);
    }
}
