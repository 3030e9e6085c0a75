//! Approval decisions remembered per application and event kind.

use serde::{Deserialize, Serialize};

/// The user's answer to a signing request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

/// How long a remembered decision stays valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalTtl {
    TenMinutes,
    OneHour,
    OneDay,
    ThirtyDays,
    Forever,
}

impl ApprovalTtl {
    /// Lifetime in seconds; `None` means the decision never expires.
    pub fn as_secs(self) -> Option<u64> {
        match self {
            Self::TenMinutes => Some(600),
            Self::OneHour => Some(3600),
            Self::OneDay => Some(86400),
            Self::ThirtyDays => Some(30 * 86400),
            Self::Forever => None,
        }
    }
}

/// A remembered approval decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Identifier of the requesting application.
    pub application_id: String,
    /// The event kind the decision covers.
    pub event_kind: u16,
    pub decision: Decision,
    /// When the decision was recorded (unix seconds).
    pub created_at: u64,
    pub ttl: ApprovalTtl,
}

impl ApprovalDecision {
    /// Whether the decision has expired at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        match self.ttl.as_secs() {
            Some(secs) => now >= self.created_at + secs,
            None => false,
        }
    }
}
