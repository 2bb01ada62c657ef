//! Sync Log State Definitions
//!
//! ```text
//!            ┌──────────────► SETTLE_SUCCEEDED
//!            │
//! PENDING ───┼──────────────► CONFLICT ──► RESOLVED
//!    ▲       │
//!    │       ▼
//!    └──── FAILED ◄─┐ (repeat failure)
//!            │      │
//!            ├──────┘
//!            └──────────────► SETTLE_FAILED
//! ```
//!
//! Terminal states: SETTLE_SUCCEEDED, SETTLE_FAILED, RESOLVED

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum SyncStatus {
    /// Waiting to be reported to the central ledger
    Pending = 0,

    /// Last attempt failed, eligible for retry
    Failed = -10,

    /// Terminal: central ledger acknowledged the transaction
    SettleSucceeded = 10,

    /// Terminal: retries abandoned
    SettleFailed = -20,

    /// Local and central views diverge, needs resolution
    Conflict = 20,

    /// Terminal: conflict resolved
    Resolved = 30,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 6] = [
        SyncStatus::Pending,
        SyncStatus::Failed,
        SyncStatus::SettleSucceeded,
        SyncStatus::SettleFailed,
        SyncStatus::Conflict,
        SyncStatus::Resolved,
    ];

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::SettleSucceeded | SyncStatus::SettleFailed | SyncStatus::Resolved
        )
    }

    /// Edges of the reconciliation graph.
    ///
    /// FAILED → FAILED is a legal edge: every failed attempt is recorded even
    /// when the log was already failed.
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (
                SyncStatus::Pending,
                SyncStatus::Failed | SyncStatus::SettleSucceeded | SyncStatus::Conflict
            ) | (
                SyncStatus::Failed,
                SyncStatus::Failed | SyncStatus::Pending | SyncStatus::SettleFailed
            ) | (SyncStatus::Conflict, SyncStatus::Resolved)
        )
    }

    /// Statuses a log may be created in
    pub fn is_valid_initial(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Failed)
    }

    pub fn terminal_states() -> Vec<SyncStatus> {
        Self::ALL.into_iter().filter(|s| s.is_terminal()).collect()
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(SyncStatus::Pending),
            -10 => Some(SyncStatus::Failed),
            10 => Some(SyncStatus::SettleSucceeded),
            -20 => Some(SyncStatus::SettleFailed),
            20 => Some(SyncStatus::Conflict),
            30 => Some(SyncStatus::Resolved),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Failed => "failed",
            SyncStatus::SettleSucceeded => "settle_succeeded",
            SyncStatus::SettleFailed => "settle_failed",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LedgerError::InvalidArgument(format!("unknown sync status: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert_eq!(
            SyncStatus::terminal_states(),
            vec![
                SyncStatus::SettleSucceeded,
                SyncStatus::SettleFailed,
                SyncStatus::Resolved
            ]
        );
        for state in SyncStatus::terminal_states() {
            for next in SyncStatus::ALL {
                assert!(!state.can_transition_to(next), "{state} -> {next}");
            }
        }
    }

    #[test]
    fn test_resolve_only_from_conflict() {
        for state in SyncStatus::ALL {
            assert_eq!(
                state.can_transition_to(SyncStatus::Resolved),
                state == SyncStatus::Conflict,
                "{state} -> resolved"
            );
        }
    }

    #[test]
    fn test_failed_edges() {
        assert!(SyncStatus::Failed.can_transition_to(SyncStatus::Failed));
        assert!(SyncStatus::Failed.can_transition_to(SyncStatus::Pending));
        assert!(SyncStatus::Failed.can_transition_to(SyncStatus::SettleFailed));
        // a failed log must go back through PENDING before it can settle
        assert!(!SyncStatus::Failed.can_transition_to(SyncStatus::SettleSucceeded));
        assert!(!SyncStatus::Pending.can_transition_to(SyncStatus::Pending));
    }

    #[test]
    fn test_initial_states() {
        assert!(SyncStatus::Pending.is_valid_initial());
        assert!(SyncStatus::Failed.is_valid_initial());
        assert!(!SyncStatus::Conflict.is_valid_initial());
        assert!(!SyncStatus::Resolved.is_valid_initial());
    }

    #[test]
    fn test_parse_and_ids() {
        assert_eq!(
            "settle_succeeded".parse::<SyncStatus>().unwrap(),
            SyncStatus::SettleSucceeded
        );
        for state in SyncStatus::ALL {
            assert_eq!(SyncStatus::from_id(state.id()), Some(state));
        }
    }
}
