//! Payment Transaction State Definitions
//!
//! ```text
//! PENDING → CONFIRMED → SETTLING → SETTLED
//!    ↓          ↓           ↓
//!    └──────────┴───────────┴────→ FAILED
//! ```
//!
//! State IDs are stored in PostgreSQL as SMALLINT.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Payment transaction status
///
/// Terminal states: SETTLED (30), FAILED (-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TransactionStatus {
    /// Recorded and balances moved, not yet acknowledged by the central ledger
    Pending = 0,

    /// Acknowledged by the central ledger
    Confirmed = 10,

    /// Settlement in progress
    Settling = 20,

    /// Terminal: settled
    Settled = 30,

    /// Terminal: failed
    Failed = -10,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 5] = [
        TransactionStatus::Pending,
        TransactionStatus::Confirmed,
        TransactionStatus::Settling,
        TransactionStatus::Settled,
        TransactionStatus::Failed,
    ];

    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Settled | TransactionStatus::Failed)
    }

    /// Forward-only edges of the state graph.
    ///
    /// Each step advances exactly one stage; FAILED is reachable from any
    /// non-terminal state.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Confirmed)
                | (TransactionStatus::Confirmed, TransactionStatus::Settling)
                | (TransactionStatus::Settling, TransactionStatus::Settled)
                | (
                    TransactionStatus::Pending
                        | TransactionStatus::Confirmed
                        | TransactionStatus::Settling,
                    TransactionStatus::Failed
                )
        )
    }

    /// Get the numeric state ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransactionStatus::Pending),
            10 => Some(TransactionStatus::Confirmed),
            20 => Some(TransactionStatus::Settling),
            30 => Some(TransactionStatus::Settled),
            -10 => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Settling => "settling",
            TransactionStatus::Settled => "settled",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LedgerError::InvalidArgument(format!("unknown transaction status: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TransactionStatus::Settled.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());

        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Confirmed.is_terminal());
        assert!(!TransactionStatus::Settling.is_terminal());
    }

    #[test]
    fn test_forward_transitions_only() {
        assert!(TransactionStatus::Pending.can_transition_to(TransactionStatus::Confirmed));
        assert!(TransactionStatus::Settling.can_transition_to(TransactionStatus::Settled));
        assert!(TransactionStatus::Confirmed.can_transition_to(TransactionStatus::Failed));

        // no skipping, no going back, nothing out of a terminal state
        assert!(!TransactionStatus::Pending.can_transition_to(TransactionStatus::Settled));
        assert!(!TransactionStatus::Settling.can_transition_to(TransactionStatus::Confirmed));
        assert!(!TransactionStatus::Settled.can_transition_to(TransactionStatus::Failed));
        assert!(!TransactionStatus::Failed.can_transition_to(TransactionStatus::Pending));
        assert!(!TransactionStatus::Pending.can_transition_to(TransactionStatus::Pending));
    }

    #[test]
    fn test_state_id_roundtrip() {
        for state in TransactionStatus::ALL {
            assert_eq!(TransactionStatus::from_id(state.id()), Some(state));
        }
        assert!(TransactionStatus::from_id(999).is_none());
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "settling".parse::<TransactionStatus>().unwrap(),
            TransactionStatus::Settling
        );
        assert!("SETTLED".parse::<TransactionStatus>().is_err());
    }
}
