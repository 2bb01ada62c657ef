//! Ledger Error Types
//!
//! One taxonomy shared by the transfer engine, peer tracker and sync state
//! machine. Any error raised inside a work unit aborts that unit.

use std::fmt;

use thiserror::Error;

use crate::core_types::WalletId;

/// Why a request conflicted with existing state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// (source wallet, nonce) was already used by another payment transaction
    DuplicateNonce { wallet_id: WalletId, nonce: i64 },
    /// A unique field collided with an existing record
    Duplicate {
        entity: &'static str,
        field: &'static str,
    },
    /// Other ledger records still reference the record
    InUse {
        entity: &'static str,
        referenced_by: &'static str,
    },
    /// The record is not in a state that allows the requested transition
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::DuplicateNonce { wallet_id, nonce } => {
                write!(f, "nonce {} already used by wallet {}", nonce, wallet_id)
            }
            ConflictKind::Duplicate { entity, field } => {
                write!(f, "{} with this {} already exists", entity, field)
            }
            ConflictKind::InUse {
                entity,
                referenced_by,
            } => {
                write!(f, "{} is still referenced by {}", entity, referenced_by)
            }
            ConflictKind::InvalidTransition { entity, from, to } => {
                write!(f, "{} cannot move from {} to {}", entity, from, to)
            }
        }
    }
}

/// Ledger error types
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Caller is not entitled to act on this wallet")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid connection type: {0}")]
    InvalidConnectionType(String),

    #[error("Store failure: {0}")]
    StoreFailure(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        LedgerError::Conflict(ConflictKind::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidTransfer(_) => "INVALID_TRANSFER",
            LedgerError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::Unauthorized => "UNAUTHORIZED",
            LedgerError::Conflict(ConflictKind::DuplicateNonce { .. }) => "DUPLICATE_NONCE",
            LedgerError::Conflict(ConflictKind::Duplicate { .. }) => "DUPLICATE_RECORD",
            LedgerError::Conflict(ConflictKind::InUse { .. }) => "RECORD_IN_USE",
            LedgerError::Conflict(ConflictKind::InvalidTransition { .. }) => {
                "INVALID_STATE_TRANSITION"
            }
            LedgerError::InvalidArgument(_) => "INVALID_ARGUMENT",
            LedgerError::InvalidConnectionType(_) => "INVALID_CONNECTION_TYPE",
            LedgerError::StoreFailure(_) => "STORE_FAILURE",
            LedgerError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidTransfer(_)
            | LedgerError::InvalidArgument(_)
            | LedgerError::InvalidConnectionType(_) => 400,
            LedgerError::Unauthorized => 401,
            LedgerError::NotFound { .. } => 404,
            LedgerError::Conflict(_) => 409,
            LedgerError::InsufficientFunds => 422,
            LedgerError::StoreFailure(_) | LedgerError::Serialization(_) => 500,
        }
    }

    /// True for any `Conflict` variant
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::StoreFailure(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::InsufficientFunds.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(
            LedgerError::invalid_transition("sync_log", "pending", "resolved").code(),
            "INVALID_STATE_TRANSITION"
        );
        let dup = LedgerError::Conflict(ConflictKind::DuplicateNonce {
            wallet_id: WalletId::new(),
            nonce: 7,
        });
        assert_eq!(dup.code(), "DUPLICATE_NONCE");
        assert!(dup.is_conflict());

        let in_use = LedgerError::Conflict(ConflictKind::InUse {
            entity: "wallet",
            referenced_by: "transactions",
        });
        assert_eq!(in_use.code(), "RECORD_IN_USE");
        assert_eq!(in_use.http_status(), 409);
        assert_eq!(
            in_use.to_string(),
            "Conflict: wallet is still referenced by transactions"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(LedgerError::Unauthorized.http_status(), 401);
        assert_eq!(LedgerError::not_found("wallet", "x").http_status(), 404);
        assert_eq!(LedgerError::InsufficientFunds.http_status(), 422);
        assert_eq!(LedgerError::StoreFailure("io".into()).http_status(), 500);
    }

    #[test]
    fn test_display() {
        let err = LedgerError::invalid_transition("sync_log", "pending", "resolved");
        assert_eq!(
            err.to_string(),
            "Conflict: sync_log cannot move from pending to resolved"
        );
        assert_eq!(
            LedgerError::not_found("wallet", "abc").to_string(),
            "wallet not found: abc"
        );
    }
}
