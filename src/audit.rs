//! Audit trail entries
//!
//! The core appends one entry per mutated record inside the same work unit
//! as the mutation. Storage and querying belong to the audit collaborator.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core_types::UserId;
use crate::error::LedgerError;

pub const WALLETS_TABLE: &str = "wallets";
pub const TRANSACTIONS_TABLE: &str = "transactions";
pub const PEERS_TABLE: &str = "peers";
pub const SYNC_LOGS_TABLE: &str = "sync_logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Insert => "INSERT",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(AuditAction::Insert),
            "UPDATE" => Some(AuditAction::Update),
            "DELETE" => Some(AuditAction::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who triggered a mutation, as seen by the request collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    pub changed_by: Option<UserId>,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    /// Mutations started by background sweeps
    pub fn system() -> Self {
        Self::default()
    }

    pub fn user(user_id: UserId) -> Self {
        Self {
            changed_by: Some(user_id),
            ..Self::default()
        }
    }
}

/// Entry to append
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub table_name: &'static str,
    pub record_id: Uuid,
    pub action: AuditAction,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub changed_by: Option<UserId>,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl NewAuditEntry {
    pub fn insert<T: Serialize>(
        table_name: &'static str,
        record_id: Uuid,
        new: &T,
        ctx: &AuditContext,
    ) -> Result<Self, LedgerError> {
        Ok(Self::build(
            table_name,
            record_id,
            AuditAction::Insert,
            None,
            Some(serde_json::to_value(new)?),
            ctx,
        ))
    }

    pub fn update<T: Serialize>(
        table_name: &'static str,
        record_id: Uuid,
        old: &T,
        new: &T,
        ctx: &AuditContext,
    ) -> Result<Self, LedgerError> {
        Ok(Self::build(
            table_name,
            record_id,
            AuditAction::Update,
            Some(serde_json::to_value(old)?),
            Some(serde_json::to_value(new)?),
            ctx,
        ))
    }

    pub fn delete<T: Serialize>(
        table_name: &'static str,
        record_id: Uuid,
        old: &T,
        ctx: &AuditContext,
    ) -> Result<Self, LedgerError> {
        Ok(Self::build(
            table_name,
            record_id,
            AuditAction::Delete,
            Some(serde_json::to_value(old)?),
            None,
            ctx,
        ))
    }

    fn build(
        table_name: &'static str,
        record_id: Uuid,
        action: AuditAction,
        old_data: Option<serde_json::Value>,
        new_data: Option<serde_json::Value>,
        ctx: &AuditContext,
    ) -> Self {
        Self {
            table_name,
            record_id,
            action,
            old_data,
            new_data,
            changed_by: ctx.changed_by,
            ip_address: ctx.ip_address,
            user_agent: ctx.user_agent.clone(),
        }
    }
}

/// Stored, write-once audit entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub table_name: String,
    pub record_id: Uuid,
    pub action: AuditAction,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub changed_by: Option<UserId>,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_entry_carries_context() {
        let user = Uuid::new_v4();
        let ctx = AuditContext {
            changed_by: Some(user),
            ip_address: Some("203.0.113.10".parse().unwrap()),
            user_agent: Some("test-agent".to_string()),
        };
        let entry = NewAuditEntry::update(
            WALLETS_TABLE,
            Uuid::new_v4(),
            &serde_json::json!({"balance": "10.00"}),
            &serde_json::json!({"balance": "20.00"}),
            &ctx,
        )
        .unwrap();

        assert_eq!(entry.action, AuditAction::Update);
        assert_eq!(entry.changed_by, Some(user));
        assert_eq!(entry.old_data.unwrap()["balance"], "10.00");
        assert_eq!(entry.user_agent.as_deref(), Some("test-agent"));
    }

    #[test]
    fn test_action_names() {
        assert_eq!(AuditAction::Delete.as_str(), "DELETE");
        assert_eq!(AuditAction::from_str_opt("INSERT"), Some(AuditAction::Insert));
        assert_eq!(AuditAction::from_str_opt("UPSERT"), None);
    }
}
