//! Sync Reconciler
//!
//! Drives sync logs through their state graph. Each operation reads the
//! current state, checks the edge, then applies a compare-and-swap on that
//! state, so a concurrent writer makes the loser fail with an
//! invalid-transition `Conflict` instead of overwriting.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::state::SyncStatus;
use crate::audit::{AuditContext, NewAuditEntry, SYNC_LOGS_TABLE};
use crate::core_types::{SyncLogId, TransactionId, WalletId};
use crate::error::LedgerError;
use crate::models::{FieldUpdate, NewSyncLog, SyncLog, SyncStats, SyncTransition};
use crate::store::LedgerStore;

fn sync_log_not_found(id: SyncLogId) -> LedgerError {
    LedgerError::not_found("sync_log", id)
}

#[derive(Clone)]
pub struct SyncReconciler {
    store: Arc<dyn LedgerStore>,
}

impl SyncReconciler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Start tracking reconciliation of `transaction_id` for one participant.
    ///
    /// At most one log exists per (transaction, wallet).
    pub async fn create_sync_log(
        &self,
        transaction_id: TransactionId,
        wallet_id: WalletId,
        initial_status: SyncStatus,
        ctx: &AuditContext,
    ) -> Result<SyncLog, LedgerError> {
        if !initial_status.is_valid_initial() {
            return Err(LedgerError::InvalidArgument(format!(
                "sync log cannot start as {initial_status}"
            )));
        }

        let mut unit = self.store.begin().await?;
        let tx = unit
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("transaction", transaction_id))?;
        if tx.from_wallet_id != wallet_id && tx.to_wallet_id != wallet_id {
            return Err(LedgerError::InvalidArgument(format!(
                "wallet {wallet_id} is not a participant of transaction {transaction_id}"
            )));
        }

        let log = unit
            .insert_sync_log(&NewSyncLog {
                transaction_id,
                wallet_id,
                status: initial_status,
            })
            .await?;
        unit.append_audit(&NewAuditEntry::insert(
            SYNC_LOGS_TABLE,
            log.id.inner(),
            &log,
            ctx,
        )?)
        .await?;
        unit.commit().await?;

        info!(
            sync_log_id = %log.id,
            transaction_id = %transaction_id,
            wallet_id = %wallet_id,
            status = %initial_status,
            "Sync log created"
        );
        Ok(log)
    }

    /// Central ledger acknowledged the transaction. Clears the last error.
    pub async fn mark_settle_successful(
        &self,
        id: SyncLogId,
        ctx: &AuditContext,
    ) -> Result<SyncLog, LedgerError> {
        self.transition(
            id,
            SyncStatus::SettleSucceeded,
            false,
            FieldUpdate::Clear,
            FieldUpdate::Keep,
            ctx,
        )
        .await
    }

    /// Record one failed attempt. The attempt counter grows by exactly one.
    pub async fn mark_settle_failed(
        &self,
        id: SyncLogId,
        error_message: impl Into<String>,
        ctx: &AuditContext,
    ) -> Result<SyncLog, LedgerError> {
        self.transition(
            id,
            SyncStatus::Failed,
            true,
            FieldUpdate::Set(error_message.into()),
            FieldUpdate::Keep,
            ctx,
        )
        .await
    }

    /// Local and central views diverge; keep both for later resolution
    pub async fn mark_settle_conflict(
        &self,
        id: SyncLogId,
        conflict_data: serde_json::Value,
        ctx: &AuditContext,
    ) -> Result<SyncLog, LedgerError> {
        if conflict_data.is_null() {
            return Err(LedgerError::InvalidArgument(
                "conflict data must not be null".to_string(),
            ));
        }
        self.transition(
            id,
            SyncStatus::Conflict,
            false,
            FieldUpdate::Keep,
            FieldUpdate::Set(conflict_data),
            ctx,
        )
        .await
    }

    /// `conflict → resolved`. Any other current state is rejected.
    pub async fn resolve_sync_conflict(
        &self,
        id: SyncLogId,
        ctx: &AuditContext,
    ) -> Result<SyncLog, LedgerError> {
        self.transition(
            id,
            SyncStatus::Resolved,
            false,
            FieldUpdate::Keep,
            FieldUpdate::Keep,
            ctx,
        )
        .await
    }

    /// `failed → pending`, making the log eligible for another attempt
    pub async fn retry_sync(
        &self,
        id: SyncLogId,
        ctx: &AuditContext,
    ) -> Result<SyncLog, LedgerError> {
        self.transition(
            id,
            SyncStatus::Pending,
            false,
            FieldUpdate::Keep,
            FieldUpdate::Keep,
            ctx,
        )
        .await
    }

    /// `failed → settle_failed`: stop retrying
    pub async fn abandon_sync(
        &self,
        id: SyncLogId,
        ctx: &AuditContext,
    ) -> Result<SyncLog, LedgerError> {
        self.transition(
            id,
            SyncStatus::SettleFailed,
            false,
            FieldUpdate::Keep,
            FieldUpdate::Keep,
            ctx,
        )
        .await
    }

    async fn transition(
        &self,
        id: SyncLogId,
        to: SyncStatus,
        increment_attempts: bool,
        error_message: FieldUpdate<String>,
        conflict_data: FieldUpdate<serde_json::Value>,
        ctx: &AuditContext,
    ) -> Result<SyncLog, LedgerError> {
        let mut unit = self.store.begin().await?;
        let before = unit
            .get_sync_log(id)
            .await?
            .ok_or_else(|| sync_log_not_found(id))?;

        if !before.status.can_transition_to(to) {
            warn!(
                sync_log_id = %id,
                from = %before.status,
                to = %to,
                "Rejected sync transition"
            );
            return Err(LedgerError::invalid_transition("sync_log", before.status, to));
        }

        let transition = SyncTransition {
            expected: vec![before.status],
            to,
            increment_attempts,
            error_message,
            conflict_data,
        };
        let Some(after) = unit.transition_sync_log(id, &transition).await? else {
            // changed underneath us between the read and the swap
            return Err(LedgerError::invalid_transition("sync_log", before.status, to));
        };

        unit.append_audit(&NewAuditEntry::update(
            SYNC_LOGS_TABLE,
            id.inner(),
            &before,
            &after,
            ctx,
        )?)
        .await?;
        unit.commit().await?;

        info!(
            sync_log_id = %id,
            from = %before.status,
            to = %after.status,
            attempts = after.attempt_count,
            "Sync log transitioned"
        );
        Ok(after)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_sync_log(&self, id: SyncLogId) -> Result<SyncLog, LedgerError> {
        let mut unit = self.store.begin().await?;
        unit.get_sync_log(id)
            .await?
            .ok_or_else(|| sync_log_not_found(id))
    }

    pub async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<SyncLog>, LedgerError> {
        let mut unit = self.store.begin().await?;
        unit.list_sync_logs_for_transaction(transaction_id).await
    }

    /// Failed logs with fewer than `max_attempts` attempts, oldest first
    pub async fn syncs_needing_retry(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<SyncLog>, LedgerError> {
        if limit < 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "limit must not be negative, got {limit}"
            )));
        }
        let mut unit = self.store.begin().await?;
        unit.sync_logs_needing_retry(max_attempts, limit).await
    }

    pub async fn sync_stats(&self, wallet_id: WalletId) -> Result<SyncStats, LedgerError> {
        let mut unit = self.store.begin().await?;
        unit.sync_stats(wallet_id).await
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Purge terminal logs not updated in the last `older_than_days` days.
    /// A window reaching past the earliest representable time purges nothing.
    pub async fn delete_old_sync_logs(&self, older_than_days: i64) -> Result<u64, LedgerError> {
        if older_than_days < 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "retention window must not be negative, got {older_than_days}"
            )));
        }
        let cutoff = Duration::try_days(older_than_days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.purge_terminal_before(cutoff).await
    }

    /// Purge terminal logs last updated before `cutoff`.
    /// Pending, failed and conflicting logs are never removed.
    pub async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, LedgerError> {
        let mut unit = self.store.begin().await?;
        let deleted = unit.delete_terminal_sync_logs_before(cutoff).await?;
        unit.commit().await?;

        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "Purged terminal sync logs");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;

    #[tokio::test]
    async fn test_unknown_log_is_not_found() {
        let reconciler = SyncReconciler::new(Arc::new(MemoryLedgerStore::new()));
        let ctx = AuditContext::system();
        let id = SyncLogId::new();

        assert!(matches!(
            reconciler.mark_settle_successful(id, &ctx).await,
            Err(LedgerError::NotFound { entity: "sync_log", .. })
        ));
        assert!(matches!(
            reconciler.resolve_sync_conflict(id, &ctx).await,
            Err(LedgerError::NotFound { .. })
        ));
        assert!(matches!(
            reconciler.get_sync_log(id).await,
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_argument_checks() {
        let reconciler = SyncReconciler::new(Arc::new(MemoryLedgerStore::new()));
        let ctx = AuditContext::system();

        assert!(matches!(
            reconciler
                .create_sync_log(
                    TransactionId::new(),
                    WalletId::new(),
                    SyncStatus::Resolved,
                    &ctx
                )
                .await,
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            reconciler
                .create_sync_log(TransactionId::new(), WalletId::new(), SyncStatus::Pending, &ctx)
                .await,
            Err(LedgerError::NotFound { entity: "transaction", .. })
        ));
        assert!(matches!(
            reconciler
                .mark_settle_conflict(SyncLogId::new(), serde_json::Value::Null, &ctx)
                .await,
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            reconciler.delete_old_sync_logs(-1).await,
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            reconciler.syncs_needing_retry(5, -1).await,
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_huge_retention_window_purges_nothing() {
        let reconciler = SyncReconciler::new(Arc::new(MemoryLedgerStore::new()));
        assert_eq!(reconciler.delete_old_sync_logs(100_000_000).await.unwrap(), 0);
        assert_eq!(reconciler.delete_old_sync_logs(i64::MAX).await.unwrap(), 0);
    }
}
