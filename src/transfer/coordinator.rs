//! Transfer Orchestrator
//!
//! Entry point for collaborators. Every public operation opens one work unit,
//! runs all of its steps inside it and commits at the end. Returning early
//! with `?` drops the unit, which rolls back everything done so far.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::auth;
use super::engine::BalanceTransferEngine;
use super::state::TransactionStatus;
use super::types::{CreateWalletParams, TransferParams, TransferResult};
use crate::audit::{AuditContext, AuditEntry, NewAuditEntry, TRANSACTIONS_TABLE, WALLETS_TABLE};
use crate::core_types::{TransactionId, UserId, WalletId};
use crate::error::LedgerError;
use crate::models::{ConnectionType, NewTransaction, NewWallet, PaymentTransaction, Wallet};
use crate::peer::tracker;
use crate::store::{LedgerStore, WorkUnit, live_wallet};

/// Wallet as it was before `delta` was added to its balance
fn balance_before(wallet: &Wallet, delta: Decimal) -> Wallet {
    Wallet {
        balance: wallet.balance - delta,
        ..wallet.clone()
    }
}

fn transaction_not_found(id: TransactionId) -> LedgerError {
    LedgerError::not_found("transaction", id)
}

/// Composes the balance engine and the peer tracker into atomic operations
#[derive(Clone)]
pub struct TransferOrchestrator {
    store: Arc<dyn LedgerStore>,
}

impl TransferOrchestrator {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Move `params.amount` from the source to the destination wallet.
    ///
    /// Creates the payment transaction, moves both balances in lock order,
    /// records the peer interaction both ways and bumps both peer counters.
    /// Either all of it commits or none of it does.
    pub async fn execute_transfer(
        &self,
        params: TransferParams,
        ctx: &AuditContext,
    ) -> Result<TransferResult, LedgerError> {
        let connection_type = params.effective_connection_type();
        let new_tx = params.normalize()?;

        let mut unit = self.store.begin().await?;
        let result = Self::transfer_in(unit.as_mut(), &new_tx, connection_type, ctx).await;
        self.finish_transfer(unit, result, &new_tx).await
    }

    /// [`execute_transfer`](Self::execute_transfer) for a caller that must own
    /// the source wallet and present its PIN
    pub async fn execute_authorized_transfer(
        &self,
        caller: UserId,
        pin: &str,
        params: TransferParams,
        ctx: &AuditContext,
    ) -> Result<TransferResult, LedgerError> {
        let connection_type = params.effective_connection_type();
        let new_tx = params.normalize()?;

        let mut unit = self.store.begin().await?;
        let source = live_wallet(unit.as_mut(), new_tx.from_wallet_id).await?;
        auth::authorize(&source, caller, pin)?;

        let result = Self::transfer_in(unit.as_mut(), &new_tx, connection_type, ctx).await;
        self.finish_transfer(unit, result, &new_tx).await
    }

    async fn finish_transfer(
        &self,
        mut unit: Box<dyn WorkUnit>,
        result: Result<TransferResult, LedgerError>,
        new_tx: &NewTransaction,
    ) -> Result<TransferResult, LedgerError> {
        match result {
            Ok(result) => {
                unit.commit().await?;
                info!(
                    transaction_id = %result.transaction.id,
                    from = %new_tx.from_wallet_id,
                    to = %new_tx.to_wallet_id,
                    amount = %new_tx.amount,
                    nonce = new_tx.nonce,
                    "Transfer committed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(
                    from = %new_tx.from_wallet_id,
                    to = %new_tx.to_wallet_id,
                    amount = %new_tx.amount,
                    error = %e,
                    "Transfer rejected"
                );
                Err(e)
            }
        }
    }

    async fn transfer_in(
        unit: &mut dyn WorkUnit,
        new_tx: &NewTransaction,
        connection_type: ConnectionType,
        ctx: &AuditContext,
    ) -> Result<TransferResult, LedgerError> {
        let transaction = unit.insert_transaction(new_tx).await?;
        unit.append_audit(&NewAuditEntry::insert(
            TRANSACTIONS_TABLE,
            transaction.id.inner(),
            &transaction,
            ctx,
        )?)
        .await?;

        let (source, dest) = BalanceTransferEngine::transfer(
            unit,
            new_tx.from_wallet_id,
            new_tx.to_wallet_id,
            new_tx.amount,
        )
        .await?;
        unit.append_audit(&NewAuditEntry::update(
            WALLETS_TABLE,
            source.id.inner(),
            &balance_before(&source, -new_tx.amount),
            &source,
            ctx,
        )?)
        .await?;
        unit.append_audit(&NewAuditEntry::update(
            WALLETS_TABLE,
            dest.id.inner(),
            &balance_before(&dest, new_tx.amount),
            &dest,
            ctx,
        )?)
        .await?;

        tracker::record_interaction_in(unit, &source, &dest, connection_type, ctx).await?;
        tracker::increment_pair_in(unit, source.id, dest.id, ctx).await?;

        Ok(TransferResult {
            transaction,
            source_wallet: source,
            dest_wallet: dest,
        })
    }

    /// Store a payment transaction without moving balances.
    ///
    /// Used for offline-originated payments that are reported after the fact.
    /// Same validation and nonce rule as a transfer.
    pub async fn record_transaction(
        &self,
        params: TransferParams,
        ctx: &AuditContext,
    ) -> Result<PaymentTransaction, LedgerError> {
        let new_tx = params.normalize()?;

        let mut unit = self.store.begin().await?;
        live_wallet(unit.as_mut(), new_tx.from_wallet_id).await?;
        live_wallet(unit.as_mut(), new_tx.to_wallet_id).await?;

        let transaction = unit.insert_transaction(&new_tx).await?;
        unit.append_audit(&NewAuditEntry::insert(
            TRANSACTIONS_TABLE,
            transaction.id.inner(),
            &transaction,
            ctx,
        )?)
        .await?;
        unit.commit().await?;

        info!(
            transaction_id = %transaction.id,
            status = %transaction.status,
            "Transaction recorded"
        );
        Ok(transaction)
    }

    /// Move a transaction one step along its status graph.
    ///
    /// Skipping a stage, going backwards or leaving a terminal state is a
    /// `Conflict`, as is losing a race against a concurrent change.
    pub async fn advance_transaction_status(
        &self,
        id: TransactionId,
        to: TransactionStatus,
        ctx: &AuditContext,
    ) -> Result<PaymentTransaction, LedgerError> {
        let mut unit = self.store.begin().await?;
        let current = unit
            .get_transaction(id)
            .await?
            .ok_or_else(|| transaction_not_found(id))?;

        if !current.status.can_transition_to(to) {
            warn!(
                transaction_id = %id,
                from = %current.status,
                to = %to,
                "Rejected status change"
            );
            return Err(LedgerError::invalid_transition(
                "transaction",
                current.status,
                to,
            ));
        }

        let updated = unit
            .update_transaction_status_if(id, &[current.status], to)
            .await?
            .ok_or_else(|| LedgerError::invalid_transition("transaction", current.status, to))?;
        unit.append_audit(&NewAuditEntry::update(
            TRANSACTIONS_TABLE,
            id.inner(),
            &current,
            &updated,
            ctx,
        )?)
        .await?;
        unit.commit().await?;

        info!(
            transaction_id = %id,
            from = %current.status,
            to = %to,
            "Transaction status advanced"
        );
        Ok(updated)
    }

    pub async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<PaymentTransaction, LedgerError> {
        let mut unit = self.store.begin().await?;
        unit.get_transaction(id)
            .await?
            .ok_or_else(|| transaction_not_found(id))
    }

    // ========================================================================
    // Wallet administration
    // ========================================================================

    pub async fn create_wallet(
        &self,
        params: CreateWalletParams,
        ctx: &AuditContext,
    ) -> Result<Wallet, LedgerError> {
        params.validate()?;
        let pin_hash = auth::hash_pin(&params.pin)?;

        let mut unit = self.store.begin().await?;
        let wallet = unit
            .insert_wallet(&NewWallet {
                owner_id: params.owner_id,
                name: params.name,
                phone_number: params.phone_number,
                public_key: params.public_key,
                device_id: params.device_id,
                pin_hash,
                balance: params.initial_balance,
            })
            .await?;
        unit.append_audit(&NewAuditEntry::insert(
            WALLETS_TABLE,
            wallet.id.inner(),
            &wallet,
            ctx,
        )?)
        .await?;
        unit.commit().await?;

        info!(wallet_id = %wallet.id, balance = %wallet.balance, "Wallet created");
        Ok(wallet)
    }

    /// Wallet by id, soft-deleted ones included
    pub async fn get_wallet(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        let mut unit = self.store.begin().await?;
        unit.get_wallet(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("wallet", id))
    }

    pub async fn set_wallet_active(
        &self,
        id: WalletId,
        active: bool,
        ctx: &AuditContext,
    ) -> Result<Wallet, LedgerError> {
        let mut unit = self.store.begin().await?;
        let before = live_wallet(unit.as_mut(), id).await?;
        let wallet = unit.set_wallet_active(id, active).await?;
        unit.append_audit(&NewAuditEntry::update(
            WALLETS_TABLE,
            id.inner(),
            &before,
            &wallet,
            ctx,
        )?)
        .await?;
        unit.commit().await?;

        info!(wallet_id = %id, active, "Wallet activation changed");
        Ok(wallet)
    }

    pub async fn soft_delete_wallet(
        &self,
        id: WalletId,
        ctx: &AuditContext,
    ) -> Result<Wallet, LedgerError> {
        let mut unit = self.store.begin().await?;
        let before = live_wallet(unit.as_mut(), id).await?;
        let wallet = unit.soft_delete_wallet(id).await?;
        unit.append_audit(&NewAuditEntry::update(
            WALLETS_TABLE,
            id.inner(),
            &before,
            &wallet,
            ctx,
        )?)
        .await?;
        unit.commit().await?;

        info!(wallet_id = %id, "Wallet soft-deleted");
        Ok(wallet)
    }

    /// Physically remove a wallet and its peer records.
    /// Refused with `Conflict(InUse)` once the wallet has payment history.
    pub async fn hard_delete_wallet(
        &self,
        id: WalletId,
        ctx: &AuditContext,
    ) -> Result<(), LedgerError> {
        let mut unit = self.store.begin().await?;
        let before = unit
            .get_wallet(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("wallet", id))?;
        if !unit.hard_delete_wallet(id).await? {
            return Err(LedgerError::not_found("wallet", id));
        }
        unit.append_audit(&NewAuditEntry::delete(
            WALLETS_TABLE,
            id.inner(),
            &before,
            ctx,
        )?)
        .await?;
        unit.commit().await?;

        warn!(wallet_id = %id, "Wallet hard-deleted");
        Ok(())
    }

    /// Stamp the wallet's last successful sync with the central ledger
    pub async fn mark_wallet_synced(
        &self,
        id: WalletId,
        ctx: &AuditContext,
    ) -> Result<Wallet, LedgerError> {
        let mut unit = self.store.begin().await?;
        let before = live_wallet(unit.as_mut(), id).await?;
        let wallet = unit.mark_wallet_synced(id, Utc::now()).await?;
        unit.append_audit(&NewAuditEntry::update(
            WALLETS_TABLE,
            id.inner(),
            &before,
            &wallet,
            ctx,
        )?)
        .await?;
        unit.commit().await?;
        Ok(wallet)
    }

    /// Audit entries for one record, oldest first
    pub async fn audit_trail(
        &self,
        table_name: &str,
        record_id: uuid::Uuid,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        let mut unit = self.store.begin().await?;
        unit.audit_history(table_name, record_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_before() {
        let now = Utc::now();
        let wallet = Wallet {
            id: WalletId::new(),
            owner_id: None,
            name: "w".to_string(),
            phone_number: "1".to_string(),
            public_key: "pk".to_string(),
            device_id: None,
            pin_hash: String::new(),
            balance: dec!(74.50),
            is_active: true,
            deleted_at: None,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(balance_before(&wallet, dec!(-25.50)).balance, dec!(100.00));
        assert_eq!(balance_before(&wallet, dec!(25.50)).balance, dec!(49.00));
    }

    #[tokio::test]
    async fn test_get_missing_records() {
        let orchestrator = TransferOrchestrator::new(Arc::new(MemoryLedgerStore::new()));
        assert!(matches!(
            orchestrator.get_wallet(WalletId::new()).await,
            Err(LedgerError::NotFound { entity: "wallet", .. })
        ));
        assert!(matches!(
            orchestrator.get_transaction(TransactionId::new()).await,
            Err(LedgerError::NotFound { entity: "transaction", .. })
        ));
    }
}
