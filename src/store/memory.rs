//! In-memory ledger store
//!
//! One mutex guards the whole ledger. A work unit holds the lock for its
//! entire life and mutates a private copy of the state; `commit` swaps the
//! copy in, dropping the unit throws it away. Units are therefore fully
//! serialized, which satisfies every ordering the PostgreSQL store provides.
//!
//! A task must not open a second unit while it still holds the first one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, WorkUnit, wallet_in_use};
use crate::audit::{AuditEntry, NewAuditEntry};
use crate::core_types::{PeerId, SyncLogId, TransactionId, WalletId};
use crate::error::{ConflictKind, LedgerError};
use crate::models::{
    NewSyncLog, NewTransaction, NewWallet, PaymentTransaction, Peer, PeerUpsert, SyncLog,
    SyncStats, SyncTransition, Wallet, fits_money_column,
};
use crate::sync::state::SyncStatus;
use crate::transfer::state::TransactionStatus;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    wallets: HashMap<WalletId, Wallet>,
    transactions: HashMap<TransactionId, PaymentTransaction>,
    peers: HashMap<(WalletId, WalletId), Peer>,
    sync_logs: HashMap<SyncLogId, SyncLog>,
    audit: Vec<AuditEntry>,
    next_audit_id: i64,
}

/// Store for tests and single-process deployments
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn WorkUnit>, LedgerError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryWorkUnit {
            guard: Some(guard),
            working,
        }))
    }
}

pub struct MemoryWorkUnit {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
}

/// NUMERIC(20, 2) semantics: two decimal places, 18 integer digits
fn money(amount: Decimal) -> Result<Decimal, LedgerError> {
    let mut amount = amount;
    amount.rescale(2);
    if !fits_money_column(amount) {
        return Err(numeric_overflow());
    }
    Ok(amount)
}

fn numeric_overflow() -> LedgerError {
    LedgerError::StoreFailure("numeric field overflow".to_string())
}

fn finished() -> LedgerError {
    LedgerError::StoreFailure("work unit already finished".to_string())
}

impl MemoryWorkUnit {
    fn state(&mut self) -> Result<&mut MemoryState, LedgerError> {
        if self.guard.is_none() {
            return Err(finished());
        }
        Ok(&mut self.working)
    }

    fn live_wallet(&mut self, id: WalletId) -> Result<&mut Wallet, LedgerError> {
        self.state()?
            .wallets
            .get_mut(&id)
            .filter(|w| !w.is_deleted())
            .ok_or_else(|| LedgerError::not_found("wallet", id))
    }

    fn live_peer(
        &mut self,
        wallet_id: WalletId,
        peer_wallet_id: WalletId,
    ) -> Result<&mut Peer, LedgerError> {
        self.state()?
            .peers
            .get_mut(&(wallet_id, peer_wallet_id))
            .filter(|p| p.deleted_at.is_none())
            .ok_or_else(|| LedgerError::not_found("peer", format!("{wallet_id}/{peer_wallet_id}")))
    }
}

#[async_trait]
impl WorkUnit for MemoryWorkUnit {
    async fn commit(&mut self) -> Result<(), LedgerError> {
        let mut guard = self.guard.take().ok_or_else(finished)?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), LedgerError> {
        self.guard.take().ok_or_else(finished)?;
        self.working = MemoryState::default();
        Ok(())
    }

    async fn insert_wallet(&mut self, wallet: &NewWallet) -> Result<Wallet, LedgerError> {
        let state = self.state()?;
        for existing in state.wallets.values() {
            if existing.phone_number == wallet.phone_number {
                return Err(LedgerError::Conflict(ConflictKind::Duplicate {
                    entity: "wallet",
                    field: "phone_number",
                }));
            }
            if existing.public_key == wallet.public_key {
                return Err(LedgerError::Conflict(ConflictKind::Duplicate {
                    entity: "wallet",
                    field: "public_key",
                }));
            }
        }
        if wallet.balance < Decimal::ZERO {
            return Err(LedgerError::StoreFailure(
                "check constraint wallets_balance_non_negative violated".to_string(),
            ));
        }

        let balance = money(wallet.balance)?;

        let now = Utc::now();
        let record = Wallet {
            id: WalletId::new(),
            owner_id: wallet.owner_id,
            name: wallet.name.clone(),
            phone_number: wallet.phone_number.clone(),
            public_key: wallet.public_key.clone(),
            device_id: wallet.device_id.clone(),
            pin_hash: wallet.pin_hash.clone(),
            balance,
            is_active: true,
            deleted_at: None,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };
        state.wallets.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_wallet(&mut self, id: WalletId) -> Result<Option<Wallet>, LedgerError> {
        Ok(self.state()?.wallets.get(&id).cloned())
    }

    async fn debit_wallet(
        &mut self,
        id: WalletId,
        amount: Decimal,
    ) -> Result<Wallet, LedgerError> {
        let wallet = self.live_wallet(id)?;
        if !wallet.is_active {
            return Err(LedgerError::InvalidTransfer(format!("wallet {id} is inactive")));
        }
        if wallet.balance < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        wallet.balance = money(
            wallet
                .balance
                .checked_sub(amount)
                .ok_or_else(numeric_overflow)?,
        )?;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn credit_wallet(
        &mut self,
        id: WalletId,
        amount: Decimal,
    ) -> Result<Wallet, LedgerError> {
        let wallet = self.live_wallet(id)?;
        if !wallet.is_active {
            return Err(LedgerError::InvalidTransfer(format!("wallet {id} is inactive")));
        }
        wallet.balance = money(
            wallet
                .balance
                .checked_add(amount)
                .ok_or_else(numeric_overflow)?,
        )?;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn set_wallet_active(
        &mut self,
        id: WalletId,
        active: bool,
    ) -> Result<Wallet, LedgerError> {
        let wallet = self.live_wallet(id)?;
        wallet.is_active = active;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn soft_delete_wallet(&mut self, id: WalletId) -> Result<Wallet, LedgerError> {
        let wallet = self.live_wallet(id)?;
        let now = Utc::now();
        wallet.deleted_at = Some(now);
        wallet.updated_at = now;
        Ok(wallet.clone())
    }

    async fn hard_delete_wallet(&mut self, id: WalletId) -> Result<bool, LedgerError> {
        let state = self.state()?;
        if !state.wallets.contains_key(&id) {
            return Ok(false);
        }
        if state
            .transactions
            .values()
            .any(|tx| tx.from_wallet_id == id || tx.to_wallet_id == id)
        {
            return Err(wallet_in_use("transactions"));
        }
        if state.sync_logs.values().any(|log| log.wallet_id == id) {
            return Err(wallet_in_use("sync_logs"));
        }
        state.wallets.remove(&id);
        state
            .peers
            .retain(|(owner, counterparty), _| *owner != id && *counterparty != id);
        Ok(true)
    }

    async fn mark_wallet_synced(
        &mut self,
        id: WalletId,
        at: DateTime<Utc>,
    ) -> Result<Wallet, LedgerError> {
        let wallet = self.live_wallet(id)?;
        wallet.last_sync_at = Some(at);
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn insert_transaction(
        &mut self,
        tx: &NewTransaction,
    ) -> Result<PaymentTransaction, LedgerError> {
        let state = self.state()?;
        if tx.from_wallet_id == tx.to_wallet_id {
            return Err(LedgerError::StoreFailure(
                "check constraint transactions_distinct_wallets violated".to_string(),
            ));
        }
        if !state.wallets.contains_key(&tx.from_wallet_id)
            || !state.wallets.contains_key(&tx.to_wallet_id)
        {
            return Err(LedgerError::StoreFailure(
                "foreign key violation on transactions wallet".to_string(),
            ));
        }
        let reused = state
            .transactions
            .values()
            .any(|t| t.from_wallet_id == tx.from_wallet_id && t.nonce == tx.nonce);
        if reused {
            return Err(LedgerError::Conflict(ConflictKind::DuplicateNonce {
                wallet_id: tx.from_wallet_id,
                nonce: tx.nonce,
            }));
        }

        let amount = money(tx.amount)?;

        let now = Utc::now();
        let record = PaymentTransaction {
            id: TransactionId::new(),
            from_wallet_id: tx.from_wallet_id,
            to_wallet_id: tx.to_wallet_id,
            amount,
            currency: tx.currency.clone(),
            tx_type: tx.tx_type,
            status: tx.status,
            signature: tx.signature.clone(),
            nonce: tx.nonce,
            connection_type: tx.connection_type,
            metadata: tx.metadata.clone(),
            description: tx.description.clone(),
            transaction_at: tx.transaction_at,
            created_at: now,
            updated_at: now,
        };
        state.transactions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<PaymentTransaction>, LedgerError> {
        Ok(self.state()?.transactions.get(&id).cloned())
    }

    async fn nonce_exists(
        &mut self,
        wallet_id: WalletId,
        nonce: i64,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .state()?
            .transactions
            .values()
            .any(|t| t.from_wallet_id == wallet_id && t.nonce == nonce))
    }

    async fn update_transaction_status_if(
        &mut self,
        id: TransactionId,
        expected: &[TransactionStatus],
        to: TransactionStatus,
    ) -> Result<Option<PaymentTransaction>, LedgerError> {
        let Some(tx) = self.state()?.transactions.get_mut(&id) else {
            return Ok(None);
        };
        if !expected.contains(&tx.status) {
            return Ok(None);
        }
        tx.status = to;
        tx.updated_at = Utc::now();
        Ok(Some(tx.clone()))
    }

    async fn upsert_peer(&mut self, peer: &PeerUpsert) -> Result<Peer, LedgerError> {
        let state = self.state()?;
        if !state.wallets.contains_key(&peer.wallet_id)
            || !state.wallets.contains_key(&peer.peer_wallet_id)
        {
            return Err(LedgerError::StoreFailure(
                "foreign key violation on peers wallet".to_string(),
            ));
        }

        let now = Utc::now();
        let record = state
            .peers
            .entry((peer.wallet_id, peer.peer_wallet_id))
            .and_modify(|existing| {
                existing.name = peer.name.clone();
                existing.public_key = peer.public_key.clone();
                existing.ip_address = peer.ip_address.or(existing.ip_address);
                if let Some(bt) = &peer.bt_address {
                    existing.bt_address = Some(bt.clone());
                }
                existing.connection_type = peer.connection_type;
                existing.last_seen_at = Some(now);
                existing.deleted_at = None;
                existing.updated_at = now;
            })
            .or_insert_with(|| Peer {
                id: PeerId::new(),
                wallet_id: peer.wallet_id,
                peer_wallet_id: peer.peer_wallet_id,
                name: peer.name.clone(),
                public_key: peer.public_key.clone(),
                ip_address: peer.ip_address,
                bt_address: peer.bt_address.clone(),
                connection_type: peer.connection_type,
                is_trusted: false,
                transaction_count: 0,
                last_seen_at: Some(now),
                deleted_at: None,
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }

    async fn get_peer(
        &mut self,
        wallet_id: WalletId,
        peer_wallet_id: WalletId,
    ) -> Result<Option<Peer>, LedgerError> {
        Ok(self
            .state()?
            .peers
            .get(&(wallet_id, peer_wallet_id))
            .cloned())
    }

    async fn list_peers(&mut self, wallet_id: WalletId) -> Result<Vec<Peer>, LedgerError> {
        let mut peers: Vec<Peer> = self
            .state()?
            .peers
            .values()
            .filter(|p| p.wallet_id == wallet_id && p.deleted_at.is_none())
            .cloned()
            .collect();
        peers.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(peers)
    }

    async fn increment_peer_transaction_count(
        &mut self,
        wallet_id: WalletId,
        peer_wallet_id: WalletId,
    ) -> Result<Peer, LedgerError> {
        let peer = self.live_peer(wallet_id, peer_wallet_id)?;
        let now = Utc::now();
        peer.transaction_count += 1;
        peer.last_seen_at = Some(now);
        peer.updated_at = now;
        Ok(peer.clone())
    }

    async fn set_peer_trusted(
        &mut self,
        wallet_id: WalletId,
        peer_wallet_id: WalletId,
        trusted: bool,
    ) -> Result<Peer, LedgerError> {
        let peer = self.live_peer(wallet_id, peer_wallet_id)?;
        peer.is_trusted = trusted;
        peer.updated_at = Utc::now();
        Ok(peer.clone())
    }

    async fn trust_peers_with_count_at_least(
        &mut self,
        threshold: i64,
    ) -> Result<Vec<Peer>, LedgerError> {
        let now = Utc::now();
        let mut changed: Vec<Peer> = self
            .state()?
            .peers
            .values_mut()
            .filter(|p| {
                p.deleted_at.is_none() && !p.is_trusted && p.transaction_count >= threshold
            })
            .map(|p| {
                p.is_trusted = true;
                p.updated_at = now;
                p.clone()
            })
            .collect();
        changed.sort_by_key(|p| (p.wallet_id, p.peer_wallet_id));
        Ok(changed)
    }

    async fn insert_sync_log(&mut self, log: &NewSyncLog) -> Result<SyncLog, LedgerError> {
        let state = self.state()?;
        if !state.transactions.contains_key(&log.transaction_id)
            || !state.wallets.contains_key(&log.wallet_id)
        {
            return Err(LedgerError::StoreFailure(
                "foreign key violation on sync_logs".to_string(),
            ));
        }
        let duplicate = state
            .sync_logs
            .values()
            .any(|l| l.transaction_id == log.transaction_id && l.wallet_id == log.wallet_id);
        if duplicate {
            return Err(LedgerError::Conflict(ConflictKind::Duplicate {
                entity: "sync_log",
                field: "transaction_id, wallet_id",
            }));
        }

        let now = Utc::now();
        let record = SyncLog {
            id: SyncLogId::new(),
            transaction_id: log.transaction_id,
            wallet_id: log.wallet_id,
            status: log.status,
            attempt_count: 0,
            error_message: None,
            conflict_data: None,
            created_at: now,
            updated_at: now,
        };
        state.sync_logs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_sync_log(&mut self, id: SyncLogId) -> Result<Option<SyncLog>, LedgerError> {
        Ok(self.state()?.sync_logs.get(&id).cloned())
    }

    async fn list_sync_logs_for_transaction(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<Vec<SyncLog>, LedgerError> {
        let mut logs: Vec<SyncLog> = self
            .state()?
            .sync_logs
            .values()
            .filter(|l| l.transaction_id == transaction_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.created_at);
        Ok(logs)
    }

    async fn transition_sync_log(
        &mut self,
        id: SyncLogId,
        transition: &SyncTransition,
    ) -> Result<Option<SyncLog>, LedgerError> {
        let Some(log) = self.state()?.sync_logs.get_mut(&id) else {
            return Ok(None);
        };
        if !transition.expected.contains(&log.status) {
            return Ok(None);
        }
        log.status = transition.to;
        if transition.increment_attempts {
            log.attempt_count += 1;
        }
        log.error_message = transition.error_message.apply(log.error_message.take());
        log.conflict_data = transition.conflict_data.apply(log.conflict_data.take());
        log.updated_at = Utc::now();
        Ok(Some(log.clone()))
    }

    async fn sync_logs_needing_retry(
        &mut self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<SyncLog>, LedgerError> {
        let mut logs: Vec<SyncLog> = self
            .state()?
            .sync_logs
            .values()
            .filter(|l| l.status == SyncStatus::Failed && l.attempt_count < max_attempts)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.created_at);
        logs.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(logs)
    }

    async fn sync_stats(&mut self, wallet_id: WalletId) -> Result<SyncStats, LedgerError> {
        let mut stats = SyncStats::default();
        for log in self
            .state()?
            .sync_logs
            .values()
            .filter(|l| l.wallet_id == wallet_id)
        {
            stats.add(log.status, 1);
        }
        Ok(stats)
    }

    async fn delete_terminal_sync_logs_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, LedgerError> {
        let state = self.state()?;
        let before = state.sync_logs.len();
        state
            .sync_logs
            .retain(|_, l| !(l.status.is_terminal() && l.updated_at < cutoff));
        Ok((before - state.sync_logs.len()) as u64)
    }

    async fn append_audit(&mut self, entry: &NewAuditEntry) -> Result<(), LedgerError> {
        let state = self.state()?;
        state.next_audit_id += 1;
        state.audit.push(AuditEntry {
            id: state.next_audit_id,
            table_name: entry.table_name.to_string(),
            record_id: entry.record_id,
            action: entry.action,
            old_data: entry.old_data.clone(),
            new_data: entry.new_data.clone(),
            changed_by: entry.changed_by,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn audit_history(
        &mut self,
        table_name: &str,
        record_id: Uuid,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        Ok(self
            .state()?
            .audit
            .iter()
            .filter(|e| e.table_name == table_name && e.record_id == record_id)
            .cloned()
            .collect())
    }
}
