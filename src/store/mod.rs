//! Ledger Store
//!
//! Durable storage for wallets, payment transactions, peers, sync logs and
//! audit entries, accessed only through atomic work units.
//!
//! # Work units
//!
//! [`LedgerStore::begin`] opens a [`WorkUnit`]. Every primitive on the unit is
//! part of one ACID transaction. [`WorkUnit::commit`] makes the changes
//! visible. A unit that is dropped without committing (an error path, or a
//! cancelled future) is rolled back, so callers never observe partial state.
//!
//! # Locking
//!
//! Row-mutating primitives (`debit_wallet`, `credit_wallet`, peer updates,
//! CAS status updates) lock the touched row until the unit ends. Callers that
//! touch two wallets in one unit must touch them in [`lock_order`].

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::audit::{AuditEntry, NewAuditEntry};
use crate::core_types::{SyncLogId, TransactionId, WalletId};
use crate::error::{ConflictKind, LedgerError};
use crate::models::{
    NewSyncLog, NewTransaction, NewWallet, PaymentTransaction, Peer, PeerUpsert, SyncLog,
    SyncStats, SyncTransition, Wallet,
};
use crate::transfer::state::TransactionStatus;

/// Order in which two wallet rows must be touched inside one work unit.
///
/// The smaller id comes first, independent of transfer direction, so two
/// opposite transfers between the same pair queue on the same row instead of
/// deadlocking.
#[inline]
pub fn lock_order(a: WalletId, b: WalletId) -> (WalletId, WalletId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Read a wallet that has not been soft-deleted
pub async fn live_wallet(unit: &mut dyn WorkUnit, id: WalletId) -> Result<Wallet, LedgerError> {
    unit.get_wallet(id)
        .await?
        .filter(|w| !w.is_deleted())
        .ok_or_else(|| LedgerError::not_found("wallet", id))
}

/// A wallet hard delete blocked by ledger history that references it
pub(crate) fn wallet_in_use(referenced_by: &'static str) -> LedgerError {
    LedgerError::Conflict(ConflictKind::InUse {
        entity: "wallet",
        referenced_by,
    })
}

/// Factory for work units
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &'static str;

    /// Open a new atomic work unit
    async fn begin(&self) -> Result<Box<dyn WorkUnit>, LedgerError>;
}

/// One atomic unit of work against the ledger
#[async_trait]
pub trait WorkUnit: Send {
    // === Lifecycle ===

    /// Make every change of this unit durable and visible
    async fn commit(&mut self) -> Result<(), LedgerError>;

    /// Discard every change of this unit
    async fn rollback(&mut self) -> Result<(), LedgerError>;

    // === Wallets ===

    /// Insert a wallet. Duplicate phone number or public key is a `Conflict`.
    async fn insert_wallet(&mut self, wallet: &NewWallet) -> Result<Wallet, LedgerError>;

    /// Read a wallet, including soft-deleted ones
    async fn get_wallet(&mut self, id: WalletId) -> Result<Option<Wallet>, LedgerError>;

    /// Atomically subtract `amount`.
    ///
    /// The balance check is part of the same update: `InsufficientFunds` if
    /// the balance would go negative, `NotFound` for missing or soft-deleted
    /// wallets, `InvalidTransfer` for deactivated ones.
    async fn debit_wallet(&mut self, id: WalletId, amount: Decimal)
    -> Result<Wallet, LedgerError>;

    /// Atomically add `amount`. Same existence rules as `debit_wallet`.
    async fn credit_wallet(
        &mut self,
        id: WalletId,
        amount: Decimal,
    ) -> Result<Wallet, LedgerError>;

    async fn set_wallet_active(&mut self, id: WalletId, active: bool)
    -> Result<Wallet, LedgerError>;

    async fn soft_delete_wallet(&mut self, id: WalletId) -> Result<Wallet, LedgerError>;

    /// Physically remove a wallet together with its peer records.
    /// Fails with `Conflict(InUse)` while any payment transaction or sync log
    /// references the wallet. Returns false when no such wallet existed.
    async fn hard_delete_wallet(&mut self, id: WalletId) -> Result<bool, LedgerError>;

    async fn mark_wallet_synced(
        &mut self,
        id: WalletId,
        at: DateTime<Utc>,
    ) -> Result<Wallet, LedgerError>;

    // === Payment transactions ===

    /// Insert a payment transaction. A reused (from_wallet_id, nonce) pair is
    /// `Conflict(DuplicateNonce)`.
    async fn insert_transaction(
        &mut self,
        tx: &NewTransaction,
    ) -> Result<PaymentTransaction, LedgerError>;

    async fn get_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<PaymentTransaction>, LedgerError>;

    async fn nonce_exists(&mut self, wallet_id: WalletId, nonce: i64)
    -> Result<bool, LedgerError>;

    /// CAS update: change status only while it is one of `expected`.
    /// Returns `None` if the transaction is absent or in another state.
    async fn update_transaction_status_if(
        &mut self,
        id: TransactionId,
        expected: &[TransactionStatus],
        to: TransactionStatus,
    ) -> Result<Option<PaymentTransaction>, LedgerError>;

    // === Peers ===

    /// Insert or refresh the (wallet_id, peer_wallet_id) record.
    ///
    /// New records start untrusted with a zero counter. Existing records keep
    /// trust and counter; name, key, addresses, connection type and last-seen
    /// are refreshed and a soft-deleted record is revived.
    async fn upsert_peer(&mut self, peer: &PeerUpsert) -> Result<Peer, LedgerError>;

    async fn get_peer(
        &mut self,
        wallet_id: WalletId,
        peer_wallet_id: WalletId,
    ) -> Result<Option<Peer>, LedgerError>;

    /// Live peers owned by `wallet_id`, most recently seen first
    async fn list_peers(&mut self, wallet_id: WalletId) -> Result<Vec<Peer>, LedgerError>;

    /// +1 on the counter and refresh last-seen; `NotFound` if absent
    async fn increment_peer_transaction_count(
        &mut self,
        wallet_id: WalletId,
        peer_wallet_id: WalletId,
    ) -> Result<Peer, LedgerError>;

    async fn set_peer_trusted(
        &mut self,
        wallet_id: WalletId,
        peer_wallet_id: WalletId,
        trusted: bool,
    ) -> Result<Peer, LedgerError>;

    /// Trust every live, untrusted peer with `transaction_count >= threshold`.
    /// Returns the records that changed.
    async fn trust_peers_with_count_at_least(
        &mut self,
        threshold: i64,
    ) -> Result<Vec<Peer>, LedgerError>;

    // === Sync logs ===

    /// Insert a sync log. A second log for the same (transaction, wallet) is
    /// a `Conflict`.
    async fn insert_sync_log(&mut self, log: &NewSyncLog) -> Result<SyncLog, LedgerError>;

    async fn get_sync_log(&mut self, id: SyncLogId) -> Result<Option<SyncLog>, LedgerError>;

    async fn list_sync_logs_for_transaction(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<Vec<SyncLog>, LedgerError>;

    /// CAS update. Returns `None` if the log is absent or not in one of
    /// `transition.expected`.
    async fn transition_sync_log(
        &mut self,
        id: SyncLogId,
        transition: &SyncTransition,
    ) -> Result<Option<SyncLog>, LedgerError>;

    /// FAILED logs with `attempt_count < max_attempts`, oldest first
    async fn sync_logs_needing_retry(
        &mut self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<SyncLog>, LedgerError>;

    async fn sync_stats(&mut self, wallet_id: WalletId) -> Result<SyncStats, LedgerError>;

    /// Delete logs in a terminal state whose last update is before `cutoff`.
    /// Returns the number of deleted logs.
    async fn delete_terminal_sync_logs_before(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, LedgerError>;

    // === Audit ===

    async fn append_audit(&mut self, entry: &NewAuditEntry) -> Result<(), LedgerError>;

    /// Entries for one record, oldest first
    async fn audit_history(
        &mut self,
        table_name: &str,
        record_id: Uuid,
    ) -> Result<Vec<AuditEntry>, LedgerError>;
}
