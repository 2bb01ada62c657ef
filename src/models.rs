//! Ledger records: wallets, payment transactions, peers and sync logs
//!
//! Records are plain data. They are created and mutated only through a
//! [`WorkUnit`](crate::store::WorkUnit), never directly by callers.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{PeerId, SyncLogId, TransactionId, UserId, WalletId};
use crate::error::LedgerError;
use crate::sync::state::SyncStatus;
use crate::transfer::state::TransactionStatus;

// ============================================================================
// Enumerations
// ============================================================================

/// Channel a payment or peer contact travelled over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum ConnectionType {
    Bluetooth = 1,
    Lan = 2,
    Online = 3,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 3] = [
        ConnectionType::Bluetooth,
        ConnectionType::Lan,
        ConnectionType::Online,
    ];

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(ConnectionType::Bluetooth),
            2 => Some(ConnectionType::Lan),
            3 => Some(ConnectionType::Online),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Bluetooth => "bluetooth",
            ConnectionType::Lan => "lan",
            ConnectionType::Online => "online",
        }
    }

    /// True for the peer-to-peer channels that work without the central ledger
    pub fn is_offline(&self) -> bool {
        matches!(self, ConnectionType::Bluetooth | ConnectionType::Lan)
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| LedgerError::InvalidConnectionType(s.to_string()))
    }
}

/// Payment transaction category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TransactionType {
    /// Wallet to wallet
    P2p = 1,
    /// Payment to a merchant wallet
    Merchant = 2,
    /// Funds loaded into a wallet
    Topup = 3,
    /// Funds taken out of a wallet
    Withdrawal = 4,
}

impl TransactionType {
    pub const ALL: [TransactionType; 4] = [
        TransactionType::P2p,
        TransactionType::Merchant,
        TransactionType::Topup,
        TransactionType::Withdrawal,
    ];

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TransactionType::P2p),
            2 => Some(TransactionType::Merchant),
            3 => Some(TransactionType::Topup),
            4 => Some(TransactionType::Withdrawal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::P2p => "p2p",
            TransactionType::Merchant => "merchant",
            TransactionType::Topup => "topup",
            TransactionType::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LedgerError::InvalidArgument(format!("unknown transaction type: {s}")))
    }
}

// ============================================================================
// Money
// ============================================================================

/// Exclusive bound of a NUMERIC(20, 2) column (18 integer digits)
pub const MONEY_LIMIT: Decimal = Decimal::from_parts(0xA764_0000, 0x0DE0_B6B3, 0, false, 0);

/// Whether `amount` is representable in a NUMERIC(20, 2) column
pub fn fits_money_column(amount: Decimal) -> bool {
    amount.abs() < MONEY_LIMIT
}

// ============================================================================
// Wallet
// ============================================================================

/// Account holding a balance and identity/auth material
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wallet {
    pub id: WalletId,
    /// Principal allowed to spend from this wallet
    pub owner_id: Option<UserId>,
    pub name: String,
    pub phone_number: String,
    pub public_key: String,
    pub device_id: Option<String>,
    #[serde(skip_serializing)]
    pub pin_hash: String,
    pub balance: Decimal,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for creating a wallet
#[derive(Debug, Clone)]
pub struct NewWallet {
    pub owner_id: Option<UserId>,
    pub name: String,
    pub phone_number: String,
    pub public_key: String,
    pub device_id: Option<String>,
    pub pin_hash: String,
    pub balance: Decimal,
}

// ============================================================================
// Payment transaction
// ============================================================================

/// Record of value moved (or attempted to move) between two wallets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentTransaction {
    pub id: TransactionId,
    pub from_wallet_id: WalletId,
    pub to_wallet_id: WalletId,
    pub amount: Decimal,
    pub currency: String,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub signature: String,
    pub nonce: i64,
    pub connection_type: Option<ConnectionType>,
    pub metadata: serde_json::Value,
    pub description: Option<String>,
    pub transaction_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fully-normalized input for inserting a payment transaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub from_wallet_id: WalletId,
    pub to_wallet_id: WalletId,
    pub amount: Decimal,
    pub currency: String,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub signature: String,
    pub nonce: i64,
    pub connection_type: Option<ConnectionType>,
    pub metadata: serde_json::Value,
    pub description: Option<String>,
    pub transaction_at: DateTime<Utc>,
}

// ============================================================================
// Peer
// ============================================================================

/// Directional relationship between a wallet and a counterparty.
///
/// Every transacting pair has two of these, one owned by each side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peer {
    pub id: PeerId,
    pub wallet_id: WalletId,
    pub peer_wallet_id: WalletId,
    pub name: Option<String>,
    pub public_key: String,
    pub ip_address: Option<IpAddr>,
    /// Bluetooth hardware address
    pub bt_address: Option<String>,
    pub connection_type: ConnectionType,
    pub is_trusted: bool,
    pub transaction_count: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert input keyed by (wallet_id, peer_wallet_id)
#[derive(Debug, Clone)]
pub struct PeerUpsert {
    pub wallet_id: WalletId,
    pub peer_wallet_id: WalletId,
    pub name: Option<String>,
    pub public_key: String,
    pub ip_address: Option<IpAddr>,
    pub bt_address: Option<String>,
    pub connection_type: ConnectionType,
}

impl PeerUpsert {
    /// Peer row owned by `owner` describing `counterparty`
    pub fn between(owner: &Wallet, counterparty: &Wallet, connection_type: ConnectionType) -> Self {
        Self {
            wallet_id: owner.id,
            peer_wallet_id: counterparty.id,
            name: Some(counterparty.name.clone()),
            public_key: counterparty.public_key.clone(),
            ip_address: None,
            bt_address: None,
            connection_type,
        }
    }
}

// ============================================================================
// Sync log
// ============================================================================

/// Reconciliation progress of one offline-originated transaction for one wallet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncLog {
    pub id: SyncLogId,
    pub transaction_id: TransactionId,
    pub wallet_id: WalletId,
    pub status: SyncStatus,
    pub attempt_count: i32,
    pub error_message: Option<String>,
    /// Divergent local/central view, present once the log entered CONFLICT
    pub conflict_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSyncLog {
    pub transaction_id: TransactionId,
    pub wallet_id: WalletId,
    pub status: SyncStatus,
}

/// How a nullable column changes during an update
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T: Clone> FieldUpdate<T> {
    /// Apply to the current value
    pub fn apply(&self, current: Option<T>) -> Option<T> {
        match self {
            FieldUpdate::Keep => current,
            FieldUpdate::Clear => None,
            FieldUpdate::Set(v) => Some(v.clone()),
        }
    }

    /// (touch column?, new value) pair for SQL `CASE` updates
    pub fn as_sql_parts(&self) -> (bool, Option<T>) {
        match self {
            FieldUpdate::Keep => (false, None),
            FieldUpdate::Clear => (true, None),
            FieldUpdate::Set(v) => (true, Some(v.clone())),
        }
    }
}

/// Compare-and-swap status change of a sync log
#[derive(Debug, Clone)]
pub struct SyncTransition {
    /// Applied only while the log is in one of these states
    pub expected: Vec<SyncStatus>,
    pub to: SyncStatus,
    pub increment_attempts: bool,
    pub error_message: FieldUpdate<String>,
    pub conflict_data: FieldUpdate<serde_json::Value>,
}

/// Per-status sync log counts for one wallet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub pending: i64,
    pub failed: i64,
    pub settle_succeeded: i64,
    pub settle_failed: i64,
    pub conflict: i64,
    pub resolved: i64,
}

impl SyncStats {
    pub fn add(&mut self, status: SyncStatus, count: i64) {
        let slot = match status {
            SyncStatus::Pending => &mut self.pending,
            SyncStatus::Failed => &mut self.failed,
            SyncStatus::SettleSucceeded => &mut self.settle_succeeded,
            SyncStatus::SettleFailed => &mut self.settle_failed,
            SyncStatus::Conflict => &mut self.conflict,
            SyncStatus::Resolved => &mut self.resolved,
        };
        *slot += count;
    }

    pub fn total(&self) -> i64 {
        self.pending
            + self.failed
            + self.settle_succeeded
            + self.settle_failed
            + self.conflict
            + self.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_type_parse() {
        assert_eq!(
            "bluetooth".parse::<ConnectionType>().unwrap(),
            ConnectionType::Bluetooth
        );
        let err = "carrier-pigeon".parse::<ConnectionType>().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConnectionType(v) if v == "carrier-pigeon"));
        assert!(ConnectionType::Lan.is_offline());
        assert!(!ConnectionType::Online.is_offline());
    }

    #[test]
    fn test_transaction_type_ids() {
        for t in TransactionType::ALL {
            assert_eq!(TransactionType::from_id(t.id()), Some(t));
        }
        assert_eq!(TransactionType::from_id(0), None);
    }

    #[test]
    fn test_field_update_apply() {
        let current = Some("old".to_string());
        assert_eq!(FieldUpdate::Keep.apply(current.clone()), current);
        assert_eq!(FieldUpdate::<String>::Clear.apply(current.clone()), None);
        assert_eq!(
            FieldUpdate::Set("new".to_string()).apply(current),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_sync_stats_total() {
        let mut stats = SyncStats::default();
        stats.add(SyncStatus::Failed, 3);
        stats.add(SyncStatus::Pending, 1);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.total(), 4);
    }

    #[test]
    fn test_wallet_serialization_hides_pin_hash() {
        let now = Utc::now();
        let wallet = Wallet {
            id: WalletId::new(),
            owner_id: None,
            name: "Asha".to_string(),
            phone_number: "+9779800000001".to_string(),
            public_key: "pk".to_string(),
            device_id: None,
            pin_hash: "secret".to_string(),
            balance: Decimal::new(10050, 2),
            is_active: true,
            deleted_at: None,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&wallet).unwrap();
        assert!(json.get("pin_hash").is_none());
        assert_eq!(json["balance"], "100.50");
    }
}
