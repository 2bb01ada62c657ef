//! Payon - Wallet Ledger Core
//!
//! Moves money between wallets, tracks who pays whom, and reconciles
//! payments made offline (Bluetooth/LAN) with the central ledger.
//!
//! # Modules
//!
//! - [`core_types`] - Id newtypes (WalletId, TransactionId, etc.)
//! - [`models`] - Wallet, PaymentTransaction, Peer and SyncLog records
//! - [`error`] - Shared error taxonomy
//! - [`audit`] - Append-only change history
//! - [`store`] - Ledger store traits with PostgreSQL and in-memory backends
//! - [`transfer`] - Balance transfer engine and transfer orchestrator
//! - [`peer`] - Peer relationship tracker
//! - [`sync`] - Offline sync reconciliation state machine and sweep worker
//! - [`config`] / [`logging`] / [`db`] - Process setup

// Core types - must be first!
pub mod core_types;

pub mod audit;
pub mod error;
pub mod models;

// Ledger components
pub mod peer;
pub mod store;
pub mod sync;
pub mod transfer;

// Process setup
pub mod config;
pub mod db;
pub mod logging;

// Convenient re-exports at crate root
pub use audit::{AuditAction, AuditContext, AuditEntry};
pub use core_types::{PeerId, SyncLogId, TransactionId, UserId, WalletId};
pub use error::{ConflictKind, LedgerError};
pub use models::{
    ConnectionType, PaymentTransaction, Peer, SyncLog, SyncStats, TransactionType, Wallet,
};
pub use peer::PeerTracker;
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore, WorkUnit};
pub use sync::{SyncReconciler, SyncStatus, SyncSweepWorker};
pub use transfer::{
    BalanceTransferEngine, CreateWalletParams, TransactionStatus, TransferOrchestrator,
    TransferParams, TransferResult,
};
