//! Wallet Transfers
//!
//! Moves value between two wallets with strict atomicity.
//!
//! # Flow
//!
//! ```text
//! TransferParams ──normalize──► NewTransaction
//!                                   │
//!            ┌──────────── one work unit ─────────────┐
//!            │ insert transaction (nonce unique)      │
//!            │ debit / credit in wallet lock order    │
//!            │ upsert peers A→B, B→A                  │
//!            │ increment both peer counters           │
//!            │ audit entries                          │
//!            └───────────────► commit ◄───────────────┘
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Lock Order**: the smaller wallet id is always touched first
//! 2. **Atomic Debit**: the balance check and the debit are one conditional update
//! 3. **Idempotency**: (source wallet, nonce) is unique; a replay is a `Conflict`
//! 4. **All or Nothing**: an error or a dropped future rolls back the whole unit

pub mod auth;
pub mod coordinator;
pub mod engine;
pub mod state;
pub mod types;


pub use coordinator::TransferOrchestrator;
pub use engine::BalanceTransferEngine;
pub use state::TransactionStatus;
pub use types::{CreateWalletParams, TransferParams, TransferResult};
