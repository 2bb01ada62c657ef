//! Offline Sync Reconciliation
//!
//! Payments made over Bluetooth or LAN are reported to the central ledger
//! later. Each participant wallet gets one sync log per transaction that
//! tracks that reporting:
//!
//! ```text
//! create ──► PENDING ──ack──────► SETTLE_SUCCEEDED
//!              │  ▲
//!         fail │  │ retry sweep
//!              ▼  │
//!             FAILED ──abandon──► SETTLE_FAILED
//!
//! PENDING ──diverged──► CONFLICT ──resolve──► RESOLVED
//! ```
//!
//! [`SyncReconciler`] applies the transitions; [`SyncSweepWorker`] requeues
//! retryable failures and purges old terminal logs.

pub mod reconciler;
pub mod state;
pub mod worker;


pub use reconciler::SyncReconciler;
pub use state::SyncStatus;
pub use worker::{SweepReport, SyncSweepWorker, WorkerConfig};
