//! Peer Relationship Tracker
//!
//! Every pair of wallets that has transacted owns two directional [`Peer`]
//! records, one per side. Each side keeps its own trust flag; both counters
//! move together on every transfer between the pair.
//!
//! [`Peer`]: crate::models::Peer

pub mod tracker;

pub use tracker::PeerTracker;
