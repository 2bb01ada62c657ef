//! Peer Relationship Tracker
//!
//! Maintains the two directional peer records of every transacting pair and
//! promotes frequent counterparties to trusted.
//!
//! The `*_in` functions run inside a caller-owned work unit (the transfer
//! orchestrator uses them); the [`PeerTracker`] methods open and commit their
//! own unit.

use std::sync::Arc;

use tracing::{debug, info};

use crate::audit::{AuditContext, NewAuditEntry, PEERS_TABLE};
use crate::core_types::WalletId;
use crate::error::LedgerError;
use crate::models::{ConnectionType, Peer, PeerUpsert, Wallet};
use crate::store::{LedgerStore, WorkUnit, live_wallet, lock_order};

fn peer_not_found(wallet_id: WalletId, peer_wallet_id: WalletId) -> LedgerError {
    LedgerError::not_found("peer", format!("{wallet_id}/{peer_wallet_id}"))
}

/// Upsert one directional record and audit it
async fn upsert_one(
    unit: &mut dyn WorkUnit,
    upsert: &PeerUpsert,
    ctx: &AuditContext,
) -> Result<Peer, LedgerError> {
    let before = unit.get_peer(upsert.wallet_id, upsert.peer_wallet_id).await?;
    let peer = unit.upsert_peer(upsert).await?;
    let entry = match &before {
        Some(old) => NewAuditEntry::update(PEERS_TABLE, peer.id.inner(), old, &peer, ctx)?,
        None => NewAuditEntry::insert(PEERS_TABLE, peer.id.inner(), &peer, ctx)?,
    };
    unit.append_audit(&entry).await?;
    Ok(peer)
}

/// Record that `a` and `b` interacted over `connection_type`.
///
/// Returns the (a → b, b → a) records. Rows are written in wallet lock order.
pub async fn record_interaction_in(
    unit: &mut dyn WorkUnit,
    a: &Wallet,
    b: &Wallet,
    connection_type: ConnectionType,
    ctx: &AuditContext,
) -> Result<(Peer, Peer), LedgerError> {
    if a.id == b.id {
        return Err(LedgerError::InvalidArgument(
            "a wallet cannot be its own peer".to_string(),
        ));
    }

    let (first, _) = lock_order(a.id, b.id);
    let (owner_first, other) = if first == a.id { (a, b) } else { (b, a) };

    let first_peer = upsert_one(
        unit,
        &PeerUpsert::between(owner_first, other, connection_type),
        ctx,
    )
    .await?;
    let second_peer = upsert_one(
        unit,
        &PeerUpsert::between(other, owner_first, connection_type),
        ctx,
    )
    .await?;

    if first == a.id {
        Ok((first_peer, second_peer))
    } else {
        Ok((second_peer, first_peer))
    }
}

/// +1 on one directional record
pub async fn increment_in(
    unit: &mut dyn WorkUnit,
    wallet_id: WalletId,
    peer_wallet_id: WalletId,
    ctx: &AuditContext,
) -> Result<Peer, LedgerError> {
    let before = unit
        .get_peer(wallet_id, peer_wallet_id)
        .await?
        .ok_or_else(|| peer_not_found(wallet_id, peer_wallet_id))?;
    let peer = unit
        .increment_peer_transaction_count(wallet_id, peer_wallet_id)
        .await?;
    unit.append_audit(&NewAuditEntry::update(
        PEERS_TABLE,
        peer.id.inner(),
        &before,
        &peer,
        ctx,
    )?)
    .await?;
    Ok(peer)
}

/// +1 on both directional records of a pair, in wallet lock order.
/// Returns the (a → b, b → a) records.
pub async fn increment_pair_in(
    unit: &mut dyn WorkUnit,
    a: WalletId,
    b: WalletId,
    ctx: &AuditContext,
) -> Result<(Peer, Peer), LedgerError> {
    let (first, second) = lock_order(a, b);
    let first_peer = increment_in(unit, first, second, ctx).await?;
    let second_peer = increment_in(unit, second, first, ctx).await?;
    if first == a {
        Ok((first_peer, second_peer))
    } else {
        Ok((second_peer, first_peer))
    }
}

/// Store-backed peer operations, one work unit per call
#[derive(Clone)]
pub struct PeerTracker {
    store: Arc<dyn LedgerStore>,
}

impl PeerTracker {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Idempotently create or refresh both directional records of a pair.
    /// A missing connection type is treated as `online`.
    pub async fn record_interaction(
        &self,
        a: WalletId,
        b: WalletId,
        connection_type: Option<ConnectionType>,
        ctx: &AuditContext,
    ) -> Result<(Peer, Peer), LedgerError> {
        let connection_type = connection_type.unwrap_or(ConnectionType::Online);
        let mut unit = self.store.begin().await?;

        let (first, second) = lock_order(a, b);
        let first_wallet = live_wallet(unit.as_mut(), first).await?;
        let second_wallet = live_wallet(unit.as_mut(), second).await?;
        let (wallet_a, wallet_b) = if first == a {
            (first_wallet, second_wallet)
        } else {
            (second_wallet, first_wallet)
        };

        let peers =
            record_interaction_in(unit.as_mut(), &wallet_a, &wallet_b, connection_type, ctx)
                .await?;
        unit.commit().await?;

        debug!(
            wallet_a = %a,
            wallet_b = %b,
            connection_type = %connection_type,
            "Peer interaction recorded"
        );
        Ok(peers)
    }

    /// +1 on the (wallet → peer wallet) counter only
    pub async fn increment_transaction_count(
        &self,
        wallet_id: WalletId,
        peer_wallet_id: WalletId,
        ctx: &AuditContext,
    ) -> Result<Peer, LedgerError> {
        let mut unit = self.store.begin().await?;
        let peer = increment_in(unit.as_mut(), wallet_id, peer_wallet_id, ctx).await?;
        unit.commit().await?;
        Ok(peer)
    }

    /// Trust every live peer whose counter reached `threshold`.
    ///
    /// Already trusted peers are left alone, so repeated runs return only new
    /// promotions.
    pub async fn auto_trust_frequent_peers(
        &self,
        threshold: i64,
        ctx: &AuditContext,
    ) -> Result<Vec<Peer>, LedgerError> {
        if threshold < 1 {
            return Err(LedgerError::InvalidArgument(format!(
                "auto-trust threshold must be at least 1, got {threshold}"
            )));
        }

        let mut unit = self.store.begin().await?;
        let promoted = unit.trust_peers_with_count_at_least(threshold).await?;
        for peer in &promoted {
            let before = Peer {
                is_trusted: false,
                ..peer.clone()
            };
            unit.append_audit(&NewAuditEntry::update(
                PEERS_TABLE,
                peer.id.inner(),
                &before,
                peer,
                ctx,
            )?)
            .await?;
        }
        unit.commit().await?;

        if !promoted.is_empty() {
            info!(count = promoted.len(), threshold, "Promoted frequent peers to trusted");
        }
        Ok(promoted)
    }

    pub async fn set_trusted(
        &self,
        wallet_id: WalletId,
        peer_wallet_id: WalletId,
        trusted: bool,
        ctx: &AuditContext,
    ) -> Result<Peer, LedgerError> {
        let mut unit = self.store.begin().await?;
        let before = unit
            .get_peer(wallet_id, peer_wallet_id)
            .await?
            .ok_or_else(|| peer_not_found(wallet_id, peer_wallet_id))?;
        let peer = unit
            .set_peer_trusted(wallet_id, peer_wallet_id, trusted)
            .await?;
        unit.append_audit(&NewAuditEntry::update(
            PEERS_TABLE,
            peer.id.inner(),
            &before,
            &peer,
            ctx,
        )?)
        .await?;
        unit.commit().await?;
        Ok(peer)
    }

    /// Live record for (wallet → peer wallet)
    pub async fn get(
        &self,
        wallet_id: WalletId,
        peer_wallet_id: WalletId,
    ) -> Result<Peer, LedgerError> {
        let mut unit = self.store.begin().await?;
        unit.get_peer(wallet_id, peer_wallet_id)
            .await?
            .filter(|p| p.deleted_at.is_none())
            .ok_or_else(|| peer_not_found(wallet_id, peer_wallet_id))
    }

    pub async fn list(&self, wallet_id: WalletId) -> Result<Vec<Peer>, LedgerError> {
        let mut unit = self.store.begin().await?;
        unit.list_peers(wallet_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewWallet;
    use crate::store::MemoryLedgerStore;
    use rust_decimal::Decimal;

    async fn seed_pair(store: &MemoryLedgerStore) -> (Wallet, Wallet) {
        let mut unit = store.begin().await.unwrap();
        let mut wallets = Vec::new();
        for tag in ["a", "b"] {
            wallets.push(
                unit.insert_wallet(&NewWallet {
                    owner_id: None,
                    name: format!("wallet {tag}"),
                    phone_number: tag.to_string(),
                    public_key: format!("pk-{tag}"),
                    device_id: None,
                    pin_hash: "hash".to_string(),
                    balance: Decimal::ZERO,
                })
                .await
                .unwrap(),
            );
        }
        unit.commit().await.unwrap();
        let b = wallets.pop().unwrap();
        let a = wallets.pop().unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn test_record_interaction_is_idempotent_and_symmetric() {
        let store = MemoryLedgerStore::new();
        let (a, b) = seed_pair(&store).await;
        let tracker = PeerTracker::new(Arc::new(store));
        let ctx = AuditContext::system();

        let (ab, ba) = tracker.record_interaction(a.id, b.id, None, &ctx).await.unwrap();
        assert_eq!((ab.wallet_id, ab.peer_wallet_id), (a.id, b.id));
        assert_eq!((ba.wallet_id, ba.peer_wallet_id), (b.id, a.id));
        assert_eq!(ab.connection_type, ConnectionType::Online);
        assert_eq!(ab.public_key, b.public_key);
        assert_eq!(ba.name.as_deref(), Some("wallet a"));

        let (ab2, _) = tracker
            .record_interaction(a.id, b.id, Some(ConnectionType::Bluetooth), &ctx)
            .await
            .unwrap();
        assert_eq!(ab2.id, ab.id);
        assert_eq!(ab2.connection_type, ConnectionType::Bluetooth);
        assert_eq!(tracker.list(a.id).await.unwrap().len(), 1);
        assert_eq!(tracker.list(b.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_increment_requires_existing_pair() {
        let store = MemoryLedgerStore::new();
        let (a, b) = seed_pair(&store).await;
        let tracker = PeerTracker::new(Arc::new(store));
        let ctx = AuditContext::system();

        let err = tracker
            .increment_transaction_count(a.id, b.id, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "peer", .. }));

        tracker.record_interaction(a.id, b.id, None, &ctx).await.unwrap();
        let peer = tracker
            .increment_transaction_count(a.id, b.id, &ctx)
            .await
            .unwrap();
        assert_eq!(peer.transaction_count, 1);
        // only the requested direction moves
        assert_eq!(tracker.get(b.id, a.id).await.unwrap().transaction_count, 0);
    }

    #[tokio::test]
    async fn test_auto_trust() {
        let store = MemoryLedgerStore::new();
        let (a, b) = seed_pair(&store).await;
        let tracker = PeerTracker::new(Arc::new(store));
        let ctx = AuditContext::system();

        tracker.record_interaction(a.id, b.id, None, &ctx).await.unwrap();
        for _ in 0..3 {
            tracker
                .increment_transaction_count(a.id, b.id, &ctx)
                .await
                .unwrap();
        }

        assert!(matches!(
            tracker.auto_trust_frequent_peers(0, &ctx).await,
            Err(LedgerError::InvalidArgument(_))
        ));

        let promoted = tracker.auto_trust_frequent_peers(3, &ctx).await.unwrap();
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].wallet_id, a.id);
        assert!(promoted[0].is_trusted);

        // second run has nothing left to promote
        assert!(tracker.auto_trust_frequent_peers(3, &ctx).await.unwrap().is_empty());
        assert!(!tracker.get(b.id, a.id).await.unwrap().is_trusted);
    }

    #[tokio::test]
    async fn test_self_interaction_rejected() {
        let store = MemoryLedgerStore::new();
        let (a, _) = seed_pair(&store).await;
        let tracker = PeerTracker::new(Arc::new(store));

        let err = tracker
            .record_interaction(a.id, a.id, None, &AuditContext::system())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }
}
