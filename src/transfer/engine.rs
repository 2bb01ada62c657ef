//! Balance Transfer Engine
//!
//! Moves value between two wallets inside a caller-owned work unit. The two
//! wallet rows are always touched in [`lock_order`], so opposite transfers
//! between the same pair serialize on the first row instead of deadlocking.

use rust_decimal::Decimal;
use tracing::debug;

use super::types::{validate_amount, validate_pair};
use crate::core_types::WalletId;
use crate::error::LedgerError;
use crate::models::Wallet;
use crate::store::{WorkUnit, lock_order};

pub struct BalanceTransferEngine;

impl BalanceTransferEngine {
    /// Debit `source` and credit `dest` by `amount`.
    ///
    /// Returns the updated (source, dest) wallets. On error the caller drops
    /// the unit, discarding a debit that already went through.
    pub async fn transfer(
        unit: &mut dyn WorkUnit,
        source: WalletId,
        dest: WalletId,
        amount: Decimal,
    ) -> Result<(Wallet, Wallet), LedgerError> {
        validate_pair(source, dest)?;
        validate_amount(amount)?;

        let (first, second) = lock_order(source, dest);
        let first_wallet = Self::apply(unit, first, source, amount).await?;
        let second_wallet = Self::apply(unit, second, source, amount).await?;

        debug!(
            source = %source,
            dest = %dest,
            amount = %amount,
            first_locked = %first,
            "Balances moved"
        );

        if first == source {
            Ok((first_wallet, second_wallet))
        } else {
            Ok((second_wallet, first_wallet))
        }
    }

    async fn apply(
        unit: &mut dyn WorkUnit,
        wallet: WalletId,
        source: WalletId,
        amount: Decimal,
    ) -> Result<Wallet, LedgerError> {
        if wallet == source {
            unit.debit_wallet(wallet, amount).await
        } else {
            unit.credit_wallet(wallet, amount).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewWallet;
    use crate::store::{LedgerStore, MemoryLedgerStore};
    use rust_decimal_macros::dec;

    async fn seed(unit: &mut dyn WorkUnit, phone: &str, balance: Decimal) -> Wallet {
        unit.insert_wallet(&NewWallet {
            owner_id: None,
            name: phone.to_string(),
            phone_number: phone.to_string(),
            public_key: format!("pk-{phone}"),
            device_id: None,
            pin_hash: "hash".to_string(),
            balance,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_transfer_moves_balances_both_directions() {
        let store = MemoryLedgerStore::new();
        let mut unit = store.begin().await.unwrap();
        let a = seed(unit.as_mut(), "a", dec!(100.00)).await;
        let b = seed(unit.as_mut(), "b", dec!(50.00)).await;

        let (src, dst) = BalanceTransferEngine::transfer(unit.as_mut(), a.id, b.id, dec!(25.50))
            .await
            .unwrap();
        assert_eq!((src.id, dst.id), (a.id, b.id));
        assert_eq!(src.balance, dec!(74.50));
        assert_eq!(dst.balance, dec!(75.50));

        // reverse direction returns wallets in (source, dest) order too
        let (src, dst) = BalanceTransferEngine::transfer(unit.as_mut(), b.id, a.id, dec!(0.50))
            .await
            .unwrap();
        assert_eq!((src.id, dst.id), (b.id, a.id));
        assert_eq!(src.balance, dec!(75.00));
        assert_eq!(dst.balance, dec!(75.00));
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let store = MemoryLedgerStore::new();
        let mut unit = store.begin().await.unwrap();
        let a = seed(unit.as_mut(), "a", dec!(10.00)).await;
        let b = seed(unit.as_mut(), "b", dec!(0)).await;

        let err = BalanceTransferEngine::transfer(unit.as_mut(), a.id, b.id, dec!(10.01))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds));
    }

    #[tokio::test]
    async fn test_missing_wallet() {
        let store = MemoryLedgerStore::new();
        let mut unit = store.begin().await.unwrap();
        let a = seed(unit.as_mut(), "a", dec!(10.00)).await;

        let err = BalanceTransferEngine::transfer(unit.as_mut(), a.id, WalletId::new(), dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "wallet", .. }));
    }

    #[tokio::test]
    async fn test_rejects_same_wallet_and_bad_amount() {
        let store = MemoryLedgerStore::new();
        let mut unit = store.begin().await.unwrap();
        let a = seed(unit.as_mut(), "a", dec!(10.00)).await;
        let b = seed(unit.as_mut(), "b", dec!(10.00)).await;

        let err = BalanceTransferEngine::transfer(unit.as_mut(), a.id, a.id, dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransfer(_)));

        let err = BalanceTransferEngine::transfer(unit.as_mut(), a.id, b.id, dec!(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransfer(_)));
    }
}
