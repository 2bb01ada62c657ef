//! Transfer request and result types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::state::TransactionStatus;
use crate::core_types::{UserId, WalletId};
use crate::error::LedgerError;
use crate::models::{
    ConnectionType, MONEY_LIMIT, NewTransaction, PaymentTransaction, TransactionType, Wallet,
    fits_money_column,
};

pub const DEFAULT_CURRENCY: &str = "NPR";

/// Random low bits appended to the millisecond clock in generated nonces
const NONCE_RANDOM_BITS: u32 = 20;

/// Caller input for a transfer or a recorded transaction.
///
/// Only the wallets, the amount and the signature are mandatory; every other
/// field falls back to a default in [`TransferParams::normalize`].
#[derive(Debug, Clone)]
pub struct TransferParams {
    pub from_wallet_id: WalletId,
    pub to_wallet_id: WalletId,
    pub amount: Decimal,
    pub signature: String,
    pub nonce: Option<i64>,
    pub currency: Option<String>,
    pub tx_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub connection_type: Option<ConnectionType>,
    pub metadata: Option<serde_json::Value>,
    pub description: Option<String>,
    pub transaction_at: Option<DateTime<Utc>>,
}

impl TransferParams {
    pub fn new(
        from_wallet_id: WalletId,
        to_wallet_id: WalletId,
        amount: Decimal,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            from_wallet_id,
            to_wallet_id,
            amount,
            signature: signature.into(),
            nonce: None,
            currency: None,
            tx_type: None,
            status: None,
            connection_type: None,
            metadata: None,
            description: None,
            transaction_at: None,
        }
    }

    pub fn with_nonce(mut self, nonce: i64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_type(mut self, tx_type: TransactionType) -> Self {
        self.tx_type = Some(tx_type);
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = Some(connection_type);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_transaction_at(mut self, at: DateTime<Utc>) -> Self {
        self.transaction_at = Some(at);
        self
    }

    /// Connection type after defaulting
    pub fn effective_connection_type(&self) -> ConnectionType {
        self.connection_type.unwrap_or(ConnectionType::Online)
    }

    /// Validate and fill defaults, producing the record to insert
    pub fn normalize(self) -> Result<NewTransaction, LedgerError> {
        validate_pair(self.from_wallet_id, self.to_wallet_id)?;
        validate_amount(self.amount)?;

        let signature = self.signature.trim().to_string();
        if signature.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "signature must not be empty".to_string(),
            ));
        }

        let nonce = match self.nonce {
            Some(n) if n <= 0 => {
                return Err(LedgerError::InvalidTransfer(format!(
                    "nonce must be positive, got {n}"
                )));
            }
            Some(n) => n,
            None => generate_nonce(),
        };

        let currency = self
            .currency
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(LedgerError::InvalidArgument(format!(
                "currency must be a three letter uppercase code, got {currency:?}"
            )));
        }

        let status = self.status.unwrap_or(TransactionStatus::Pending);
        if status.is_terminal() {
            return Err(LedgerError::InvalidArgument(format!(
                "transaction cannot be created as {status}"
            )));
        }

        let metadata = self
            .metadata
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        if !metadata.is_object() {
            return Err(LedgerError::InvalidArgument(
                "metadata must be a JSON object".to_string(),
            ));
        }

        Ok(NewTransaction {
            from_wallet_id: self.from_wallet_id,
            to_wallet_id: self.to_wallet_id,
            amount: self.amount,
            currency,
            tx_type: self.tx_type.unwrap_or(TransactionType::P2p),
            status,
            signature,
            nonce,
            connection_type: Some(self.connection_type.unwrap_or(ConnectionType::Online)),
            metadata,
            description: self.description,
            transaction_at: self.transaction_at.unwrap_or_else(Utc::now),
        })
    }
}

pub(crate) fn validate_pair(from: WalletId, to: WalletId) -> Result<(), LedgerError> {
    if from == to {
        return Err(LedgerError::InvalidTransfer(
            "source and destination wallet must differ".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidTransfer(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(LedgerError::InvalidTransfer(format!(
            "amount has more than two decimal places: {amount}"
        )));
    }
    if !fits_money_column(amount) {
        return Err(LedgerError::InvalidTransfer(format!(
            "amount must be below {MONEY_LIMIT}, got {amount}"
        )));
    }
    Ok(())
}

/// Default nonce: milliseconds since the epoch in the high bits, random low
/// bits. Collisions need the same wallet, millisecond and 20 random bits.
pub fn generate_nonce() -> i64 {
    let millis = Utc::now().timestamp_millis().max(1);
    let noise = i64::from(rand::random::<u32>() & ((1 << NONCE_RANDOM_BITS) - 1));
    (millis << NONCE_RANDOM_BITS) | noise
}

/// Input for opening a wallet
#[derive(Debug, Clone)]
pub struct CreateWalletParams {
    pub owner_id: Option<UserId>,
    pub name: String,
    pub phone_number: String,
    pub public_key: String,
    pub device_id: Option<String>,
    /// Plain PIN, hashed before it reaches the store
    pub pin: String,
    pub initial_balance: Decimal,
}

impl CreateWalletParams {
    pub fn validate(&self) -> Result<(), LedgerError> {
        for (field, value) in [
            ("name", &self.name),
            ("phone_number", &self.phone_number),
            ("public_key", &self.public_key),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::InvalidArgument(format!(
                    "{field} must not be empty"
                )));
            }
        }
        if self.initial_balance < Decimal::ZERO
            || self.initial_balance.normalize().scale() > 2
            || !fits_money_column(self.initial_balance)
        {
            return Err(LedgerError::InvalidArgument(format!(
                "invalid initial balance: {}",
                self.initial_balance
            )));
        }
        Ok(())
    }
}

/// Outcome of a committed transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferResult {
    pub transaction: PaymentTransaction,
    pub source_wallet: Wallet,
    pub dest_wallet: Wallet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params(amount: Decimal) -> TransferParams {
        TransferParams::new(WalletId::new(), WalletId::new(), amount, "sig")
    }

    #[test]
    fn test_defaults() {
        let tx = params(dec!(25.50)).normalize().unwrap();
        assert_eq!(tx.currency, "NPR");
        assert_eq!(tx.tx_type, TransactionType::P2p);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.connection_type, Some(ConnectionType::Online));
        assert_eq!(tx.metadata, serde_json::json!({}));
        assert!(tx.nonce > 0);
    }

    #[test]
    fn test_same_wallet_rejected() {
        let id = WalletId::new();
        let err = TransferParams::new(id, id, dec!(1), "sig")
            .normalize()
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransfer(_)));
    }

    #[test]
    fn test_amount_rules() {
        assert!(matches!(
            params(dec!(0)).normalize().unwrap_err(),
            LedgerError::InvalidTransfer(_)
        ));
        assert!(matches!(
            params(dec!(-5)).normalize().unwrap_err(),
            LedgerError::InvalidTransfer(_)
        ));
        assert!(matches!(
            params(dec!(1.001)).normalize().unwrap_err(),
            LedgerError::InvalidTransfer(_)
        ));
        // trailing zeros beyond two places are fine
        assert!(params(dec!(1.5000)).normalize().is_ok());

        assert!(params(dec!(999999999999999999.99)).normalize().is_ok());
        assert!(matches!(
            params(MONEY_LIMIT).normalize().unwrap_err(),
            LedgerError::InvalidTransfer(_)
        ));
        assert!(matches!(
            params(Decimal::MAX).normalize().unwrap_err(),
            LedgerError::InvalidTransfer(_)
        ));
    }

    #[test]
    fn test_field_validation() {
        let err = TransferParams::new(WalletId::new(), WalletId::new(), dec!(1), "  ")
            .normalize()
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));

        let err = params(dec!(1)).with_nonce(0).normalize().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransfer(_)));

        let err = params(dec!(1)).with_currency("usd").normalize().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));

        let err = params(dec!(1))
            .with_metadata(serde_json::json!([1, 2]))
            .normalize()
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));

        let err = params(dec!(1))
            .with_status(TransactionStatus::Settled)
            .normalize()
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }

    #[test]
    fn test_wallet_params_validation() {
        let mut params = CreateWalletParams {
            owner_id: None,
            name: "Asha".to_string(),
            phone_number: "+9779800000001".to_string(),
            public_key: "pk".to_string(),
            device_id: None,
            pin: "1234".to_string(),
            initial_balance: dec!(100.00),
        };
        assert!(params.validate().is_ok());

        params.initial_balance = dec!(-1);
        assert!(params.validate().is_err());

        params.initial_balance = Decimal::MAX;
        assert!(matches!(
            params.validate(),
            Err(LedgerError::InvalidArgument(_))
        ));
        params.initial_balance = dec!(1000000000000000000);
        assert!(params.validate().is_err());

        params.initial_balance = dec!(0);
        params.phone_number = " ".to_string();
        assert!(matches!(
            params.validate(),
            Err(LedgerError::InvalidArgument(msg)) if msg.contains("phone_number")
        ));
    }

    #[test]
    fn test_generated_nonce_layout() {
        let before = Utc::now().timestamp_millis();
        let nonce = generate_nonce();
        let after = Utc::now().timestamp_millis();

        assert!(nonce > 0);
        let millis = nonce >> NONCE_RANDOM_BITS;
        assert!((before..=after).contains(&millis));
    }
}
