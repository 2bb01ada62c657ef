//! Spend authorization
//!
//! A transfer may only be started by the wallet owner presenting the wallet
//! PIN. PINs are stored as argon2 PHC strings.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::warn;

use crate::core_types::UserId;
use crate::error::LedgerError;
use crate::models::Wallet;

/// Hash a PIN for storage in `Wallet::pin_hash`
pub fn hash_pin(pin: &str) -> Result<String, LedgerError> {
    if pin.is_empty() {
        return Err(LedgerError::InvalidArgument("PIN must not be empty".to_string()));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LedgerError::InvalidArgument(format!("PIN hashing failed: {e}")))
}

/// True when `pin` matches the stored hash. A malformed hash never matches.
pub fn verify_pin(pin: &str, pin_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(pin_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(pin.as_bytes(), &parsed)
        .is_ok()
}

/// Check that `caller` owns `wallet` and knows its PIN
pub fn authorize(wallet: &Wallet, caller: UserId, pin: &str) -> Result<(), LedgerError> {
    if wallet.owner_id != Some(caller) {
        warn!(wallet_id = %wallet.id, caller = %caller, "Spend attempt by non-owner");
        return Err(LedgerError::Unauthorized);
    }
    if !verify_pin(pin, &wallet.pin_hash) {
        warn!(wallet_id = %wallet.id, "Spend attempt with wrong PIN");
        return Err(LedgerError::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::WalletId;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn wallet(owner: UserId, pin: &str) -> Wallet {
        let now = Utc::now();
        Wallet {
            id: WalletId::new(),
            owner_id: Some(owner),
            name: "w".to_string(),
            phone_number: "1".to_string(),
            public_key: "pk".to_string(),
            device_id: None,
            pin_hash: hash_pin(pin).unwrap(),
            balance: Decimal::ZERO,
            is_active: true,
            deleted_at: None,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_pin("4321").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_pin("4321", &hash));
        assert!(!verify_pin("1234", &hash));
        assert!(!verify_pin("4321", "not-a-hash"));
    }

    #[test]
    fn test_authorize() {
        let owner = Uuid::new_v4();
        let w = wallet(owner, "4321");

        assert!(authorize(&w, owner, "4321").is_ok());
        assert!(matches!(
            authorize(&w, owner, "0000"),
            Err(LedgerError::Unauthorized)
        ));
        assert!(matches!(
            authorize(&w, Uuid::new_v4(), "4321"),
            Err(LedgerError::Unauthorized)
        ));
    }
}
