//! Core identity types used throughout the ledger
//!
//! Every record is keyed by a UUID v4. Each record kind gets its own newtype so
//! a wallet id can never be passed where a sync log id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Get the inner UUID value
            #[inline]
            pub fn inner(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Wallet identity.
    ///
    /// `Ord` compares the UUID as 16 big-endian bytes. This total order is the
    /// wallet lock order: the smaller id is always touched first.
    WalletId
);

uuid_id!(
    /// Payment transaction identity
    TransactionId
);

uuid_id!(
    /// Directional peer relationship identity
    PeerId
);

uuid_id!(
    /// Sync log identity
    SyncLogId
);

/// Authenticated principal that owns wallets (the collaborator's user id)
pub type UserId = Uuid;
