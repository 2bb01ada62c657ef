//! PostgreSQL schema for the ledger tables
//!
//! Enumerations are stored as SMALLINT ids (see the `id()` / `from_id()` pairs
//! on each enum). Statements are idempotent and run in order on startup.

pub const CREATE_WALLETS: &str = r#"
CREATE TABLE IF NOT EXISTS wallets (
    id            UUID PRIMARY KEY,
    owner_id      UUID,
    name          TEXT NOT NULL,
    phone_number  TEXT NOT NULL,
    public_key    TEXT NOT NULL,
    device_id     TEXT,
    pin_hash      TEXT NOT NULL,
    balance       NUMERIC(20, 2) NOT NULL DEFAULT 0,
    is_active     BOOLEAN NOT NULL DEFAULT TRUE,
    deleted_at    TIMESTAMPTZ,
    last_sync_at  TIMESTAMPTZ,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT wallets_phone_number_key UNIQUE (phone_number),
    CONSTRAINT wallets_public_key_key UNIQUE (public_key),
    CONSTRAINT wallets_balance_non_negative CHECK (balance >= 0)
)
"#;

pub const CREATE_TRANSACTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id               UUID PRIMARY KEY,
    from_wallet_id   UUID NOT NULL REFERENCES wallets (id) ON DELETE RESTRICT,
    to_wallet_id     UUID NOT NULL REFERENCES wallets (id) ON DELETE RESTRICT,
    amount           NUMERIC(20, 2) NOT NULL,
    currency         CHAR(3) NOT NULL DEFAULT 'NPR',
    tx_type          SMALLINT NOT NULL,
    status           SMALLINT NOT NULL,
    signature        TEXT NOT NULL,
    nonce            BIGINT NOT NULL,
    connection_type  SMALLINT,
    metadata         JSONB NOT NULL DEFAULT '{}'::jsonb,
    description      TEXT,
    transaction_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at       TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT transactions_from_wallet_nonce_key UNIQUE (from_wallet_id, nonce),
    CONSTRAINT transactions_amount_positive CHECK (amount > 0),
    CONSTRAINT transactions_distinct_wallets CHECK (from_wallet_id <> to_wallet_id)
)
"#;

pub const CREATE_PEERS: &str = r#"
CREATE TABLE IF NOT EXISTS peers (
    id                 UUID PRIMARY KEY,
    wallet_id          UUID NOT NULL REFERENCES wallets (id) ON DELETE CASCADE,
    peer_wallet_id     UUID NOT NULL REFERENCES wallets (id) ON DELETE CASCADE,
    name               TEXT,
    public_key         TEXT NOT NULL,
    ip_address         TEXT,
    bt_address         TEXT,
    connection_type    SMALLINT NOT NULL,
    is_trusted         BOOLEAN NOT NULL DEFAULT FALSE,
    transaction_count  BIGINT NOT NULL DEFAULT 0,
    last_seen_at       TIMESTAMPTZ,
    deleted_at         TIMESTAMPTZ,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT peers_wallet_peer_key UNIQUE (wallet_id, peer_wallet_id)
)
"#;

pub const CREATE_SYNC_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS sync_logs (
    id              UUID PRIMARY KEY,
    transaction_id  UUID NOT NULL REFERENCES transactions (id) ON DELETE RESTRICT,
    wallet_id       UUID NOT NULL REFERENCES wallets (id) ON DELETE RESTRICT,
    status          SMALLINT NOT NULL,
    attempt_count   INTEGER NOT NULL DEFAULT 0,
    error_message   TEXT,
    conflict_data   JSONB,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT sync_logs_transaction_wallet_key UNIQUE (transaction_id, wallet_id),
    CONSTRAINT sync_logs_attempts_non_negative CHECK (attempt_count >= 0)
)
"#;

pub const CREATE_SYNC_LOGS_RETRY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS sync_logs_retry_idx
    ON sync_logs (status, attempt_count, created_at)
"#;

pub const CREATE_AUDIT_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS audit_logs (
    id          BIGSERIAL PRIMARY KEY,
    table_name  TEXT NOT NULL,
    record_id   UUID NOT NULL,
    action      TEXT NOT NULL,
    old_data    JSONB,
    new_data    JSONB,
    changed_by  UUID,
    ip_address  TEXT,
    user_agent  TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_AUDIT_LOGS_RECORD_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS audit_logs_record_idx
    ON audit_logs (table_name, record_id, created_at)
"#;

/// All DDL statements in dependency order
pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_WALLETS,
    CREATE_TRANSACTIONS,
    CREATE_PEERS,
    CREATE_SYNC_LOGS,
    CREATE_SYNC_LOGS_RETRY_INDEX,
    CREATE_AUDIT_LOGS,
    CREATE_AUDIT_LOGS_RECORD_INDEX,
];

/// Unique constraint names the store maps to `Conflict` errors
pub mod constraints {
    pub const WALLET_PHONE: &str = "wallets_phone_number_key";
    pub const WALLET_PUBLIC_KEY: &str = "wallets_public_key_key";
    pub const TRANSACTION_NONCE: &str = "transactions_from_wallet_nonce_key";
    pub const SYNC_LOG_TRANSACTION_WALLET: &str = "sync_logs_transaction_wallet_key";
}
