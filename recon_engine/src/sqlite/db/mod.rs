//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, maintained as simple functions (rather than stateful structs)
//! that accept a `&mut SqliteConnection` argument. Callers obtain a connection from a pool, or
//! open a transaction and pass `&mut *tx` without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod callbacks;
pub mod loans;
pub mod orders;
pub mod partners;

const SQLITE_DB_URL: &str = "sqlite://data/recon_store.db";

pub fn db_url() -> String {
    let result = env::var("PRC_DATABASE_URL").unwrap_or_else(|_| {
        info!("PRC_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// Creates the store schema if it does not exist. Schema migration tooling lives outside this
/// system; this call only guarantees a fresh database (or an in-memory test database) is usable.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), SqlxError> {
    sqlx::query(SCHEMA).execute(pool).await?;
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id                  TEXT PRIMARY KEY NOT NULL,
    partner_client_id   TEXT NOT NULL,
    sub_merchant_id     TEXT NOT NULL,
    provider            TEXT NOT NULL,
    status              TEXT NOT NULL DEFAULT 'PENDING',
    amount              INTEGER NOT NULL,
    pending_amount      INTEGER,
    settlement_amount   INTEGER,
    settlement_status   TEXT,
    settlement_time     TIMESTAMP,
    fee_platform        INTEGER,
    fee_provider        INTEGER,
    payment_received_time TIMESTAMP,
    trx_expiration_time TIMESTAMP,
    loaned_at           TIMESTAMP,
    provider_payment_id TEXT,
    provider_ref        TEXT,
    provider_payload    TEXT,
    metadata            TEXT NOT NULL DEFAULT '{}',
    created_at          TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at          TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS orders_range_idx ON orders (sub_merchant_id, created_at, id);
CREATE INDEX IF NOT EXISTS orders_status_idx ON orders (status);

CREATE TABLE IF NOT EXISTS loan_entries (
    order_id        TEXT PRIMARY KEY NOT NULL,
    sub_merchant_id TEXT NOT NULL,
    amount          INTEGER NOT NULL,
    metadata        TEXT NOT NULL DEFAULT '{}',
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS callback_jobs (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id          TEXT NOT NULL,
    partner_client_id TEXT NOT NULL,
    url               TEXT NOT NULL,
    payload           TEXT NOT NULL,
    signature         TEXT NOT NULL,
    attempts          INTEGER NOT NULL DEFAULT 0,
    delivered         BOOLEAN NOT NULL DEFAULT 0,
    last_error        TEXT,
    status_code       INTEGER,
    response_body     TEXT,
    created_at        TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at        TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS callback_jobs_order_idx ON callback_jobs (order_id);

CREATE TABLE IF NOT EXISTS callback_dead_letters (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id          TEXT NOT NULL,
    partner_client_id TEXT NOT NULL,
    url               TEXT NOT NULL,
    payload           TEXT NOT NULL,
    signature         TEXT NOT NULL,
    attempts          INTEGER NOT NULL,
    last_error        TEXT,
    status_code       INTEGER,
    response_body     TEXT,
    created_at        TIMESTAMP NOT NULL,
    dead_lettered_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS dead_letters_order_idx ON callback_dead_letters (order_id);

CREATE TABLE IF NOT EXISTS partner_clients (
    id              TEXT PRIMARY KEY NOT NULL,
    callback_url    TEXT,
    callback_secret TEXT
);
"#;
