//! Database connection management

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Ledger schema. Every statement is idempotent so it can run on each start.
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS accounts (
        id          BIGSERIAL PRIMARY KEY,
        owner       VARCHAR NOT NULL,
        balance     BIGINT NOT NULL,
        currency    VARCHAR NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS entries (
        id          BIGSERIAL PRIMARY KEY,
        account_id  BIGINT NOT NULL REFERENCES accounts (id),
        amount      BIGINT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS transfers (
        id               BIGSERIAL PRIMARY KEY,
        from_account_id  BIGINT NOT NULL REFERENCES accounts (id),
        to_account_id    BIGINT NOT NULL REFERENCES accounts (id),
        amount           BIGINT NOT NULL CHECK (amount > 0),
        created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_accounts_owner ON accounts (owner)",
    "CREATE INDEX IF NOT EXISTS idx_entries_account_id ON entries (account_id)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_from ON transfers (from_account_id)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_to ON transfers (to_account_id)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_from_to ON transfers (from_account_id, to_account_id)",
];

/// PostgreSQL database connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create ledger tables and indexes if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        tracing::info!("Ledger schema ready");
        Ok(())
    }
}
