use anyhow::{Context, Result};
use sqlx::PgPool;

/// Create the ledger tables if they do not exist yet
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing card ledger schema...");

    sqlx::query(CREATE_ACCOUNTS_TABLE)
        .execute(pool)
        .await
        .context("Failed to create accounts_tb")?;

    sqlx::query(CREATE_CARDS_TABLE)
        .execute(pool)
        .await
        .context("Failed to create cards_tb")?;

    sqlx::query(CREATE_CARDS_OWNER_INDEX)
        .execute(pool)
        .await
        .context("Failed to create cards_tb owner index")?;

    tracing::info!("Card ledger schema initialized successfully");
    Ok(())
}

/// Owner accounts. Maintained by the account service; the ledger only reads it.
pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts_tb (
    account_id  BIGSERIAL PRIMARY KEY,
    login       VARCHAR(50) NOT NULL UNIQUE,
    role        SMALLINT NOT NULL DEFAULT 1,
    banned      BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// status: 1=ACTIVE, 2=BLOCKED, 3=EXPIRED
pub const CREATE_CARDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cards_tb (
    card_id            BIGSERIAL PRIMARY KEY,
    number_ciphertext  TEXT NOT NULL,
    number_digest      CHAR(64) NOT NULL,
    owner_id           BIGINT NOT NULL REFERENCES accounts_tb(account_id) ON DELETE CASCADE,
    balance            NUMERIC(19, 2) NOT NULL CHECK (balance >= 0),
    status             SMALLINT NOT NULL,
    expiry_date        DATE NOT NULL,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT cards_tb_number_digest_key UNIQUE (number_digest)
)
"#;

pub const CREATE_CARDS_OWNER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_cards_tb_owner_status ON cards_tb (owner_id, status)
"#;
