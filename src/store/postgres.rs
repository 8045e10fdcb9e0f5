//! PostgreSQL card store
//!
//! Row locks are `SELECT ... FOR UPDATE` inside a sqlx transaction with
//! `SET LOCAL lock_timeout`, so a blocked waiter fails with SQLSTATE 55P03
//! instead of hanging. Dropping an uncommitted [`PgCardTx`] rolls it back.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::{CardStore, CardTx, Page, PageRequest, StoreError};
use crate::card::{Card, CardStatus, NewCard};
use crate::core_types::{CardId, OwnerId};
use crate::db::SafeRow;
use crate::vault::NumberDigest;

const CARD_COLUMNS: &str = "card_id, number_ciphertext, number_digest, owner_id, balance, \
                            status, expiry_date, created_at, updated_at";

pub struct PgCardStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgCardStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

fn required<T>(value: Option<T>, column: &str) -> Result<T, StoreError> {
    value.ok_or_else(|| StoreError::Corrupt(format!("unreadable column {}", column)))
}

fn row_to_card(row: &PgRow) -> Result<Card, StoreError> {
    let status_id: i16 = required(row.try_get_log("status"), "status")?;
    let status = CardStatus::from_id(status_id)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid card status: {}", status_id)))?;

    let digest_hex: String = required(row.try_get_log("number_digest"), "number_digest")?;
    let number_digest = NumberDigest::from_hex(digest_hex.trim())
        .ok_or_else(|| StoreError::Corrupt("malformed number_digest".to_string()))?;

    Ok(Card {
        id: required(row.try_get_log("card_id"), "card_id")?,
        number_ciphertext: required(row.try_get_log("number_ciphertext"), "number_ciphertext")?,
        number_digest,
        owner_id: required(row.try_get_log("owner_id"), "owner_id")?,
        balance: required(row.try_get_log::<Decimal>("balance"), "balance")?,
        status,
        expiry_date: required(row.try_get_log("expiry_date"), "expiry_date")?,
        created_at: required(row.try_get_log("created_at"), "created_at")?,
        updated_at: required(row.try_get_log("updated_at"), "updated_at")?,
    })
}

fn rows_to_cards(rows: &[PgRow]) -> Result<Vec<Card>, StoreError> {
    rows.iter().map(row_to_card).collect()
}

#[async_trait]
impl CardStore for PgCardStore {
    async fn begin(&self) -> Result<Box<dyn CardTx>, StoreError> {
        let mut tx = self.pool.begin().await?;
        // SET does not accept bind parameters
        let set_timeout = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&set_timeout).execute(&mut *tx).await?;

        Ok(Box::new(PgCardTx {
            tx,
            locked: HashSet::new(),
        }))
    }

    async fn insert(&self, card: NewCard) -> Result<Card, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO cards_tb
                (number_ciphertext, number_digest, owner_id, balance, status, expiry_date, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING {}
            "#,
            CARD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&card.number_ciphertext)
            .bind(card.number_digest.as_str())
            .bind(card.owner_id)
            .bind(card.balance)
            .bind(card.status.id())
            .bind(card.expiry_date)
            .fetch_one(&self.pool)
            .await?;

        row_to_card(&row)
    }

    async fn find_by_id(&self, id: CardId) -> Result<Card, StoreError> {
        let sql = format!("SELECT {} FROM cards_tb WHERE card_id = $1", CARD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_card(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn find_by_digest(&self, digest: &NumberDigest) -> Result<Option<Card>, StoreError> {
        let sql = format!(
            "SELECT {} FROM cards_tb WHERE number_digest = $1",
            CARD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(digest.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_card).transpose()
    }

    async fn exists_by_digest(&self, digest: &NumberDigest) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM cards_tb WHERE number_digest = $1)",
        )
        .bind(digest.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn find_all_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Card>, StoreError> {
        let sql = format!(
            "SELECT {} FROM cards_tb WHERE owner_id = $1 ORDER BY card_id",
            CARD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        rows_to_cards(&rows)
    }

    async fn find_by_owner(
        &self,
        owner_id: OwnerId,
        status: Option<CardStatus>,
        page: PageRequest,
    ) -> Result<Page<Card>, StoreError> {
        let status_id = status.map(|s| s.id());

        let total = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM cards_tb
               WHERE owner_id = $1 AND ($2::SMALLINT IS NULL OR status = $2)"#,
        )
        .bind(owner_id)
        .bind(status_id)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"SELECT {} FROM cards_tb
               WHERE owner_id = $1 AND ($2::SMALLINT IS NULL OR status = $2)
               ORDER BY card_id LIMIT $3 OFFSET $4"#,
            CARD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .bind(status_id)
            .bind(page.size as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items: rows_to_cards(&rows)?,
            total: total as u64,
            page: page.page,
            size: page.size,
        })
    }

    async fn find_all(
        &self,
        status: Option<CardStatus>,
        page: PageRequest,
    ) -> Result<Page<Card>, StoreError> {
        let status_id = status.map(|s| s.id());

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM cards_tb WHERE ($1::SMALLINT IS NULL OR status = $1)",
        )
        .bind(status_id)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"SELECT {} FROM cards_tb
               WHERE ($1::SMALLINT IS NULL OR status = $1)
               ORDER BY card_id LIMIT $2 OFFSET $3"#,
            CARD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status_id)
            .bind(page.size as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items: rows_to_cards(&rows)?,
            total: total as u64,
            page: page.page,
            size: page.size,
        })
    }
}

/// Transaction holding `FOR UPDATE` row locks
pub struct PgCardTx {
    tx: Transaction<'static, Postgres>,
    locked: HashSet<CardId>,
}

impl PgCardTx {
    fn ensure_locked(&self, id: CardId) -> Result<(), StoreError> {
        if self.locked.contains(&id) {
            Ok(())
        } else {
            Err(StoreError::Database(format!(
                "card {} is not locked by this transaction",
                id
            )))
        }
    }
}

#[async_trait]
impl CardTx for PgCardTx {
    async fn find_by_id_for_update(&mut self, id: CardId) -> Result<Card, StoreError> {
        let sql = format!(
            "SELECT {} FROM cards_tb WHERE card_id = $1 FOR UPDATE",
            CARD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => {
                let card = row_to_card(&row)?;
                debug!(card_id = id, "Card row locked");
                self.locked.insert(id);
                Ok(card)
            }
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn save(&mut self, card: &Card) -> Result<(), StoreError> {
        self.ensure_locked(card.id)?;
        let result = sqlx::query(
            r#"
            UPDATE cards_tb
            SET balance = $1, status = $2, expiry_date = $3, updated_at = NOW()
            WHERE card_id = $4
            "#,
        )
        .bind(card.balance)
        .bind(card.status.id())
        .bind(card.expiry_date)
        .bind(card.id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(card.id));
        }
        Ok(())
    }

    async fn delete(&mut self, id: CardId) -> Result<(), StoreError> {
        self.ensure_locked(id)?;
        let result = sqlx::query("DELETE FROM cards_tb WHERE card_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
