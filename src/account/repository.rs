//! Account lookups

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use std::sync::atomic::{AtomicI64, Ordering};

use super::models::{Account, AccountRole};
use crate::core_types::OwnerId;
use crate::db::SafeRow;
use crate::store::StoreError;

/// Read access to owner accounts
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn get_account_by_id(&self, id: OwnerId) -> Result<Option<Account>, StoreError>;

    async fn get_account_by_login(&self, login: &str) -> Result<Option<Account>, StoreError>;
}

/// Accounts in `accounts_tb`
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an account, returning its id
    pub async fn create(&self, login: &str, role: AccountRole) -> Result<OwnerId, StoreError> {
        let row = sqlx::query(
            r#"INSERT INTO accounts_tb (login, role) VALUES ($1, $2) RETURNING account_id"#,
        )
        .bind(login)
        .bind(role as i16)
        .fetch_one(&self.pool)
        .await?;

        required(row.try_get_log("account_id"), "account_id")
    }
}

fn required<T>(value: Option<T>, column: &str) -> Result<T, StoreError> {
    value.ok_or_else(|| StoreError::Corrupt(format!("unreadable accounts_tb column {}", column)))
}

fn row_to_account(r: &PgRow) -> Result<Account, StoreError> {
    Ok(Account {
        account_id: required(r.try_get_log("account_id"), "account_id")?,
        login: required(r.try_get_log("login"), "login")?,
        role: AccountRole::from(required(r.try_get_log::<i16>("role"), "role")?),
        banned: required(r.try_get_log("banned"), "banned")?,
        created_at: required(r.try_get_log("created_at"), "created_at")?,
    })
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn get_account_by_id(&self, id: OwnerId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"SELECT account_id, login, role, banned, created_at
               FROM accounts_tb WHERE account_id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn get_account_by_login(&self, login: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"SELECT account_id, login, role, banned, created_at
               FROM accounts_tb WHERE login = $1"#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }
}

/// Accounts held in memory, for tests and embedded use
#[derive(Default)]
pub struct InMemoryAccountDirectory {
    accounts: DashMap<OwnerId, Account>,
    last_id: AtomicI64,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, login: &str, role: AccountRole) -> Account {
        let account = Account {
            account_id: self.last_id.fetch_add(1, Ordering::SeqCst) + 1,
            login: login.to_string(),
            role,
            banned: false,
            created_at: Utc::now(),
        };
        self.accounts.insert(account.account_id, account.clone());
        account
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn get_account_by_id(&self, id: OwnerId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&id).map(|a| a.value().clone()))
    }

    async fn get_account_by_login(&self, login: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .find(|a| a.login == login)
            .map(|a| a.value().clone()))
    }
}
