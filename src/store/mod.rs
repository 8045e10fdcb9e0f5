//! Card Store
//!
//! Pure storage boundary for card records. No business rules live here.
//!
//! # Locking
//!
//! Mutations run inside a [`CardTx`] obtained from [`CardStore::begin`]:
//!
//! ```text
//! begin ─▶ find_by_id_for_update (exclusive hold) ─▶ save/delete ─▶ commit
//!                                                              └──▶ rollback / drop
//! ```
//!
//! Holds are released on commit, rollback, or when the transaction is dropped.
//! Nothing staged in a dropped transaction is ever visible. Lock waits are
//! bounded by the backend's lock timeout and surface as
//! [`StoreError::LockTimeout`].

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::InMemoryCardStore;
pub use postgres::PgCardStore;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::card::{Card, CardStatus, NewCard};
use crate::core_types::{CardId, OwnerId};
use crate::vault::NumberDigest;

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Card not found: {0}")]
    NotFound(CardId),

    #[error("Card number digest already exists")]
    DuplicateDigest,

    #[error("Timed out waiting for card lock")]
    LockTimeout,

    #[error("Corrupt card row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => return StoreError::DuplicateDigest,
                // lock_not_available, deadlock_detected, serialization_failure
                Some("55P03") | Some("40P01") | Some("40001") => return StoreError::LockTimeout,
                _ => {}
            }
        }
        StoreError::Database(e.to_string())
    }
}

/// Zero-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

impl<T> Page<T> {
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            page: self.page,
            size: self.size,
        })
    }
}

/// Durable card storage
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Open a locking unit of work.
    async fn begin(&self) -> Result<Box<dyn CardTx>, StoreError>;

    /// Insert a new card. Fails with `DuplicateDigest` if the digest is taken.
    async fn insert(&self, card: NewCard) -> Result<Card, StoreError>;

    async fn find_by_id(&self, id: CardId) -> Result<Card, StoreError>;

    async fn find_by_digest(&self, digest: &NumberDigest) -> Result<Option<Card>, StoreError>;

    async fn exists_by_digest(&self, digest: &NumberDigest) -> Result<bool, StoreError>;

    /// All cards of an owner, ordered by id.
    async fn find_all_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Card>, StoreError>;

    async fn find_by_owner(
        &self,
        owner_id: OwnerId,
        status: Option<CardStatus>,
        page: PageRequest,
    ) -> Result<Page<Card>, StoreError>;

    async fn find_all(
        &self,
        status: Option<CardStatus>,
        page: PageRequest,
    ) -> Result<Page<Card>, StoreError>;
}

/// Unit of work holding exclusive card locks
#[async_trait]
pub trait CardTx: Send {
    /// Read a card and hold its exclusive lock until the transaction ends.
    async fn find_by_id_for_update(&mut self, id: CardId) -> Result<Card, StoreError>;

    /// Stage an update of a card locked by this transaction.
    async fn save(&mut self, card: &Card) -> Result<(), StoreError>;

    /// Stage removal of a card locked by this transaction.
    async fn delete(&mut self, id: CardId) -> Result<(), StoreError>;

    /// Apply all staged changes atomically and release every hold.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard all staged changes and release every hold.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
