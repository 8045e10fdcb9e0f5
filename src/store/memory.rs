//! In-process card store
//!
//! Row locks are per-card `tokio::sync::Mutex`es kept in a `DashMap`, acquired
//! with a bounded wait. Committed data sits behind a single `RwLock`; a
//! transaction stages its writes and applies them in one write-locked step, so
//! readers observe either none or all of a transaction's changes.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::{CardStore, CardTx, Page, PageRequest, StoreError};
use crate::card::{Card, CardStatus, NewCard};
use crate::core_types::{CardId, OwnerId};
use crate::vault::NumberDigest;

#[derive(Default)]
struct Tables {
    cards: BTreeMap<CardId, Card>,
    by_digest: FxHashMap<NumberDigest, CardId>,
    last_id: CardId,
}

struct Inner {
    tables: RwLock<Tables>,
    row_locks: DashMap<CardId, Arc<Mutex<()>>>,
    lock_timeout: Duration,
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, id: CardId) -> Arc<Mutex<()>> {
        self.row_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Drop the lock entry for `id` unless some transaction still holds or
    /// awaits it.
    fn release_row_lock(&self, id: CardId) {
        self.row_locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Card store kept entirely in memory
#[derive(Clone)]
pub struct InMemoryCardStore {
    inner: Arc<Inner>,
}

impl InMemoryCardStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                row_locks: DashMap::new(),
                lock_timeout,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn row_lock_count(&self) -> usize {
        self.inner.row_locks.len()
    }
}

impl Default for InMemoryCardStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

fn paginate(cards: Vec<Card>, page: PageRequest) -> Page<Card> {
    let total = cards.len() as u64;
    let items = cards
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.size as usize)
        .collect();
    Page {
        items,
        total,
        page: page.page,
        size: page.size,
    }
}

fn matches_status(card: &Card, status: Option<CardStatus>) -> bool {
    status.is_none_or(|s| card.status == s)
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn begin(&self) -> Result<Box<dyn CardTx>, StoreError> {
        Ok(Box::new(InMemoryTx {
            inner: Arc::clone(&self.inner),
            held: BTreeMap::new(),
            staged: BTreeMap::new(),
        }))
    }

    async fn insert(&self, card: NewCard) -> Result<Card, StoreError> {
        let mut tables = self.inner.write();
        if tables.by_digest.contains_key(&card.number_digest) {
            return Err(StoreError::DuplicateDigest);
        }

        tables.last_id += 1;
        let now = Utc::now();
        let stored = Card {
            id: tables.last_id,
            number_ciphertext: card.number_ciphertext,
            number_digest: card.number_digest,
            owner_id: card.owner_id,
            balance: card.balance,
            status: card.status,
            expiry_date: card.expiry_date,
            created_at: now,
            updated_at: now,
        };
        tables
            .by_digest
            .insert(stored.number_digest.clone(), stored.id);
        tables.cards.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: CardId) -> Result<Card, StoreError> {
        self.inner
            .read()
            .cards
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn find_by_digest(&self, digest: &NumberDigest) -> Result<Option<Card>, StoreError> {
        let tables = self.inner.read();
        Ok(tables
            .by_digest
            .get(digest)
            .and_then(|id| tables.cards.get(id))
            .cloned())
    }

    async fn exists_by_digest(&self, digest: &NumberDigest) -> Result<bool, StoreError> {
        Ok(self.inner.read().by_digest.contains_key(digest))
    }

    async fn find_all_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Card>, StoreError> {
        Ok(self
            .inner
            .read()
            .cards
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn find_by_owner(
        &self,
        owner_id: OwnerId,
        status: Option<CardStatus>,
        page: PageRequest,
    ) -> Result<Page<Card>, StoreError> {
        let cards = self
            .inner
            .read()
            .cards
            .values()
            .filter(|c| c.owner_id == owner_id && matches_status(c, status))
            .cloned()
            .collect();
        Ok(paginate(cards, page))
    }

    async fn find_all(
        &self,
        status: Option<CardStatus>,
        page: PageRequest,
    ) -> Result<Page<Card>, StoreError> {
        let cards = self
            .inner
            .read()
            .cards
            .values()
            .filter(|c| matches_status(c, status))
            .cloned()
            .collect();
        Ok(paginate(cards, page))
    }
}

enum Staged {
    Save(Card),
    Delete,
}

struct InMemoryTx {
    inner: Arc<Inner>,
    held: BTreeMap<CardId, OwnedMutexGuard<()>>,
    staged: BTreeMap<CardId, Staged>,
}

impl InMemoryTx {
    fn ensure_held(&self, id: CardId) -> Result<(), StoreError> {
        if self.held.contains_key(&id) {
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
impl CardTx for InMemoryTx {
    async fn find_by_id_for_update(&mut self, id: CardId) -> Result<Card, StoreError> {
        if !self.held.contains_key(&id) {
            if !self.inner.read().cards.contains_key(&id) {
                return Err(StoreError::NotFound(id));
            }

            let lock = self.inner.row_lock(id);
            let guard = tokio::time::timeout(self.inner.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    warn!(card_id = id, "Timed out waiting for card lock");
                    StoreError::LockTimeout
                })?;

            // deleted while we waited
            if !self.inner.read().cards.contains_key(&id) {
                drop(guard);
                self.inner.release_row_lock(id);
                return Err(StoreError::NotFound(id));
            }
            debug!(card_id = id, "Card lock acquired");
            self.held.insert(id, guard);
        }

        match self.staged.get(&id) {
            Some(Staged::Save(card)) => Ok(card.clone()),
            Some(Staged::Delete) => Err(StoreError::NotFound(id)),
            None => self
                .inner
                .read()
                .cards
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound(id)),
        }
    }

    async fn save(&mut self, card: &Card) -> Result<(), StoreError> {
        self.ensure_held(card.id)?;
        if matches!(self.staged.get(&card.id), Some(Staged::Delete)) {
            return Err(StoreError::NotFound(card.id));
        }
        self.staged.insert(card.id, Staged::Save(card.clone()));
        Ok(())
    }

    async fn delete(&mut self, id: CardId) -> Result<(), StoreError> {
        self.ensure_held(id)?;
        self.staged.insert(id, Staged::Delete);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx {
            inner,
            held,
            staged,
        } = *self;

        {
            let mut tables = inner.write();
            let now = Utc::now();
            for (id, change) in staged {
                match change {
                    Staged::Save(mut card) => {
                        let Some(current) = tables.cards.get(&id) else {
                            return Err(StoreError::NotFound(id));
                        };
                        // identity columns are immutable
                        card.number_ciphertext = current.number_ciphertext.clone();
                        card.number_digest = current.number_digest.clone();
                        card.owner_id = current.owner_id;
                        card.created_at = current.created_at;
                        card.updated_at = now;
                        tables.cards.insert(id, card);
                    }
                    Staged::Delete => {
                        if let Some(removed) = tables.cards.remove(&id) {
                            tables.by_digest.remove(&removed.number_digest);
                        }
                        inner.row_locks.remove(&id);
                    }
                }
            }
        }

        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
