//! Integration Tests for the Card Ledger
//!
//! Run the ledger end to end against the in-memory store and account
//! directory, no database needed.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::rngs::mock::StepRng;
use rand::{RngCore, SeedableRng};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::{CardLedger, ErrorKind, LedgerError};
use crate::account::{AccountRole, InMemoryAccountDirectory};
use crate::card::{Card, CardStatus, NewCard};
use crate::config::CardNumberConfig;
use crate::core_types::{CardId, OwnerId};
use crate::store::{CardStore, CardTx, InMemoryCardStore, Page, PageRequest, StoreError};
use crate::vault::NumberDigest;
use crate::vault::{IdentifierGenerator, IdentifierVault, RawCardNumber, test_vault};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn next_year() -> NaiveDate {
    Utc::now().date_naive() + ChronoDuration::days(365)
}

/// Ledger wired to in-memory collaborators, with handles to inspect them
struct TestHarness {
    ledger: Arc<CardLedger>,
    store: InMemoryCardStore,
    accounts: Arc<InMemoryAccountDirectory>,
    vault: Arc<IdentifierVault>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_rng(Box::new(StdRng::seed_from_u64(7)))
    }

    fn with_rng(rng: Box<dyn RngCore + Send>) -> Self {
        let store = InMemoryCardStore::new(Duration::from_secs(5));
        let accounts = Arc::new(InMemoryAccountDirectory::new());
        let vault = Arc::new(test_vault());
        let generator = Arc::new(
            IdentifierGenerator::new(&CardNumberConfig::default(), rng)
                .expect("default config is valid"),
        );
        let ledger = Arc::new(CardLedger::new(
            Arc::new(store.clone()),
            accounts.clone(),
            vault.clone(),
            generator,
        ));

        Self {
            ledger,
            store,
            accounts,
            vault,
        }
    }

    fn owner(&self, login: &str) -> OwnerId {
        self.accounts.add(login, AccountRole::User).account_id
    }

    async fn card(&self, owner: OwnerId, balance: &str) -> CardId {
        self.ledger
            .create_card(owner, next_year(), Some(dec(balance)))
            .await
            .expect("create card")
            .id
    }

    /// Insert a card with a chosen raw number, bypassing the generator
    async fn card_with_number(&self, owner: OwnerId, number: &str) -> Card {
        let raw = RawCardNumber::new(number.to_string());
        self.store
            .insert(NewCard {
                number_ciphertext: self.vault.encode(&raw).unwrap(),
                number_digest: self.vault.digest(&raw),
                owner_id: owner,
                balance: Decimal::ZERO,
                status: CardStatus::Active,
                expiry_date: next_year(),
            })
            .await
            .unwrap()
    }

    async fn edit(&self, id: CardId, f: impl FnOnce(&mut Card)) {
        let mut tx = self.store.begin().await.unwrap();
        let mut card = tx.find_by_id_for_update(id).await.unwrap();
        f(&mut card);
        tx.save(&card).await.unwrap();
        tx.commit().await.unwrap();
    }

    async fn stored(&self, id: CardId) -> Card {
        self.store.find_by_id(id).await.unwrap()
    }
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_create_card_is_active_and_masked() {
    let h = TestHarness::new();
    let alice = h.owner("alice");

    let view = h
        .ledger
        .create_card(alice, next_year(), Some(dec("25.50")))
        .await
        .unwrap();

    assert_eq!(view.status, CardStatus::Active);
    assert_eq!(view.balance, dec("25.50"));
    assert_eq!(view.owner_id, alice);

    let stored = h.stored(view.id).await;
    let raw = h.vault.decode(&stored.number_ciphertext).unwrap();
    assert_eq!(raw.expose().len(), 16);
    assert!(raw.expose().starts_with("400000"));
    assert_eq!(
        view.masked_number,
        format!("**** **** **** {}", &raw.expose()[12..])
    );
    assert!(!stored.number_ciphertext.contains(raw.expose()));
}

#[tokio::test]
async fn test_create_card_defaults_balance_to_zero() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let view = h.ledger.create_card(alice, next_year(), None).await.unwrap();
    assert_eq!(view.balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_create_card_unknown_owner() {
    let h = TestHarness::new();
    let err = h.ledger.create_card(42, next_year(), None).await.unwrap_err();
    assert_eq!(err, LedgerError::OwnerNotFound(42));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_create_card_rejects_bad_input() {
    let h = TestHarness::new();
    let alice = h.owner("alice");

    let past = Utc::now().date_naive() - ChronoDuration::days(1);
    let err = h.ledger.create_card(alice, past, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = h
        .ledger
        .create_card(alice, next_year(), Some(dec("-1")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = h
        .ledger
        .create_card(alice, next_year(), Some(dec("1.001")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_created_cards_have_distinct_digests() {
    let h = TestHarness::new();
    let alice = h.owner("alice");

    let mut digests = std::collections::HashSet::new();
    for _ in 0..50 {
        let id = h.card(alice, "0").await;
        assert!(digests.insert(h.stored(id).await.number_digest));
    }
    assert_eq!(h.store.len(), 50);
}

/// Scenario 5: a generator that always draws the same number collides with
/// the first card forever.
#[tokio::test]
async fn test_generation_exhausted_persists_nothing() {
    let h = TestHarness::with_rng(Box::new(StepRng::new(0, 0)));
    let alice = h.owner("alice");

    h.card(alice, "0").await;
    assert_eq!(h.store.len(), 1);

    let err = h
        .ledger
        .create_card(alice, next_year(), None)
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::GenerationExhausted { attempts: 10 });
    assert!(err.is_operational());
    assert_eq!(err.client_message(), "Internal server error");
    assert_eq!(h.store.len(), 1);
}

/// Store whose first `lost` inserts fail as if a concurrent insert had
/// taken the digest first
struct RacingStore {
    inner: InMemoryCardStore,
    lost: AtomicU32,
    inserts: AtomicU32,
    lookups: AtomicU32,
}

impl RacingStore {
    fn new(lost: u32) -> Self {
        Self {
            inner: InMemoryCardStore::default(),
            lost: AtomicU32::new(lost),
            inserts: AtomicU32::new(0),
            lookups: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CardStore for RacingStore {
    async fn begin(&self) -> Result<Box<dyn CardTx>, StoreError> {
        self.inner.begin().await
    }

    async fn insert(&self, card: NewCard) -> Result<Card, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let lose = self
            .lost
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lose {
            return Err(StoreError::DuplicateDigest);
        }
        self.inner.insert(card).await
    }

    async fn find_by_id(&self, id: CardId) -> Result<Card, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_digest(&self, digest: &NumberDigest) -> Result<Option<Card>, StoreError> {
        self.inner.find_by_digest(digest).await
    }

    async fn exists_by_digest(&self, digest: &NumberDigest) -> Result<bool, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.exists_by_digest(digest).await
    }

    async fn find_all_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Card>, StoreError> {
        self.inner.find_all_by_owner(owner_id).await
    }

    async fn find_by_owner(
        &self,
        owner_id: OwnerId,
        status: Option<CardStatus>,
        page: PageRequest,
    ) -> Result<Page<Card>, StoreError> {
        self.inner.find_by_owner(owner_id, status, page).await
    }

    async fn find_all(
        &self,
        status: Option<CardStatus>,
        page: PageRequest,
    ) -> Result<Page<Card>, StoreError> {
        self.inner.find_all(status, page).await
    }
}

fn racing_ledger(lost: u32) -> (CardLedger, Arc<RacingStore>, OwnerId) {
    let store = Arc::new(RacingStore::new(lost));
    let accounts = Arc::new(InMemoryAccountDirectory::new());
    let owner = accounts.add("alice", AccountRole::User).account_id;
    let generator =
        IdentifierGenerator::new(&CardNumberConfig::default(), Box::new(StdRng::seed_from_u64(11)))
            .unwrap();
    let ledger = CardLedger::new(
        store.clone(),
        accounts,
        Arc::new(test_vault()),
        Arc::new(generator),
    );
    (ledger, store, owner)
}

#[tokio::test]
async fn test_create_card_regenerates_after_lost_insert_races() {
    let (ledger, store, owner) = racing_ledger(3);

    let view = ledger.create_card(owner, next_year(), None).await.unwrap();

    assert_eq!(store.inserts.load(Ordering::SeqCst), 4);
    assert_eq!(store.lookups.load(Ordering::SeqCst), 4);
    assert_eq!(store.inner.len(), 1);
    assert_eq!(store.inner.find_by_id(view.id).await.unwrap().owner_id, owner);
}

#[tokio::test]
async fn test_create_card_gives_up_when_every_insert_loses() {
    let (ledger, store, owner) = racing_ledger(u32::MAX);

    let err = ledger.create_card(owner, next_year(), None).await.unwrap_err();

    assert_eq!(err, LedgerError::GenerationExhausted { attempts: 10 });
    // lost races and oracle draws share one budget
    assert_eq!(store.inserts.load(Ordering::SeqCst), 10);
    assert_eq!(store.lookups.load(Ordering::SeqCst), 10);
    assert!(store.inner.is_empty());
}

// ============================================================================
// State machine
// ============================================================================

#[tokio::test]
async fn test_block_then_activate() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let card = h.card(alice, "0").await;

    let view = h.ledger.block(card).await.unwrap();
    assert_eq!(view.status, CardStatus::Blocked);
    assert!(view.masked_number.starts_with("**** **** **** "));

    let view = h.ledger.activate(card).await.unwrap();
    assert_eq!(view.status, CardStatus::Active);
}

#[tokio::test]
async fn test_noop_transitions_conflict() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let card = h.card(alice, "0").await;

    let err = h.ledger.activate(card).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    h.ledger.block(card).await.unwrap();
    let err = h.ledger.block(card).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.stored(card).await.status, CardStatus::Blocked);
}

/// Scenario 4
#[tokio::test]
async fn test_activate_expired_card_is_invalid() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let card = h.card(alice, "0").await;
    h.edit(card, |c| c.status = CardStatus::Expired).await;

    let err = h.ledger.activate(card).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(err.http_status(), 400);
    assert_eq!(h.stored(card).await.status, CardStatus::Expired);
}

#[tokio::test]
async fn test_activate_blocked_card_past_expiry_is_invalid() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let card = h.card(alice, "0").await;
    h.edit(card, |c| {
        c.status = CardStatus::Blocked;
        c.expiry_date = Utc::now().date_naive() - ChronoDuration::days(1);
    })
    .await;

    let err = h.ledger.activate(card).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(h.stored(card).await.status, CardStatus::Blocked);
}

#[tokio::test]
async fn test_block_expired_card_is_invalid() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let card = h.card(alice, "0").await;
    h.edit(card, |c| c.status = CardStatus::Expired).await;

    let err = h.ledger.block(card).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[tokio::test]
async fn test_transitions_on_missing_card() {
    let h = TestHarness::new();
    assert_eq!(
        h.ledger.activate(77).await.unwrap_err(),
        LedgerError::CardNotFound(77)
    );
    assert_eq!(
        h.ledger.block(77).await.unwrap_err(),
        LedgerError::CardNotFound(77)
    );
    assert_eq!(
        h.ledger.delete_card(77).await.unwrap_err(),
        LedgerError::CardNotFound(77)
    );
}

#[tokio::test]
async fn test_request_block_by_owner() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let bob = h.owner("bob");
    let card = h.card(alice, "0").await;

    let err = h.ledger.request_block(card, bob).await.unwrap_err();
    assert_eq!(err, LedgerError::Forbidden);
    assert_eq!(h.stored(card).await.status, CardStatus::Active);

    let view = h.ledger.request_block(card, alice).await.unwrap();
    assert_eq!(view.status, CardStatus::Blocked);

    let err = h.ledger.request_block(card, alice).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[tokio::test]
async fn test_delete_card() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let card = h.card(alice, "10").await;

    h.ledger.delete_card(card).await.unwrap();
    assert!(h.store.is_empty());
    assert_eq!(
        h.ledger.get_balance(card, alice).await.unwrap_err(),
        LedgerError::CardNotFound(card)
    );
}

// ============================================================================
// Balances and transfers
// ============================================================================

#[tokio::test]
async fn test_get_balance_checks_owner() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let bob = h.owner("bob");
    let card = h.card(alice, "12.34").await;

    assert_eq!(h.ledger.get_balance(card, alice).await.unwrap(), dec("12.34"));
    assert_eq!(
        h.ledger.get_balance(card, bob).await.unwrap_err(),
        LedgerError::Forbidden
    );
}

/// Scenario 1
#[tokio::test]
async fn test_transfer_moves_funds() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let a = h.card(alice, "1000").await;
    let b = h.card(alice, "500").await;

    let receipt = h.ledger.transfer(a, b, dec("300"), alice).await.unwrap();
    assert_eq!(receipt.from_balance, dec("700"));
    assert_eq!(receipt.to_balance, dec("800"));

    assert_eq!(h.stored(a).await.balance, dec("700"));
    assert_eq!(h.stored(b).await.balance, dec("800"));
}

#[tokio::test]
async fn test_transfer_from_higher_to_lower_id() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let a = h.card(alice, "10").await;
    let b = h.card(alice, "10").await;
    assert!(a < b);

    h.ledger.transfer(b, a, dec("2.50"), alice).await.unwrap();
    assert_eq!(h.stored(a).await.balance, dec("12.50"));
    assert_eq!(h.stored(b).await.balance, dec("7.50"));
}

/// Scenario 2
#[tokio::test]
async fn test_transfer_insufficient_funds_changes_nothing() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let a = h.card(alice, "100").await;
    let b = h.card(alice, "500").await;

    let err = h.ledger.transfer(a, b, dec("300"), alice).await.unwrap_err();
    assert_eq!(err, LedgerError::InsufficientFunds);
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    assert_eq!(h.stored(a).await.balance, dec("100"));
    assert_eq!(h.stored(b).await.balance, dec("500"));

    // the whole balance can still move
    h.ledger.transfer(a, b, dec("100"), alice).await.unwrap();
    assert_eq!(h.stored(a).await.balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_transfer_rejects_bad_amounts() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let a = h.card(alice, "100").await;
    let b = h.card(alice, "0").await;

    for amount in ["0", "-5", "0.001"] {
        let err = h.ledger.transfer(a, b, dec(amount), alice).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "amount {}", amount);
    }
    assert_eq!(
        h.ledger.transfer(a, a, dec("1"), alice).await.unwrap_err(),
        LedgerError::SameCard
    );
    assert_eq!(h.stored(a).await.balance, dec("100"));
}

#[tokio::test]
async fn test_transfer_requires_ownership_of_both_cards() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let bob = h.owner("bob");
    let a = h.card(alice, "100").await;
    let b = h.card(bob, "100").await;

    assert_eq!(
        h.ledger.transfer(a, b, dec("10"), alice).await.unwrap_err(),
        LedgerError::Forbidden
    );
    assert_eq!(
        h.ledger.transfer(a, b, dec("10"), bob).await.unwrap_err(),
        LedgerError::Forbidden
    );
    assert_eq!(h.stored(a).await.balance, dec("100"));
    assert_eq!(h.stored(b).await.balance, dec("100"));
}

#[tokio::test]
async fn test_transfer_requires_active_cards() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let a = h.card(alice, "100").await;
    let b = h.card(alice, "100").await;
    h.ledger.block(b).await.unwrap();

    assert_eq!(
        h.ledger.transfer(a, b, dec("10"), alice).await.unwrap_err(),
        LedgerError::CardNotActive(b)
    );
    assert_eq!(h.stored(a).await.balance, dec("100"));
}

#[tokio::test]
async fn test_transfer_missing_card() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let a = h.card(alice, "100").await;

    assert_eq!(
        h.ledger.transfer(a, 999, dec("10"), alice).await.unwrap_err(),
        LedgerError::CardNotFound(999)
    );
    assert_eq!(h.stored(a).await.balance, dec("100"));
}

/// Scenario 3
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_transfers_both_commit() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let a = h.card(alice, "100").await;
    let b = h.card(alice, "100").await;

    let l1 = h.ledger.clone();
    let l2 = h.ledger.clone();
    let t1 = tokio::spawn(async move { l1.transfer(a, b, dec("50"), alice).await });
    let t2 = tokio::spawn(async move { l2.transfer(b, a, dec("20"), alice).await });

    t1.await.unwrap().unwrap();
    t2.await.unwrap().unwrap();

    assert_eq!(h.stored(a).await.balance, dec("70"));
    assert_eq!(h.stored(b).await.balance, dec("130"));
}

#[tokio::test]
async fn test_transfer_lock_timeout_is_transient() {
    let store = InMemoryCardStore::new(Duration::from_millis(50));
    let accounts = Arc::new(InMemoryAccountDirectory::new());
    let alice = accounts.add("alice", AccountRole::User).account_id;
    let ledger = CardLedger::new(
        Arc::new(store.clone()),
        accounts,
        Arc::new(test_vault()),
        Arc::new(IdentifierGenerator::from_entropy(&CardNumberConfig::default()).unwrap()),
    );
    let a = ledger
        .create_card(alice, next_year(), Some(dec("10")))
        .await
        .unwrap()
        .id;
    let b = ledger.create_card(alice, next_year(), None).await.unwrap().id;

    let mut holder = store.begin().await.unwrap();
    holder.find_by_id_for_update(b).await.unwrap();

    let err = ledger.transfer(a, b, dec("1"), alice).await.unwrap_err();
    assert_eq!(err, LedgerError::TransientConflict);
    assert_eq!(err.http_status(), 503);

    holder.rollback().await.unwrap();
    ledger.transfer(a, b, dec("1"), alice).await.unwrap();
}

// ============================================================================
// Queries
// ============================================================================

/// Scenario 6
#[tokio::test]
async fn test_search_by_last_digits() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let bob = h.owner("bob");
    h.card_with_number(alice, "4000001111115678").await;
    let hit = h.card_with_number(alice, "4000002222221234").await;
    h.card_with_number(alice, "4000001234003333").await;
    h.card_with_number(bob, "4000009999991234").await;

    let found = h.ledger.search_by_last_digits(alice, "1234").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, hit.id);
    assert_eq!(found[0].masked_number, "**** **** **** 1234");

    assert!(
        h.ledger
            .search_by_last_digits(alice, "0000")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_search_rejects_malformed_digits() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    for digits in ["123", "12345", "12a4", ""] {
        let err = h
            .ledger
            .search_by_last_digits(alice, digits)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "digits {:?}", digits);
    }
}

#[tokio::test]
async fn test_search_surfaces_corrupt_ciphertext() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let card = h.card_with_number(alice, "4000001111111234").await;

    // a card written under a different key cannot be decoded by this ledger
    let foreign = IdentifierVault::new(&[0x07u8; 32], b"other");
    let raw = RawCardNumber::new("4000003333331234".to_string());
    let bad = h
        .store
        .insert(NewCard {
            number_ciphertext: foreign.encode(&raw).unwrap(),
            number_digest: foreign.digest(&raw),
            owner_id: alice,
            balance: Decimal::ZERO,
            status: CardStatus::Active,
            expiry_date: next_year(),
        })
        .await
        .unwrap();
    assert_ne!(card.id, bad.id);

    let err = h
        .ledger
        .search_by_last_digits(alice, "1234")
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::DecodeError(bad.id));
    assert_eq!(err.client_message(), "Internal server error");
}

#[tokio::test]
async fn test_list_by_owner_and_all() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let bob = h.owner("bob");
    let a1 = h.card(alice, "1").await;
    h.card(alice, "2").await;
    h.card(bob, "3").await;
    h.ledger.block(a1).await.unwrap();

    let page = h
        .ledger
        .list_by_owner(alice, None, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert!(page.items.iter().all(|v| v.owner_id == alice));
    assert!(page.items.iter().all(|v| v.masked_number.len() == 19));

    let blocked = h
        .ledger
        .list_by_owner(alice, Some(CardStatus::Blocked), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(blocked.total, 1);
    assert_eq!(blocked.items[0].id, a1);

    let all = h
        .ledger
        .list_all(None, PageRequest::new(0, 2))
        .await
        .unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.items.len(), 2);

    let active = h
        .ledger
        .list_all(Some(CardStatus::Active), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(active.total, 2);

    assert_eq!(
        h.ledger
            .list_by_owner(99, None, PageRequest::default())
            .await
            .unwrap_err(),
        LedgerError::OwnerNotFound(99)
    );
}

#[tokio::test]
async fn test_resolve_owner() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    assert_eq!(h.ledger.resolve_owner("alice").await.unwrap(), alice);
    assert_eq!(
        h.ledger.resolve_owner("mallory").await.unwrap_err(),
        LedgerError::AccountNotFound("mallory".into())
    );
}

#[tokio::test]
async fn test_views_never_expose_secrets() {
    let h = TestHarness::new();
    let alice = h.owner("alice");
    let card = h.card_with_number(alice, "4000005555554321").await;

    let page = h
        .ledger
        .list_by_owner(alice, None, PageRequest::default())
        .await
        .unwrap();
    let json = serde_json::to_string(&page).unwrap();
    assert!(json.contains("**** **** **** 4321"));
    assert!(!json.contains("4000005555554321"));
    assert!(!json.contains(card.number_digest.as_str()));
    assert!(!json.contains(&card.number_ciphertext));
}
