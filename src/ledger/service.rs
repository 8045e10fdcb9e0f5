//! Card Ledger orchestrator
//!
//! Composes the store, the account directory, the vault and the number
//! generator into the ledger operations. Every mutation of an existing card
//! runs inside one store transaction: lock, re-read, validate, write, commit.
//! Any early return drops the transaction, which rolls it back and releases
//! its locks.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::LedgerError;
use crate::account::AccountDirectory;
use crate::card::{Card, CardEvent, CardStatus, CardView, NewCard, TransitionError};
use crate::core_types::{CardId, OwnerId};
use crate::money;
use crate::store::{CardStore, Page, PageRequest, StoreError};
use crate::vault::generator::GenerationError;
use crate::vault::{IdentifierGenerator, IdentifierVault};

/// Length of the suffix accepted by [`CardLedger::search_by_last_digits`]
pub const SEARCH_SUFFIX_LENGTH: usize = 4;

/// Outcome of a committed transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub from_card_id: CardId,
    pub to_card_id: CardId,
    pub amount: Decimal,
    pub from_balance: Decimal,
    pub to_balance: Decimal,
}

pub struct CardLedger {
    store: Arc<dyn CardStore>,
    accounts: Arc<dyn AccountDirectory>,
    vault: Arc<IdentifierVault>,
    generator: Arc<IdentifierGenerator>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

impl CardLedger {
    pub fn new(
        store: Arc<dyn CardStore>,
        accounts: Arc<dyn AccountDirectory>,
        vault: Arc<IdentifierVault>,
        generator: Arc<IdentifierGenerator>,
    ) -> Self {
        Self {
            store,
            accounts,
            vault,
            generator,
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Issue a new ACTIVE card for `owner_id`.
    ///
    /// A digest reported free by the generator can still be taken by a
    /// concurrent insert. Oracle draws and lost insert races spend one shared
    /// budget of `max_attempts` draws.
    pub async fn create_card(
        &self,
        owner_id: OwnerId,
        expiry_date: NaiveDate,
        initial_balance: Option<Decimal>,
    ) -> Result<CardView, LedgerError> {
        let balance = money::validate_initial_balance(initial_balance)?;
        if expiry_date < today() {
            return Err(LedgerError::BadRequest(
                "Expiry date must not be in the past".into(),
            ));
        }
        self.require_owner(owner_id).await?;

        let budget = self.generator.max_attempts();
        let mut remaining = budget;
        while remaining > 0 {
            let (raw, digest, used) = match self
                .generator
                .generate_within(&self.vault, &*self.store, remaining)
                .await
            {
                Ok(drawn) => drawn,
                Err(GenerationError::Exhausted { .. }) => break,
                Err(e) => return Err(e.into()),
            };
            remaining -= used;
            let number_ciphertext = self.vault.encode(&raw)?;

            let new_card = NewCard {
                number_ciphertext,
                number_digest: digest,
                owner_id,
                balance,
                status: CardStatus::Active,
                expiry_date,
            };

            match self.store.insert(new_card).await {
                Ok(card) => {
                    info!(card_id = card.id, owner_id, "Card created");
                    return Ok(CardView::new(&card, &raw));
                }
                Err(StoreError::DuplicateDigest) => {
                    warn!(remaining, owner_id, "Card number taken by a concurrent insert");
                }
                Err(e) => return Err(e.into()),
            }
        }

        error!(
            attempts = budget,
            owner_id, "Card creation gave up after repeated digest collisions"
        );
        Err(LedgerError::GenerationExhausted { attempts: budget })
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    /// Administrative BLOCKED -> ACTIVE
    pub async fn activate(&self, card_id: CardId) -> Result<CardView, LedgerError> {
        self.transition(card_id, CardEvent::Activate, None).await
    }

    /// Administrative ACTIVE -> BLOCKED
    pub async fn block(&self, card_id: CardId) -> Result<CardView, LedgerError> {
        self.transition(card_id, CardEvent::Block, None).await
    }

    /// Owner-initiated ACTIVE -> BLOCKED
    pub async fn request_block(
        &self,
        card_id: CardId,
        requester: OwnerId,
    ) -> Result<CardView, LedgerError> {
        self.transition(card_id, CardEvent::OwnerBlock, Some(requester))
            .await
    }

    async fn transition(
        &self,
        card_id: CardId,
        event: CardEvent,
        requester: Option<OwnerId>,
    ) -> Result<CardView, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut card = tx.find_by_id_for_update(card_id).await?;

        if let Some(requester) = requester {
            ensure_owner(&card, requester)?;
        }

        let previous = card.status;
        card.status = previous
            .apply(event, card.expiry_date < today())
            .map_err(|e| transition_error(card_id, e))?;

        tx.save(&card).await?;
        tx.commit().await?;

        info!(card_id, from = %previous, to = %card.status, ?event, "Card status changed");
        self.to_view(&card)
    }

    /// Remove a card permanently.
    pub async fn delete_card(&self, card_id: CardId) -> Result<(), LedgerError> {
        let mut tx = self.store.begin().await?;
        let card = tx.find_by_id_for_update(card_id).await?;
        tx.delete(card.id).await?;
        tx.commit().await?;

        info!(card_id, owner_id = card.owner_id, "Card deleted");
        Ok(())
    }

    // ========================================================================
    // Balances
    // ========================================================================

    pub async fn get_balance(
        &self,
        card_id: CardId,
        requester: OwnerId,
    ) -> Result<Decimal, LedgerError> {
        let card = self.store.find_by_id(card_id).await?;
        ensure_owner(&card, requester)?;
        Ok(card.balance)
    }

    /// Move `amount` between two cards of the same owner.
    ///
    /// Locks are taken in ascending card id order regardless of direction,
    /// and every check runs against the locked rows.
    pub async fn transfer(
        &self,
        from_card_id: CardId,
        to_card_id: CardId,
        amount: Decimal,
        requester: OwnerId,
    ) -> Result<TransferReceipt, LedgerError> {
        let amount = money::validate_transfer_amount(amount)?;
        if from_card_id == to_card_id {
            return Err(LedgerError::SameCard);
        }

        let (first, second) = if from_card_id < to_card_id {
            (from_card_id, to_card_id)
        } else {
            (to_card_id, from_card_id)
        };

        let mut tx = self.store.begin().await?;
        let first_card = tx.find_by_id_for_update(first).await?;
        let second_card = tx.find_by_id_for_update(second).await?;
        let (mut source, mut target) = if first == from_card_id {
            (first_card, second_card)
        } else {
            (second_card, first_card)
        };

        ensure_owner(&source, requester)?;
        ensure_owner(&target, requester)?;

        let today = today();
        for card in [&source, &target] {
            if card.status != CardStatus::Active || card.is_expired(today) {
                debug!(card_id = card.id, status = %card.status, "Transfer rejected: card not active");
                return Err(LedgerError::CardNotActive(card.id));
            }
        }

        if source.balance < amount {
            debug!(
                card_id = source.id,
                balance = %source.balance,
                %amount,
                "Transfer rejected: insufficient funds"
            );
            return Err(LedgerError::InsufficientFunds);
        }

        source.balance -= amount;
        target.balance = target
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::BadRequest("Target balance overflow".into()))?;

        tx.save(&source).await?;
        tx.save(&target).await?;
        tx.commit().await?;

        info!(
            from_card_id,
            to_card_id,
            %amount,
            owner_id = requester,
            "Transfer committed"
        );

        Ok(TransferReceipt {
            from_card_id,
            to_card_id,
            amount,
            from_balance: source.balance,
            to_balance: target.balance,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Map a login to its owner id.
    pub async fn resolve_owner(&self, login: &str) -> Result<OwnerId, LedgerError> {
        self.accounts
            .get_account_by_login(login)
            .await?
            .map(|account| account.account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(login.to_string()))
    }

    pub async fn list_by_owner(
        &self,
        owner_id: OwnerId,
        status: Option<CardStatus>,
        page: PageRequest,
    ) -> Result<Page<CardView>, LedgerError> {
        self.require_owner(owner_id).await?;
        let cards = self.store.find_by_owner(owner_id, status, page).await?;
        cards.try_map(|card| self.to_view(&card))
    }

    pub async fn list_all(
        &self,
        status: Option<CardStatus>,
        page: PageRequest,
    ) -> Result<Page<CardView>, LedgerError> {
        let cards = self.store.find_all(status, page).await?;
        cards.try_map(|card| self.to_view(&card))
    }

    /// Cards of `owner_id` whose raw number ends in `last_digits`.
    ///
    /// Decodes every card of the owner; there is no suffix index.
    pub async fn search_by_last_digits(
        &self,
        owner_id: OwnerId,
        last_digits: &str,
    ) -> Result<Vec<CardView>, LedgerError> {
        if last_digits.len() != SEARCH_SUFFIX_LENGTH
            || !last_digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(LedgerError::BadRequest(format!(
                "Search requires exactly {} digits",
                SEARCH_SUFFIX_LENGTH
            )));
        }
        self.require_owner(owner_id).await?;

        let mut matches = Vec::new();
        for card in self.store.find_all_by_owner(owner_id).await? {
            let raw = self.decode(&card)?;
            if raw.ends_with(last_digits) {
                matches.push(CardView::new(&card, &raw));
            }
        }
        Ok(matches)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn require_owner(&self, owner_id: OwnerId) -> Result<(), LedgerError> {
        match self.accounts.get_account_by_id(owner_id).await? {
            Some(_) => Ok(()),
            None => Err(LedgerError::OwnerNotFound(owner_id)),
        }
    }

    fn decode(&self, card: &Card) -> Result<crate::vault::RawCardNumber, LedgerError> {
        self.vault.decode(&card.number_ciphertext).map_err(|e| {
            error!(card_id = card.id, error = %e, "Stored card number failed to decode");
            LedgerError::DecodeError(card.id)
        })
    }

    fn to_view(&self, card: &Card) -> Result<CardView, LedgerError> {
        let raw = self.decode(card)?;
        Ok(CardView::new(card, &raw))
    }
}

fn ensure_owner(card: &Card, requester: OwnerId) -> Result<(), LedgerError> {
    if card.owner_id != requester {
        debug!(card_id = card.id, requester, "Rejected: card belongs to another owner");
        return Err(LedgerError::Forbidden);
    }
    Ok(())
}

fn transition_error(card_id: CardId, e: TransitionError) -> LedgerError {
    match e {
        TransitionError::AlreadyInState(status) => {
            LedgerError::Conflict(format!("Card {} is already {}", card_id, status))
        }
        TransitionError::Expired => {
            LedgerError::InvalidTransition(format!("Card {} is expired", card_id))
        }
        TransitionError::NotActive(status) => LedgerError::InvalidTransition(format!(
            "Card {} cannot be blocked while {}",
            card_id, status
        )),
    }
}
