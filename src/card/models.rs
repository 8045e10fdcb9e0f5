//! Card records

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::status::CardStatus;
use crate::core_types::{CardId, OwnerId};
use crate::vault::{NumberDigest, RawCardNumber};

/// Persisted card. Never leaves the crate boundary as-is; callers get a
/// [`CardView`].
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub id: CardId,
    /// Vault ciphertext of the raw number
    pub number_ciphertext: String,
    /// Unique one-way digest of the raw number
    pub number_digest: NumberDigest,
    pub owner_id: OwnerId,
    pub balance: Decimal,
    pub status: CardStatus,
    pub expiry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Past its expiry date, or already marked EXPIRED.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.status == CardStatus::Expired || self.expiry_date < today
    }
}

/// Card about to be inserted; `id` and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub number_ciphertext: String,
    pub number_digest: NumberDigest,
    pub owner_id: OwnerId,
    pub balance: Decimal,
    pub status: CardStatus,
    pub expiry_date: NaiveDate,
}

/// Externally visible card: only the masked number is exposed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub id: CardId,
    pub masked_number: String,
    pub owner_id: OwnerId,
    pub expiry_date: NaiveDate,
    pub status: CardStatus,
    pub balance: Decimal,
}

impl CardView {
    pub fn new(card: &Card, raw: &RawCardNumber) -> Self {
        Self {
            id: card.id,
            masked_number: raw.masked(),
            owner_id: card.owner_id,
            expiry_date: card.expiry_date,
            status: card.status,
            balance: card.balance,
        }
    }
}
