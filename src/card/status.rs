//! Card Status State Machine
//!
//! Status IDs are stored in PostgreSQL as SMALLINT.
//!
//! ```text
//! ACTIVE ──block──▶ BLOCKED
//!    ▲                 │
//!    └────activate─────┘   (rejected once the card is expired)
//!
//! ACTIVE/BLOCKED ──time──▶ EXPIRED   (driven outside the ledger)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum CardStatus {
    /// Initial state, card can send and receive funds
    Active = 1,
    /// Blocked by the owner or an administrator
    Blocked = 2,
    /// Past its expiry date; can never be reactivated
    Expired = 3,
}

/// Lifecycle events the ledger can apply to a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardEvent {
    /// Administrator activation
    Activate,
    /// Administrator block
    Block,
    /// Owner-initiated block request
    OwnerBlock,
}

/// Why a lifecycle event was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The card is already in the event's target state (a no-op)
    AlreadyInState(CardStatus),
    /// Expired cards cannot be reactivated
    Expired,
    /// The event requires an active card
    NotActive(CardStatus),
}

impl CardStatus {
    /// Get the numeric status ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL status ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(CardStatus::Active),
            2 => Some(CardStatus::Blocked),
            3 => Some(CardStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "ACTIVE",
            CardStatus::Blocked => "BLOCKED",
            CardStatus::Expired => "EXPIRED",
        }
    }

    /// Apply `event` to a card currently in `self`.
    ///
    /// `expiry_passed` is true when the card's expiry date lies in the past,
    /// even if nothing has flipped its status to EXPIRED yet.
    pub fn apply(
        self,
        event: CardEvent,
        expiry_passed: bool,
    ) -> Result<CardStatus, TransitionError> {
        match (event, self) {
            (CardEvent::Activate, CardStatus::Active) => {
                Err(TransitionError::AlreadyInState(CardStatus::Active))
            }
            (CardEvent::Activate, CardStatus::Expired) => Err(TransitionError::Expired),
            (CardEvent::Activate, CardStatus::Blocked) if expiry_passed => {
                Err(TransitionError::Expired)
            }
            (CardEvent::Activate, CardStatus::Blocked) => Ok(CardStatus::Active),

            (CardEvent::Block, CardStatus::Blocked) => {
                Err(TransitionError::AlreadyInState(CardStatus::Blocked))
            }
            (CardEvent::Block, CardStatus::Expired) => {
                Err(TransitionError::NotActive(CardStatus::Expired))
            }
            (CardEvent::Block, CardStatus::Active) => Ok(CardStatus::Blocked),

            (CardEvent::OwnerBlock, CardStatus::Active) => Ok(CardStatus::Blocked),
            (CardEvent::OwnerBlock, other) => Err(TransitionError::NotActive(other)),
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(CardStatus::Active),
            "BLOCKED" => Ok(CardStatus::Blocked),
            "EXPIRED" => Ok(CardStatus::Expired),
            other => Err(format!("unknown card status: {}", other)),
        }
    }
}
