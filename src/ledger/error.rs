//! Ledger Error Types
//!
//! Every ledger operation surfaces exactly one of these. Client-facing kinds
//! carry stable codes; operational faults are logged where they occur and
//! reach the caller only as a generic server error.

use thiserror::Error;

use crate::core_types::{CardId, OwnerId};
use crate::money::MoneyError;
use crate::store::StoreError;
use crate::vault::VaultError;
use crate::vault::generator::GenerationError;

/// Coarse error taxonomy shared by all ledger operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    InvalidTransition,
    BadRequest,
    GenerationExhausted,
    DecodeError,
    TransientConflict,
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // === Not Found ===
    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    #[error("Owner not found: {0}")]
    OwnerNotFound(OwnerId),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    // === Ownership / State ===
    #[error("Card does not belong to the user")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidTransition(String),

    // === Validation ===
    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Source and target card cannot be the same")]
    SameCard,

    #[error("Card {0} is not active")]
    CardNotActive(CardId),

    #[error("{0}")]
    BadRequest(String),

    // === Operational ===
    #[error("No unique card number after {attempts} attempts")]
    GenerationExhausted { attempts: u32 },

    #[error("Stored card number for card {0} could not be decoded")]
    DecodeError(CardId),

    #[error("Timed out waiting for a card lock, try again")]
    TransientConflict,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::CardNotFound(_)
            | LedgerError::OwnerNotFound(_)
            | LedgerError::AccountNotFound(_) => ErrorKind::NotFound,
            LedgerError::Forbidden => ErrorKind::Forbidden,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            LedgerError::InsufficientFunds
            | LedgerError::SameCard
            | LedgerError::CardNotActive(_)
            | LedgerError::BadRequest(_) => ErrorKind::BadRequest,
            LedgerError::GenerationExhausted { .. } => ErrorKind::GenerationExhausted,
            LedgerError::DecodeError(_) => ErrorKind::DecodeError,
            LedgerError::TransientConflict => ErrorKind::TransientConflict,
            LedgerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::CardNotFound(_) => "CARD_NOT_FOUND",
            LedgerError::OwnerNotFound(_) => "OWNER_NOT_FOUND",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::Forbidden => "FORBIDDEN",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::InvalidTransition(_) => "INVALID_TRANSITION",
            LedgerError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            LedgerError::SameCard => "SAME_CARD",
            LedgerError::CardNotActive(_) => "CARD_NOT_ACTIVE",
            LedgerError::BadRequest(_) => "BAD_REQUEST",
            LedgerError::TransientConflict => "TRANSIENT_CONFLICT",
            LedgerError::GenerationExhausted { .. }
            | LedgerError::DecodeError(_)
            | LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::Conflict => 409,
            ErrorKind::InvalidTransition | ErrorKind::BadRequest => 400,
            ErrorKind::TransientConflict => 503,
            ErrorKind::GenerationExhausted | ErrorKind::DecodeError | ErrorKind::Internal => 500,
        }
    }

    /// Faults of the system rather than of the request
    pub fn is_operational(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::GenerationExhausted | ErrorKind::DecodeError | ErrorKind::Internal
        )
    }

    /// Message safe to show to the caller
    pub fn client_message(&self) -> String {
        if self.is_operational() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => LedgerError::CardNotFound(id),
            StoreError::LockTimeout => LedgerError::TransientConflict,
            other => LedgerError::Internal(other.to_string()),
        }
    }
}

impl From<MoneyError> for LedgerError {
    fn from(e: MoneyError) -> Self {
        LedgerError::BadRequest(e.to_string())
    }
}

impl From<GenerationError> for LedgerError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Exhausted { attempts } => LedgerError::GenerationExhausted { attempts },
            GenerationError::Store(store) => store.into(),
            GenerationError::InvalidConfig(msg) => LedgerError::Internal(msg),
        }
    }
}

impl From<VaultError> for LedgerError {
    fn from(e: VaultError) -> Self {
        LedgerError::Internal(e.to_string())
    }
}
