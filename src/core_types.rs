//! Core types used throughout the ledger

/// Card ID - stable surrogate key assigned by the store, never reused.
///
/// Also the canonical lock order: multi-card operations lock in ascending `CardId`.
pub type CardId = i64;

/// Owner ID - primary key of the owning account.
///
/// Cards reference their owner by value only; the account record lives in
/// the external account directory.
pub type OwnerId = i64;
