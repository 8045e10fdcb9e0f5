//! Card Ledger
//!
//! Owner-scoped payment cards with a status lifecycle and balance transfers
//! between cards of the same owner.
//!
//! # State Machine
//!
//! ```text
//!            block / owner block
//!   ACTIVE ───────────────────────▶ BLOCKED
//!     ▲                               │
//!     └───────── admin activate ──────┘   (refused once expired)
//!
//!   ACTIVE/BLOCKED ──(time)──▶ EXPIRED    driven outside the ledger
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Canonical lock order**: a transfer locks its two cards in ascending id
//!    order, whatever the direction
//! 2. **Check under lock**: ownership, status and balance are read from the
//!    locked rows only
//! 3. **All or nothing**: debit and credit commit in one transaction
//! 4. **Masked output**: raw numbers, ciphertexts and digests never leave the
//!    ledger, only `**** **** **** XXXX`

pub mod error;
pub mod service;

#[cfg(test)]
mod integration_tests;

pub use error::{ErrorKind, LedgerError};
pub use service::{CardLedger, SEARCH_SUFFIX_LENGTH, TransferReceipt};
