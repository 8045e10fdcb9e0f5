//! Card Ledger - owner-scoped bank cards with safe inter-card transfers
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (CardId, OwnerId)
//! - [`money`] - Fixed-scale decimal amounts
//! - [`card`] - Card records and the status lifecycle
//! - [`vault`] - Card number encryption, digests and generation
//! - [`store`] - Lock-aware card persistence (in-memory and PostgreSQL)
//! - [`account`] - Owner account lookups
//! - [`ledger`] - Ledger operations: issuance, status changes, transfers, search
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`db`] - PostgreSQL connection pool

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod card;
pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod store;
pub mod vault;

// Convenient re-exports at crate root
pub use account::{Account, AccountDirectory, AccountRole, InMemoryAccountDirectory};
pub use card::{Card, CardStatus, CardView};
pub use core_types::{CardId, OwnerId};
pub use ledger::{CardLedger, ErrorKind, LedgerError, TransferReceipt};
pub use store::{CardStore, CardTx, InMemoryCardStore, Page, PageRequest, PgCardStore, StoreError};
pub use vault::{IdentifierGenerator, IdentifierVault};
