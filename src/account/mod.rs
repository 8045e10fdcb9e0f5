//! Account collaborator
//!
//! Cards only reference their owner by id. The account record itself (login
//! identity and role) is owned by the account service; the ledger reads it
//! through [`AccountDirectory`] when it needs to verify or resolve an owner.

pub mod models;
pub mod repository;

pub use models::{Account, AccountRole};
pub use repository::{AccountDirectory, InMemoryAccountDirectory, PgAccountDirectory};
