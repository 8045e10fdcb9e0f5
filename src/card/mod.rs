//! Card model and status lifecycle

pub mod models;
pub mod status;

pub use models::{Card, CardView, NewCard};
pub use status::{CardEvent, CardStatus, TransitionError};
