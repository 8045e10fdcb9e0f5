//! Money Module
//!
//! Card balances are fixed-point decimals with [`BALANCE_SCALE`] fractional
//! digits. Every amount entering the ledger passes through one of the guards
//! here, so stored balances always carry exactly that scale.
//!
//! ## Rules
//! 1. No silent rounding: extra precision is rejected, not truncated
//! 2. Transfer amounts are strictly positive
//! 3. Balances are never negative

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits carried by every balance and amount (cents)
pub const BALANCE_SCALE: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount must be greater than zero")]
    NonPositive,

    #[error("Amount must not be negative")]
    Negative,

    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Rescale to [`BALANCE_SCALE`], rejecting values that would lose digits.
pub fn to_fixed_scale(amount: Decimal) -> Result<Decimal, MoneyError> {
    let provided = amount.normalize().scale();
    if provided > BALANCE_SCALE {
        return Err(MoneyError::PrecisionOverflow {
            provided,
            max: BALANCE_SCALE,
        });
    }
    let mut fixed = amount;
    fixed.rescale(BALANCE_SCALE);
    Ok(fixed)
}

/// Guard for transfer amounts: strictly positive, at most two decimals.
pub fn validate_transfer_amount(amount: Decimal) -> Result<Decimal, MoneyError> {
    if amount <= Decimal::ZERO {
        return Err(MoneyError::NonPositive);
    }
    to_fixed_scale(amount)
}

/// Guard for the opening balance of a new card. Absent means zero.
pub fn validate_initial_balance(balance: Option<Decimal>) -> Result<Decimal, MoneyError> {
    let balance = balance.unwrap_or(Decimal::ZERO);
    if balance.is_sign_negative() && !balance.is_zero() {
        return Err(MoneyError::Negative);
    }
    to_fixed_scale(balance)
}

/// Parse a client-supplied amount string ("12.50").
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let trimmed = amount_str.trim();
    if trimmed.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }
    Decimal::from_str(trimmed).map_err(|e| MoneyError::InvalidFormat(e.to_string()))
}
