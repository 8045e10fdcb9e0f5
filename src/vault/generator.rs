//! Identifier Generator
//!
//! Candidate card numbers are `BIN prefix + random digits + Luhn check digit`.
//! Uniqueness is decided by an external [`DigestOracle`] (normally the card
//! store's digest index); the generator holds no state besides its injected
//! randomness source.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error};

use super::{IdentifierVault, NumberDigest, RawCardNumber};
use crate::config::CardNumberConfig;
use crate::store::{CardStore, StoreError};

/// Longest card number allowed by ISO/IEC 7812
const MAX_LENGTH: usize = 19;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no unique card number after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("invalid card number config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Answers "is this digest already taken?"
#[async_trait]
pub trait DigestOracle: Send + Sync {
    async fn digest_exists(&self, digest: &NumberDigest) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S: CardStore + ?Sized> DigestOracle for S {
    async fn digest_exists(&self, digest: &NumberDigest) -> Result<bool, StoreError> {
        self.exists_by_digest(digest).await
    }
}

pub struct IdentifierGenerator {
    bin_prefix: String,
    length: usize,
    max_attempts: u32,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl IdentifierGenerator {
    pub fn new(
        config: &CardNumberConfig,
        rng: Box<dyn RngCore + Send>,
    ) -> Result<Self, GenerationError> {
        if config.bin_prefix.is_empty() || !config.bin_prefix.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(GenerationError::InvalidConfig(
                "bin_prefix must be non-empty digits".into(),
            ));
        }
        // at least one random digit plus the check digit
        if config.length < config.bin_prefix.len() + 2 || config.length > MAX_LENGTH {
            return Err(GenerationError::InvalidConfig(format!(
                "length {} out of range for prefix of {} digits",
                config.length,
                config.bin_prefix.len()
            )));
        }
        if config.max_attempts == 0 {
            return Err(GenerationError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }

        Ok(Self {
            bin_prefix: config.bin_prefix.clone(),
            length: config.length,
            max_attempts: config.max_attempts,
            rng: Mutex::new(rng),
        })
    }

    /// Generator backed by an OS-seeded `StdRng`
    pub fn from_entropy(config: &CardNumberConfig) -> Result<Self, GenerationError> {
        Self::new(config, Box::new(StdRng::from_entropy()))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// One Luhn-valid candidate, not checked for uniqueness.
    pub fn candidate(&self) -> RawCardNumber {
        let random_len = self.length - self.bin_prefix.len() - 1;
        let mut digits = String::with_capacity(self.length);
        digits.push_str(&self.bin_prefix);
        {
            // a poisoned rng is still a usable rng
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            for _ in 0..random_len {
                digits.push(char::from(b'0' + rng.gen_range(0..10u8)));
            }
        }
        let check = luhn_check_digit(&digits);
        digits.push(char::from(b'0' + check));
        RawCardNumber::new(digits)
    }

    /// Draw candidates until the oracle reports a free digest, at most
    /// `max_attempts` times.
    pub async fn generate_unique<O: DigestOracle + ?Sized>(
        &self,
        vault: &IdentifierVault,
        oracle: &O,
    ) -> Result<(RawCardNumber, NumberDigest), GenerationError> {
        let (raw, digest, _) = self.generate_within(vault, oracle, self.max_attempts).await?;
        Ok((raw, digest))
    }

    /// Same as [`generate_unique`](Self::generate_unique) with an explicit
    /// draw budget. Also returns the number of draws spent, including the
    /// successful one.
    pub async fn generate_within<O: DigestOracle + ?Sized>(
        &self,
        vault: &IdentifierVault,
        oracle: &O,
        attempts: u32,
    ) -> Result<(RawCardNumber, NumberDigest, u32), GenerationError> {
        for attempt in 1..=attempts {
            let raw = self.candidate();
            let digest = vault.digest(&raw);
            if !oracle.digest_exists(&digest).await? {
                return Ok((raw, digest, attempt));
            }
            debug!(attempt, "Card number candidate collided, retrying");
        }

        error!(
            attempts,
            "Card number space exhausted - identifier space too small for card population"
        );
        Err(GenerationError::Exhausted { attempts })
    }
}

/// Luhn check digit for `payload` (the number without its last digit).
pub fn luhn_check_digit(payload: &str) -> u8 {
    let sum: u32 = payload
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = (b - b'0') as u32;
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    ((10 - sum % 10) % 10) as u8
}
