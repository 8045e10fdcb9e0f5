//! Identifier Vault
//!
//! At-rest protection for raw card numbers. Two forms are persisted, never the
//! plaintext itself:
//!
//! - **ciphertext**: AES-256-GCM, random 96-bit nonce, stored as
//!   `base64(nonce || ciphertext || tag)`. Randomized, so two encodings of the
//!   same number differ and ciphertext equality means nothing.
//! - **digest**: `hex(SHA-256(pepper || raw))`. Deterministic, used for
//!   uniqueness checks without decoding every stored card.
//!
//! Raw numbers live in [`RawCardNumber`], which zeroizes on drop and never
//! prints its contents.

pub mod generator;

pub use generator::{DigestOracle, IdentifierGenerator};

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::VaultConfig;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
/// Hex length of a SHA-256 digest
pub const DIGEST_HEX_LENGTH: usize = 64;

const MASK_PREFIX: &str = "**** **** **** ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("invalid vault key: expected 32 bytes of hex")]
    InvalidKey,

    #[error("encryption failed")]
    Encode,

    /// Corrupt or foreign ciphertext. Deliberately carries no detail.
    #[error("card number ciphertext could not be decoded")]
    Decode,
}

/// Plaintext card number. Exists only transiently in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct RawCardNumber(Zeroizing<String>);

impl RawCardNumber {
    pub fn new(digits: String) -> Self {
        Self(Zeroizing::new(digits))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn ends_with(&self, suffix: &str) -> bool {
        self.0.ends_with(suffix)
    }

    /// Display-safe form: `**** **** **** 1234`
    pub fn masked(&self) -> String {
        mask_card_number(self.expose())
    }
}

impl fmt::Debug for RawCardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawCardNumber(<redacted>)")
    }
}

/// One-way digest of a raw card number, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NumberDigest(String);

impl NumberDigest {
    /// Wrap a stored digest, checking its shape.
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let valid = hex_str.len() == DIGEST_HEX_LENGTH
            && hex_str
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex_str.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NumberDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mask everything except the last four digits.
pub fn mask_card_number(number: &str) -> String {
    let len = number.len();
    if len < 4 || !number.is_ascii() {
        return format!("{}****", MASK_PREFIX);
    }
    format!("{}{}", MASK_PREFIX, &number[len - 4..])
}

pub struct IdentifierVault {
    cipher: Aes256Gcm,
    pepper: Zeroizing<Vec<u8>>,
}

impl IdentifierVault {
    pub fn new(key: &[u8; KEY_LENGTH], pepper: &[u8]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
            pepper: Zeroizing::new(pepper.to_vec()),
        }
    }

    pub fn from_config(config: &VaultConfig) -> Result<Self, VaultError> {
        let key_bytes =
            Zeroizing::new(hex::decode(config.key_hex.trim()).map_err(|_| VaultError::InvalidKey)?);
        let key: &[u8; KEY_LENGTH] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::InvalidKey)?;
        Ok(Self::new(key, config.digest_pepper.as_bytes()))
    }

    /// Reversible encoding for storage.
    pub fn encode(&self, raw: &RawCardNumber) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, raw.expose().as_bytes())
            .map_err(|_| VaultError::Encode)?;

        let mut out = Vec::with_capacity(NONCE_LENGTH + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(BASE64.encode(out))
    }

    /// Exact inverse of [`encode`](Self::encode).
    pub fn decode(&self, ciphertext: &str) -> Result<RawCardNumber, VaultError> {
        let data = BASE64.decode(ciphertext).map_err(|_| VaultError::Decode)?;
        if data.len() <= NONCE_LENGTH {
            return Err(VaultError::Decode);
        }

        let (nonce_bytes, sealed) = data.split_at(NONCE_LENGTH);
        let plain = Zeroizing::new(
            self.cipher
                .decrypt(Nonce::from_slice(nonce_bytes), sealed)
                .map_err(|_| VaultError::Decode)?,
        );
        let digits = String::from_utf8(plain.to_vec()).map_err(|_| VaultError::Decode)?;
        Ok(RawCardNumber::new(digits))
    }

    /// Deterministic one-way digest used for uniqueness lookups.
    pub fn digest(&self, raw: &RawCardNumber) -> NumberDigest {
        let mut hasher = Sha256::new();
        hasher.update(self.pepper.as_slice());
        hasher.update(raw.expose().as_bytes());
        NumberDigest(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
pub(crate) fn test_vault() -> IdentifierVault {
    IdentifierVault::new(&[0x42u8; KEY_LENGTH], b"test-pepper")
}
