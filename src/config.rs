use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// Environment variable overriding `vault.key_hex`
pub const VAULT_KEY_ENV: &str = "CARD_LEDGER_VAULT_KEY";
/// Environment variable overriding `postgres_url`
pub const POSTGRES_URL_ENV: &str = "CARD_LEDGER_POSTGRES_URL";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL for the card store and account directory
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub card_number: CardNumberConfig,
    pub vault: VaultConfig,
}

/// Transfer/locking behaviour of the ledger
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Upper bound on waiting for a card row lock before failing with a transient conflict
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
        }
    }
}

/// Card number generation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CardNumberConfig {
    /// Issuer prefix (BIN), digits only
    pub bin_prefix: String,
    /// Total length including the Luhn check digit
    pub length: usize,
    /// Attempts before giving up with `GenerationExhausted`
    pub max_attempts: u32,
}

impl Default for CardNumberConfig {
    fn default() -> Self {
        Self {
            bin_prefix: "400000".to_string(),
            length: 16,
            max_attempts: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct VaultConfig {
    /// AES-256 key, 64 hex chars
    pub key_hex: String,
    #[serde(default)]
    pub digest_pepper: String,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("key_hex", &"<redacted>")
            .field("digest_pepper", &"<redacted>")
            .finish()
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config yaml: {}", config_path))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(VAULT_KEY_ENV) {
            self.vault.key_hex = key;
        }
        if let Ok(url) = std::env::var(POSTGRES_URL_ENV) {
            self.postgres_url = Some(url);
        }
    }
}
