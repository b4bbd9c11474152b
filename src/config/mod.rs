//! Environment-driven configuration.

use anyhow::Result;
use serde::Deserialize;
use std::env;

/// Default PBKDF2 iteration count for the at-rest cipher.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Database URL (CUSTODIA_DATABASE_URL, sqlite fallback).
    pub database_url: String,
    /// PBKDF2 iterations for identity key derivation.
    pub pbkdf2_iterations: u32,
    /// Upper bound on a single chain submission, seconds.
    pub submission_timeout_secs: u64,
    /// How long an exported secret stays visible before auto-delete.
    pub sensitive_message_ttl_secs: u64,
}

impl WalletConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("CUSTODIA_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/custodia.db?mode=rwc".to_string());

        let pbkdf2_iterations = parse_env("CUSTODIA_PBKDF2_ITERATIONS", DEFAULT_PBKDF2_ITERATIONS)?;
        let submission_timeout_secs = parse_env("CUSTODIA_SUBMISSION_TIMEOUT_SECS", 60)?;
        let sensitive_message_ttl_secs = parse_env("CUSTODIA_SENSITIVE_MESSAGE_TTL_SECS", 30)?;

        Ok(WalletConfig {
            database_url,
            pbkdf2_iterations,
            submission_timeout_secs,
            sensitive_message_ttl_secs,
        })
    }

    pub fn submission_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.submission_timeout_secs)
    }

    pub fn sensitive_message_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sensitive_message_ttl_secs)
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/custodia.db?mode=rwc".to_string(),
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            submission_timeout_secs: 60,
            sensitive_message_ttl_secs: 30,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value", name)),
        Err(_) => Ok(default),
    }
}

/// Initialize tracing with an env-filter defaulting to `info`.
/// Safe to call once at startup; tests skip it.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
