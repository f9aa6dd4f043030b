use std::{env, path::PathBuf};

use crate::commands::DEFAULT_CURRENCY;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Currency label written into ledger descriptions
    pub currency: String,
    /// Default `tracing` filter, used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database_path: lookup("LOYALTY_DATABASE_PATH")
                .unwrap_or_else(|| "loyalty.db".to_string())
                .into(),
            currency: lookup("LOYALTY_CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            log_filter: lookup("LOYALTY_LOG").unwrap_or_else(|| "info".to_string()),
        }
    }
}
