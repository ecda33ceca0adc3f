use anyhow::{Context, Result};
use std::env;

/// Service configuration, loaded once at startup and injected into the
/// orchestrator and extraction engine. No module reads the environment on
/// its own.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub openai_api_key: String,
    pub openai_model: String,
    /// Page fetch deadline in milliseconds; 0 means unbounded
    pub scrape_timeout_ms: u64,
    /// Default sync window length in days when the caller supplies none
    pub sync_window_days: i64,
    pub sync_interval_seconds: u64,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .context("GOOGLE_CLIENT_ID must be set")?,
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .context("GOOGLE_CLIENT_SECRET must be set")?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            scrape_timeout_ms: env::var("SCRAPE_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .context("SCRAPE_TIMEOUT_MS must be a valid number")?,
            sync_window_days: env::var("SYNC_WINDOW_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("SYNC_WINDOW_DAYS must be a valid number")?,
            sync_interval_seconds: env::var("SYNC_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("SYNC_INTERVAL_SECONDS must be a valid number")?,
        })
    }
}
