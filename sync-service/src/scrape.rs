//! Page text acquisition for the enrichment pipeline.

use std::time::Duration;

use crate::error::ScrapeError;

/// Fetches raw page content for a URL. One outbound request, no retries;
/// retry policy (currently: none) belongs to the orchestrator.
#[allow(async_fn_in_trait)]
pub trait PageFetcher {
    /// Fetch the page body as text. `timeout_ms == 0` means unbounded.
    /// On timeout the in-flight request is cancelled.
    async fn fetch_text(&self, url: &str, timeout_ms: u64) -> Result<String, ScrapeError>;
}

/// reqwest-backed fetcher
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> Self {
        // no default timeout on the client; the per-request deadline is the
        // caller's to choose
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str, timeout_ms: u64) -> Result<String, ScrapeError> {
        let mut request = self.client.get(url);
        if timeout_ms > 0 {
            // reqwest drops the connection when the deadline passes, so a
            // timed-out request does not linger
            request = request.timeout(Duration::from_millis(timeout_ms));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout { timeout_ms }
            } else {
                ScrapeError::Fetch(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Fetch(format!(
                "{} returned status {}",
                url, status
            )));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout { timeout_ms }
            } else {
                ScrapeError::Fetch(e.to_string())
            }
        })
    }
}
