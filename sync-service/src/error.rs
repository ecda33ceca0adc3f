//! Error taxonomy for the sync and enrichment pipeline.
//!
//! Fatal errors ([`SyncError`]) abort a sync run and surface to the caller.
//! Scrape and extraction errors are absorbed at the narrowest possible
//! scope: a failed page fetch leaves the event synced but unenriched, a
//! failed chunk shrinks the extracted schedule.

use thiserror::Error;

/// Fatal failures of a sync run. Anything here aborts the run entirely.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No stored profile for the requesting user
    #[error("no profile found for user {user_id}")]
    NoProfile { user_id: String },

    /// Profile exists but never recorded an access token
    #[error("no access token recorded for user {user_id}")]
    NoToken { user_id: String },

    /// Token refresh against the identity provider failed (e.g. revoked
    /// consent). Without a token nothing downstream can proceed.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    /// Calendar provider call errored or returned a malformed response
    #[error("calendar fetch failed: {0}")]
    ProviderFetch(String),

    /// Database or other infrastructure failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Per-link scrape failures. Non-fatal to the sync: the affected event is
/// fully synced but stays unenriched.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Server answered with a non-2xx status, or the request itself failed
    #[error("page fetch failed: {0}")]
    Fetch(String),

    /// Deadline exceeded; the in-flight request is cancelled
    #[error("page fetch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Per-chunk extraction failures. Caught by the chunk loop and skipped;
/// sibling chunks proceed.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The transformer invocation itself failed
    #[error("completion request failed: {0}")]
    Completion(#[source] anyhow::Error),

    /// The transformer returned something that is not the requested JSON.
    /// Carries the stripped raw text for diagnostics.
    #[error("chunk {chunk_index}: response is not valid schedule JSON")]
    Parse { chunk_index: usize, raw: String },
}
