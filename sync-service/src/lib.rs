//! Calendar sync and schedule enrichment service.
//!
//! Pulls a user's Google Calendar events into the local store and, when an
//! event links out to an agenda page, scrapes that page and extracts its
//! sessions with an LLM. Invoked programmatically ([`sync::CalendarSync`])
//! or through the polling binary.

pub mod chunk;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod google;
pub mod llm;
pub mod merge;
pub mod schema;
pub mod scrape;
pub mod store;
pub mod sync;

pub use config::SyncConfig;
pub use error::{ExtractError, ScrapeError, SyncError};
pub use sync::{CalendarSync, SyncSummary, SyncWindow};
