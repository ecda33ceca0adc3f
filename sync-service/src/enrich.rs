//! The enrichment pipeline: scrape a linked page, extract its schedule,
//! and persist the merged sub-events under the parent event.
//!
//! Each stage degrades independently: a failed fetch leaves the event
//! unenriched, a failed chunk shrinks the schedule, a failed row insert
//! skips that row. Only the orchestrator decides what is fatal.

use anyhow::{Context, Result};
use shared::Event;

use crate::extract::ScheduleExtractor;
use crate::llm::ChatCompleter;
use crate::merge::{merge_chunk_schedules, MergedSchedule};
use crate::scrape::PageFetcher;
use crate::store::{EventStore, NewSubEvent};

/// Separator between a parent event location and a sub-event override
const LOCATION_SEPARATOR: &str = " -- ";

/// Per-event enrichment diagnostics, surfaced through logs only. The sync
/// result stays a binary success flag.
#[derive(Debug, Default)]
pub struct EnrichmentReport {
    pub sub_events_inserted: usize,
    pub sub_events_failed: usize,
    pub location_updated: bool,
}

pub struct EnrichmentPipeline<F, C> {
    fetcher: F,
    extractor: ScheduleExtractor<C>,
    scrape_timeout_ms: u64,
}

impl<F: PageFetcher, C: ChatCompleter> EnrichmentPipeline<F, C> {
    pub fn new(fetcher: F, extractor: ScheduleExtractor<C>, scrape_timeout_ms: u64) -> Self {
        Self {
            fetcher,
            extractor,
            scrape_timeout_ms,
        }
    }

    /// Run the full pipeline for one event with a linked page.
    ///
    /// Inserts are append-only; the caller guards against duplication by
    /// only invoking this when the event's link is new or changed.
    pub async fn run<S: EventStore>(&self, store: &S, event: &Event) -> Result<EnrichmentReport> {
        let url = event
            .link
            .as_deref()
            .context("event has no link to enrich from")?;

        let text = self
            .fetcher
            .fetch_text(url, self.scrape_timeout_ms)
            .await
            .with_context(|| format!("scrape of {} failed", url))?;

        let schedules = self.extractor.extract_schedule(event.id, &text).await;
        let merged = merge_chunk_schedules(schedules);

        tracing::debug!(
            "event {}: merged schedule has {} candidates (location: {:?})",
            event.id,
            merged.sub_events.len(),
            merged.location
        );

        self.persist(store, event, merged).await
    }

    async fn persist<S: EventStore>(
        &self,
        store: &S,
        event: &Event,
        merged: MergedSchedule,
    ) -> Result<EnrichmentReport> {
        let mut report = EnrichmentReport::default();

        // A recovered non-empty location overwrites the parent's, last
        // writer wins. Anything else leaves the stored value alone.
        let parent_location = match merged.location.as_deref().map(str::trim) {
            Some(scraped) if !scraped.is_empty() => {
                store
                    .update_event_location(event.id, scraped)
                    .await
                    .context("failed to update event location")?;
                report.location_updated = true;
                Some(scraped.to_string())
            }
            _ => event.location.clone(),
        };

        for candidate in merged.sub_events {
            let new = NewSubEvent {
                event_id: event.id,
                name: candidate.title.unwrap_or_default(),
                start_time: candidate.start_time,
                end_time: candidate.end_time,
                speaker: candidate.speaker,
                speaker_position: candidate.speaker_position,
                speaker_company: candidate.speaker_company,
                location: join_locations(parent_location.as_deref(), candidate.location.as_deref()),
            };

            match store.insert_sub_event(new).await {
                Ok(_) => report.sub_events_inserted += 1,
                Err(e) => {
                    report.sub_events_failed += 1;
                    tracing::error!("event {}: failed to insert sub-event: {}", event.id, e);
                }
            }
        }

        Ok(report)
    }
}

/// Compose a sub-event's stored location from the parent's and its own.
/// Both present and distinct joins them; one present passes through; empty
/// or whitespace-only strings count as absent.
pub fn join_locations(parent: Option<&str>, child: Option<&str>) -> Option<String> {
    let parent = parent.map(str::trim).filter(|s| !s.is_empty());
    let child = child.map(str::trim).filter(|s| !s.is_empty());

    match (parent, child) {
        (Some(p), Some(c)) if p != c => Some(format!("{}{}{}", p, LOCATION_SEPARATOR, c)),
        (Some(p), _) => Some(p.to_string()),
        (None, Some(c)) => Some(c.to_string()),
        (None, None) => None,
    }
}
