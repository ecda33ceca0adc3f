//! Display-side timeline assembly.
//!
//! Takes the flat list of sub-events (joined with their parent event
//! context) and produces the day-by-day view: deduplicated, bucketed by
//! date, and partitioned into groups of temporally-overlapping sessions.
//!
//! Everything here is pure and deterministic so the frontend can run it
//! as-is. The dedup fingerprint used here is intentionally wider than the
//! one the sync service applies before persisting; the two passes serve
//! different stages and collapse different records.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bucket key for entries whose parent event has no resolvable date.
pub const UNKNOWN_DATE_KEY: &str = "unknown";

/// A sub-event joined with its parent event context.
///
/// `start_at`/`end_at` are the resolved instants when the caller managed to
/// combine the parent date with a time token; entries without instants are
/// still displayed, they just sort first and never merge into a running
/// overlap group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub sub_event_id: Uuid,
    pub name: String,
    pub speaker: Option<String>,
    pub speaker_position: Option<String>,
    pub speaker_company: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub parent_title: String,
    pub parent_location: Option<String>,
    pub parent_date: Option<NaiveDate>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

/// One date bucket of the assembled timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineDay {
    /// "YYYY-MM-DD", or [`UNKNOWN_DATE_KEY`]
    pub date_key: String,
    /// Overlap groups in display order
    pub groups: Vec<Vec<TimelineEntry>>,
}

/// Assemble the timeline view: dedupe, bucket by date, sort buckets
/// lexicographically by date string, and group overlapping entries within
/// each bucket.
pub fn assemble_timeline(entries: Vec<TimelineEntry>) -> Vec<TimelineDay> {
    let mut seen = HashSet::new();
    let mut buckets: BTreeMap<String, Vec<TimelineEntry>> = BTreeMap::new();

    for entry in entries {
        if !seen.insert(display_fingerprint(&entry)) {
            continue;
        }
        buckets
            .entry(date_key(entry.parent_date))
            .or_default()
            .push(entry);
    }

    buckets
        .into_iter()
        .map(|(date_key, items)| TimelineDay {
            date_key,
            groups: group_overlapping(items),
        })
        .collect()
}

fn date_key(date: Option<NaiveDate>) -> String {
    match date {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => UNKNOWN_DATE_KEY.to_string(),
    }
}

fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

fn norm_opt(s: Option<&str>) -> String {
    s.map(norm).unwrap_or_default()
}

/// Equality key for the display-side dedup pass. First occurrence wins.
fn display_fingerprint(entry: &TimelineEntry) -> (String, String, String, String, String, String, String) {
    (
        date_key(entry.parent_date),
        norm(&entry.name),
        norm_opt(entry.speaker.as_deref()),
        norm(&entry.parent_title),
        norm_opt(entry.parent_location.as_deref()),
        entry
            .start_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "nostart".to_string()),
        entry
            .end_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "noend".to_string()),
    )
}

/// Greedily partition a date bucket into groups of overlapping entries.
///
/// Entries are sorted by start instant (no-start entries first, original
/// order preserved on ties). A group tracks its running end: the later of
/// each member's end instant, or the member's start instant when it has no
/// end. An entry joins the current group when its start is <= the running
/// end (touching intervals count as overlapping). The comparison requires
/// both instants, so a no-start entry that is not first in its bucket
/// always opens a new group.
fn group_overlapping(mut items: Vec<TimelineEntry>) -> Vec<Vec<TimelineEntry>> {
    // sort_by is stable; None sorts before Some
    items.sort_by(|a, b| a.start_at.cmp(&b.start_at));

    let mut groups: Vec<Vec<TimelineEntry>> = Vec::new();
    let mut current: Vec<TimelineEntry> = Vec::new();
    let mut current_end: Option<DateTime<Utc>> = None;

    for item in items {
        let effective_end = item.end_at.or(item.start_at);
        let joins = match (item.start_at, current_end) {
            (Some(start), Some(end)) => start <= end,
            _ => false,
        };

        if current.is_empty() {
            current_end = effective_end;
            current.push(item);
        } else if joins {
            current_end = match (current_end, effective_end) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            current.push(item);
        } else {
            groups.push(std::mem::take(&mut current));
            current_end = effective_end;
            current.push(item);
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }

    groups
}
