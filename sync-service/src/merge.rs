//! Combining per-chunk extraction results into one schedule.
//!
//! Candidates are deduplicated by a (speaker, start, end) fingerprint,
//! deliberately narrower than the display-side fingerprint in
//! `shared::timeline`. The two passes are independent and must stay that
//! way: unifying either would change which records collapse.

use std::collections::HashSet;

use crate::extract::{ChunkSchedule, ExtractionCandidate};

/// The combined result of all successful chunks for one page
#[derive(Debug, Clone, Default)]
pub struct MergedSchedule {
    pub location: Option<String>,
    pub sub_events: Vec<ExtractionCandidate>,
}

/// Merge per-chunk schedules: concatenate candidate lists in chunk order
/// and dedup, and adopt the first chunk's reported location verbatim.
/// First-chunk-wins is a deterministic priority rule, not a quality
/// heuristic, so a `None` from the first chunk is kept over a value from a
/// later one.
pub fn merge_chunk_schedules(schedules: Vec<ChunkSchedule>) -> MergedSchedule {
    let location = schedules.first().and_then(|s| s.location.clone());
    let candidates = schedules.into_iter().flat_map(|s| s.sub_events).collect();

    MergedSchedule {
        location,
        sub_events: dedup_candidates(candidates),
    }
}

/// Remove duplicate candidates, first occurrence wins.
///
/// Fingerprint = lower-cased, trimmed (speaker, start, end) tuple. Two
/// different-titled sessions sharing one speaker and time slot will merge;
/// that matches the source behavior and is left as-is.
pub fn dedup_candidates(candidates: Vec<ExtractionCandidate>) -> Vec<ExtractionCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(candidate_fingerprint(c)))
        .collect()
}

fn candidate_fingerprint(candidate: &ExtractionCandidate) -> (String, String, String) {
    (
        norm(candidate.speaker.as_deref()),
        norm(candidate.start_time.as_deref()),
        norm(candidate.end_time.as_deref()),
    )
}

fn norm(s: Option<&str>) -> String {
    s.map(|s| s.trim().to_lowercase()).unwrap_or_default()
}
