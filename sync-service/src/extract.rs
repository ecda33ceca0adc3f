//! Schedule extraction from scraped page text.
//!
//! The transformer's output is untrusted: schema conformance is enforced
//! entirely after the fact. Every field defaults to null/empty when
//! missing, fence markup is stripped before parsing, and a chunk whose
//! response still fails to parse is dropped without touching its siblings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::error::ExtractError;
use crate::llm::{ChatCompleter, ChatMessage};

/// Moderate temperature: exploratory enough to pull structure out of messy
/// prose without drifting into invention.
const EXTRACTION_TEMPERATURE: f32 = 0.7;

/// A proposed sub-event prior to merge/insert. Never persisted as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionCandidate {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub title: Option<String>,
    pub speaker: Option<String>,
    pub speaker_position: Option<String>,
    pub speaker_company: Option<String>,
    pub location: Option<String>,
    /// Which chunk produced this candidate; diagnostics only
    #[serde(skip)]
    pub chunk_index: Option<usize>,
}

/// What one chunk's response parsed into
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkSchedule {
    pub location: Option<String>,
    pub sub_events: Vec<ExtractionCandidate>,
}

/// Drives the transformer over page text, one invocation per chunk
pub struct ScheduleExtractor<C> {
    completer: C,
    max_chunk_chars: usize,
}

impl<C: ChatCompleter> ScheduleExtractor<C> {
    pub fn new(completer: C, max_chunk_chars: usize) -> Self {
        Self {
            completer,
            max_chunk_chars,
        }
    }

    /// Extract candidate schedules from page text. Inputs at or below the
    /// chunk ceiling produce exactly one invocation with chunk index 1;
    /// longer inputs are split first. Failed chunks are logged and skipped,
    /// so the returned list holds whatever succeeded, in chunk order.
    pub async fn extract_schedule(&self, event_id: Uuid, text: &str) -> Vec<ChunkSchedule> {
        let chunks = chunk_text(text, self.max_chunk_chars);
        let total = chunks.len();
        let mut schedules = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_index = i + 1;
            match self.extract_chunk(chunk, chunk_index).await {
                Ok(schedule) => schedules.push(schedule),
                Err(e) => {
                    tracing::warn!(
                        "event {}: extraction failed for chunk {}/{}: {}",
                        event_id,
                        chunk_index,
                        total,
                        e
                    );
                }
            }
        }

        schedules
    }

    /// One transformer invocation for one chunk of text
    async fn extract_chunk(
        &self,
        text: &str,
        chunk_index: usize,
    ) -> Result<ChunkSchedule, ExtractError> {
        let messages = build_messages(text);
        let raw = self
            .completer
            .complete(&messages, EXTRACTION_TEMPERATURE)
            .await
            .map_err(ExtractError::Completion)?;

        let stripped = strip_code_fences(&raw);
        let parsed: ChunkSchedule =
            serde_json::from_str(stripped).map_err(|_| ExtractError::Parse {
                chunk_index,
                raw: stripped.to_string(),
            })?;

        let sub_events = parsed
            .sub_events
            .into_iter()
            .map(|mut candidate| {
                candidate.chunk_index = Some(chunk_index);
                candidate
            })
            .collect();

        Ok(ChunkSchedule {
            location: parsed.location,
            sub_events,
        })
    }
}

fn build_messages(text: &str) -> Vec<ChatMessage> {
    let system = concat!(
        "You extract event schedules from web page text. ",
        "Respond with JSON only - no markdown, no code fences, no commentary. ",
        "The JSON must match this schema exactly:\n",
        "{\"location\": string or null, \"subEvents\": [{\"startTime\": string or null, ",
        "\"endTime\": string or null, \"title\": string, \"speaker\": string or null, ",
        "\"speakerPosition\": string or null, \"speakerCompany\": string or null, ",
        "\"location\": string or null}]}\n",
        "Times must be bare 12-hour clock tokens like \"9am\" or \"4:30pm\", ",
        "with no date and no timezone. ",
        "Use null for anything the text does not state.",
    );

    vec![
        ChatMessage::system(system),
        ChatMessage::user(format!("Page text:\n\n{}", text)),
    ]
}

/// The model is told not to use markdown; it sometimes does anyway. Strip a
/// leading fence line (with or without an info string) and a trailing fence.
fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
    }

    text = text.trim_end();
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    text.trim()
}
