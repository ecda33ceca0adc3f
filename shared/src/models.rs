use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Calendar event struct matching database column order exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct Event {
    pub id: Uuid,
    pub owner_id: String,
    pub provider_event_id: String,
    pub title: String,
    pub start_date: NaiveDate,
    pub location: Option<String>,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A session/talk nested under an event. Time tokens are stored as the
/// free-text strings the source supplied ("9am", "4:30pm") and are never
/// parsed into absolute timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct SubEvent {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub speaker: Option<String>,
    pub speaker_position: Option<String>,
    pub speaker_company: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Stored credential + sync bookkeeping for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct Profile {
    pub id: Uuid,
    pub user_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub sync_status: String, // stored as VARCHAR: "pending", "syncing", ...
    pub last_synced: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Pending,
    Syncing,
    Success,
    Failed,
    AuthRequired,
}

impl SyncStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
            SyncStatus::AuthRequired => "auth_required",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "syncing" => Some(SyncStatus::Syncing),
            "success" => Some(SyncStatus::Success),
            "failed" => Some(SyncStatus::Failed),
            "auth_required" => Some(SyncStatus::AuthRequired),
            _ => None,
        }
    }
}

/// API response for events (hides owner id, adds child records)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub title: String,
    pub start_date: NaiveDate,
    pub location: Option<String>,
    pub link: Option<String>,
    pub sub_events: Vec<SubEvent>,
}

impl EventResponse {
    pub fn from_event(event: Event, sub_events: Vec<SubEvent>) -> Self {
        EventResponse {
            id: event.id,
            title: event.title,
            start_date: event.start_date,
            location: event.location,
            link: event.link,
            sub_events,
        }
    }
}
