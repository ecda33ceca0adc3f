//! Google API clients: calendar event listing and OAuth token refresh.
//!
//! Both are thin reqwest wrappers behind traits so the orchestrator can be
//! tested without the network. Token *acquisition* (the consent flow) is
//! not handled here; profiles arrive with a refresh token already stored.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::SyncError;

const CALENDAR_EVENTS_URL: &str =
    "https://www.googleapis.com/calendar/v3/calendars/primary/events";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// One event as returned by the calendar provider. Everything is optional;
/// the orchestrator decides what is usable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderEvent {
    pub id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<ProviderEventStart>,
}

/// Either a full timestamp or a bare date, per the provider's schema
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEventStart {
    pub date_time: Option<DateTime<Utc>>,
    pub date: Option<NaiveDate>,
}

#[allow(async_fn_in_trait)]
pub trait CalendarProvider {
    /// List events in `[time_min, time_max]`. A transport error or a
    /// response without an `items` array is a [`SyncError::ProviderFetch`].
    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<ProviderEvent>, SyncError>;
}

pub struct GoogleCalendarClient {
    client: reqwest::Client,
}

impl GoogleCalendarClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for GoogleCalendarClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CalendarProvider for GoogleCalendarClient {
    async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<ProviderEvent>, SyncError> {
        let response = self
            .client
            .get(CALENDAR_EVENTS_URL)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("maxResults", max_results.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::ProviderFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::ProviderFetch(format!(
                "calendar API returned status {}",
                status
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SyncError::ProviderFetch(e.to_string()))?;

        parse_events_response(payload)
    }
}

/// Pull the `items` array out of an events-list payload
fn parse_events_response(payload: serde_json::Value) -> Result<Vec<ProviderEvent>, SyncError> {
    let items = payload
        .get("items")
        .cloned()
        .ok_or_else(|| SyncError::ProviderFetch("response has no items array".to_string()))?;

    serde_json::from_value(items)
        .map_err(|e| SyncError::ProviderFetch(format!("malformed items array: {}", e)))
}

/// A freshly minted access token
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[allow(async_fn_in_trait)]
pub trait TokenRefresher {
    /// Exchange a refresh token for a new access token. Failure (revoked
    /// consent, bad client credentials) is a [`SyncError::Refresh`].
    async fn refresh_access_token(&self, refresh_token: &str)
        -> Result<RefreshedToken, SyncError>;
}

pub struct GoogleTokenRefresher {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl GoogleTokenRefresher {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenRefresher for GoogleTokenRefresher {
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshedToken, SyncError> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await
            .map_err(|e| SyncError::Refresh(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Refresh(format!(
                "token endpoint returned status {}",
                status
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Refresh(e.to_string()))?;

        let access_token = token
            .access_token
            .ok_or_else(|| SyncError::Refresh("token response has no access_token".to_string()))?;
        let expires_at = Utc::now() + chrono::Duration::seconds(token.expires_in.unwrap_or(0));

        Ok(RefreshedToken {
            access_token,
            expires_at,
        })
    }
}
