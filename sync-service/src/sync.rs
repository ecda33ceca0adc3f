//! Calendar sync orchestrator.
//!
//! One invocation walks the state machine
//! `TokenCheck -> TokenRefresh? -> FetchWindow -> PerEventUpsert* ->
//! EnrichIfChanged? -> Done`, strictly sequentially: one event at a time,
//! one I/O operation in flight at a time. Token and provider failures
//! abort the run; everything downstream degrades per event and is
//! reported through logs only, so the caller sees a binary outcome.

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use shared::{Event, Profile};

use crate::enrich::EnrichmentPipeline;
use crate::error::SyncError;
use crate::google::{CalendarProvider, ProviderEvent, ProviderEventStart, TokenRefresher};
use crate::llm::ChatCompleter;
use crate::scrape::PageFetcher;
use crate::store::{EventChanges, EventStore, NewEvent};

const DEFAULT_MAX_RESULTS: u32 = 250;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("valid URL regex"));

/// Time window a sync covers
#[derive(Debug, Clone, Copy)]
pub struct SyncWindow {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
}

impl SyncWindow {
    /// `[now, now + days]`
    pub fn from_now(days: i64) -> Self {
        let now = Utc::now();
        Self {
            time_min: now,
            time_max: now + Duration::days(days),
        }
    }
}

/// Result of a successful sync run. Collapses all enrichment outcomes into
/// one success; per-event status goes to the log stream.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub window: SyncWindow,
    pub events_processed: usize,
    pub message: String,
}

pub struct CalendarSync<S, P, R, F, C> {
    store: S,
    provider: P,
    refresher: R,
    pipeline: EnrichmentPipeline<F, C>,
    window_days: i64,
}

impl<S, P, R, F, C> CalendarSync<S, P, R, F, C>
where
    S: EventStore,
    P: CalendarProvider,
    R: TokenRefresher,
    F: PageFetcher,
    C: ChatCompleter,
{
    pub fn new(
        store: S,
        provider: P,
        refresher: R,
        pipeline: EnrichmentPipeline<F, C>,
        window_days: i64,
    ) -> Self {
        Self {
            store,
            provider,
            refresher,
            pipeline,
            window_days,
        }
    }

    /// Run one full sync for a user. `window` defaults to
    /// `[now, now + window_days]`.
    pub async fn run(
        &self,
        user_id: &str,
        window: Option<SyncWindow>,
    ) -> Result<SyncSummary, SyncError> {
        // TokenCheck
        let profile = self
            .store
            .find_profile(user_id)
            .await?
            .ok_or_else(|| SyncError::NoProfile {
                user_id: user_id.to_string(),
            })?;

        let Some(stored_token) = profile.access_token.clone() else {
            return Err(SyncError::NoToken {
                user_id: user_id.to_string(),
            });
        };

        // TokenRefresh (only when the stored expiry is in the past)
        let access_token = self.ensure_fresh_token(&profile, stored_token).await?;

        // FetchWindow
        let window = window.unwrap_or_else(|| SyncWindow::from_now(self.window_days));
        let provider_events = self
            .provider
            .list_events(
                &access_token,
                window.time_min,
                window.time_max,
                DEFAULT_MAX_RESULTS,
            )
            .await?;

        tracing::info!(
            "user {}: provider returned {} events for window {} - {}",
            user_id,
            provider_events.len(),
            window.time_min,
            window.time_max
        );

        // PerEventUpsert + EnrichIfChanged, one event at a time
        let mut events_processed = 0;
        for provider_event in provider_events {
            let Some((event, link_changed)) =
                self.upsert_event(user_id, provider_event).await?
            else {
                continue;
            };
            events_processed += 1;

            if link_changed && event.link.is_some() {
                match self.pipeline.run(&self.store, &event).await {
                    Ok(report) => tracing::info!(
                        "event {}: enriched from link ({} sub-events inserted, {} failed)",
                        event.id,
                        report.sub_events_inserted,
                        report.sub_events_failed
                    ),
                    Err(e) => {
                        tracing::warn!("event {}: enrichment failed: {:#}", event.id, e);
                    }
                }
            }
        }

        // Done
        let message = format!(
            "Synced calendar events from {} to {}",
            window.time_min.format("%Y-%m-%d"),
            window.time_max.format("%Y-%m-%d")
        );

        Ok(SyncSummary {
            window,
            events_processed,
            message,
        })
    }

    async fn ensure_fresh_token(
        &self,
        profile: &Profile,
        stored: String,
    ) -> Result<String, SyncError> {
        let expired = profile
            .token_expiry
            .map(|expiry| expiry < Utc::now())
            .unwrap_or(false);
        if !expired {
            return Ok(stored);
        }

        let refresh_token = profile
            .refresh_token
            .as_deref()
            .ok_or_else(|| SyncError::Refresh("no refresh token stored".to_string()))?;

        tracing::debug!("user {}: access token expired, refreshing", profile.user_id);
        let refreshed = self.refresher.refresh_access_token(refresh_token).await?;

        self.store
            .update_profile_tokens(
                &profile.user_id,
                &refreshed.access_token,
                refreshed.expires_at,
            )
            .await?;

        Ok(refreshed.access_token)
    }

    /// Insert or update the local row for one provider event. Returns the
    /// row plus whether its external link is new or changed; `None` when
    /// the provider event is malformed and was skipped.
    async fn upsert_event(
        &self,
        user_id: &str,
        provider_event: ProviderEvent,
    ) -> Result<Option<(Event, bool)>, SyncError> {
        let (Some(provider_id), Some(title)) =
            (provider_event.id, provider_event.summary)
        else {
            tracing::debug!("user {}: skipping provider event without id or title", user_id);
            return Ok(None);
        };

        let Some(start_date) = derive_start_date(provider_event.start.as_ref()) else {
            tracing::debug!(
                "user {}: skipping provider event {} without a start",
                user_id,
                provider_id
            );
            return Ok(None);
        };

        let link = extract_first_url(provider_event.description.as_deref());

        let existing = self.store.find_event(user_id, &provider_id).await?;
        let result = match existing {
            Some(old) => {
                let link_changed = old.link != link;
                let updated = self
                    .store
                    .update_event(
                        old.id,
                        EventChanges {
                            title,
                            start_date,
                            location: provider_event.location,
                            link,
                        },
                    )
                    .await?;
                (updated, link_changed)
            }
            None => {
                let inserted = self
                    .store
                    .insert_event(NewEvent {
                        owner_id: user_id.to_string(),
                        provider_event_id: provider_id,
                        title,
                        start_date,
                        location: provider_event.location,
                        link: link.clone(),
                    })
                    .await?;
                // a brand-new row with a link counts as changed
                (inserted, link.is_some())
            }
        };

        Ok(Some(result))
    }
}

/// Date-only start value: a timestamp is truncated to its local calendar
/// date, discarding time-of-day; a bare date passes through.
fn derive_start_date(start: Option<&ProviderEventStart>) -> Option<NaiveDate> {
    let start = start?;
    if let Some(date_time) = start.date_time {
        return Some(date_time.with_timezone(&Local).date_naive());
    }
    start.date
}

/// First HTTP(S) URL in the event description, if any. First match only;
/// additional links are ignored.
fn extract_first_url(description: Option<&str>) -> Option<String> {
    URL_RE
        .find(description?)
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::CHUNK_MAX_CHARS;
    use crate::error::ScrapeError;
    use crate::extract::ScheduleExtractor;
    use crate::google::RefreshedToken;
    use crate::llm::ChatMessage;
    use crate::store::testing::MemoryStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    struct StaticProvider {
        events: Vec<ProviderEvent>,
        fail: bool,
    }

    impl CalendarProvider for StaticProvider {
        async fn list_events(
            &self,
            _access_token: &str,
            _time_min: DateTime<Utc>,
            _time_max: DateTime<Utc>,
            _max_results: u32,
        ) -> Result<Vec<ProviderEvent>, SyncError> {
            if self.fail {
                return Err(SyncError::ProviderFetch("boom".to_string()));
            }
            Ok(self.events.clone())
        }
    }

    struct StaticRefresher {
        fail: bool,
    }

    impl StaticRefresher {
        fn new(fail: bool) -> Self {
            Self { fail }
        }
    }

    impl TokenRefresher for StaticRefresher {
        async fn refresh_access_token(
            &self,
            _refresh_token: &str,
        ) -> Result<RefreshedToken, SyncError> {
            if self.fail {
                return Err(SyncError::Refresh("consent revoked".to_string()));
            }
            Ok(RefreshedToken {
                access_token: "fresh-token".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
            })
        }
    }

    /// Counts fetches: one fetch == one enrichment invocation
    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl PageFetcher for CountingFetcher {
        async fn fetch_text(&self, _url: &str, _timeout_ms: u64) -> Result<String, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ScrapeError::Fetch("origin down".to_string()));
            }
            Ok("agenda text".to_string())
        }
    }

    struct StaticCompleter;

    impl ChatCompleter for StaticCompleter {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
        ) -> anyhow::Result<String> {
            Ok(r#"{"location":"Expo Hall","subEvents":[{"title":"Keynote","speaker":"Ada","startTime":"9am","endTime":"10am"}]}"#
                .to_string())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        fetch_calls: Arc<AtomicUsize>,
    }

    fn profile(access: Option<&str>, refresh: Option<&str>, expiry: Option<DateTime<Utc>>) -> Profile {
        let now = Utc::now();
        Profile {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            access_token: access.map(String::from),
            refresh_token: refresh.map(String::from),
            token_expiry: expiry,
            sync_status: "pending".to_string(),
            last_synced: None,
            last_sync_error: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn valid_profile() -> Profile {
        profile(
            Some("stored-token"),
            Some("refresh-token"),
            Some(Utc::now() + Duration::hours(1)),
        )
    }

    fn provider_event(id: &str, title: &str, description: Option<&str>) -> ProviderEvent {
        ProviderEvent {
            id: Some(id.to_string()),
            summary: Some(title.to_string()),
            description: description.map(String::from),
            location: Some("Berlin".to_string()),
            start: Some(ProviderEventStart {
                date_time: None,
                date: NaiveDate::from_ymd_opt(2024, 6, 1),
            }),
        }
    }

    fn sync_with(
        store: Arc<MemoryStore>,
        provider: StaticProvider,
        refresher: StaticRefresher,
        fetch_fail: bool,
    ) -> (
        CalendarSync<Arc<MemoryStore>, StaticProvider, StaticRefresher, CountingFetcher, StaticCompleter>,
        Harness,
    ) {
        let fetch_calls = Arc::new(AtomicUsize::new(0));
        let fetcher = CountingFetcher {
            calls: fetch_calls.clone(),
            fail: fetch_fail,
        };
        let pipeline = EnrichmentPipeline::new(
            fetcher,
            ScheduleExtractor::new(StaticCompleter, CHUNK_MAX_CHARS),
            5000,
        );
        let sync = CalendarSync::new(store.clone(), provider, refresher, pipeline, 30);
        (
            sync,
            Harness {
                store,
                fetch_calls,
            },
        )
    }

    impl EventStore for Arc<MemoryStore> {
        async fn find_profile(&self, user_id: &str) -> anyhow::Result<Option<Profile>> {
            (**self).find_profile(user_id).await
        }

        async fn update_profile_tokens(
            &self,
            user_id: &str,
            access_token: &str,
            expiry: DateTime<Utc>,
        ) -> anyhow::Result<()> {
            (**self).update_profile_tokens(user_id, access_token, expiry).await
        }

        async fn find_event(
            &self,
            owner_id: &str,
            provider_event_id: &str,
        ) -> anyhow::Result<Option<Event>> {
            (**self).find_event(owner_id, provider_event_id).await
        }

        async fn insert_event(&self, new: NewEvent) -> anyhow::Result<Event> {
            (**self).insert_event(new).await
        }

        async fn update_event(&self, id: Uuid, changes: EventChanges) -> anyhow::Result<Event> {
            (**self).update_event(id, changes).await
        }

        async fn update_event_location(&self, id: Uuid, location: &str) -> anyhow::Result<()> {
            (**self).update_event_location(id, location).await
        }

        async fn insert_sub_event(
            &self,
            new: crate::store::NewSubEvent,
        ) -> anyhow::Result<shared::SubEvent> {
            (**self).insert_sub_event(new).await
        }
    }

    #[tokio::test]
    async fn test_missing_profile_aborts() {
        let store = Arc::new(MemoryStore::new());
        let (sync, _) = sync_with(
            store,
            StaticProvider { events: vec![], fail: false },
            StaticRefresher::new(false),
            false,
        );

        let err = sync.run("user-1", None).await.unwrap_err();
        assert!(matches!(err, SyncError::NoProfile { .. }));
    }

    #[tokio::test]
    async fn test_missing_access_token_aborts() {
        let store = Arc::new(MemoryStore::with_profile(profile(None, Some("r"), None)));
        let (sync, _) = sync_with(
            store,
            StaticProvider { events: vec![], fail: false },
            StaticRefresher::new(false),
            false,
        );

        let err = sync.run("user-1", None).await.unwrap_err();
        assert!(matches!(err, SyncError::NoToken { .. }));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_stored() {
        let store = Arc::new(MemoryStore::with_profile(profile(
            Some("stale"),
            Some("refresh-token"),
            Some(Utc::now() - Duration::hours(1)),
        )));
        let (sync, harness) = sync_with(
            store,
            StaticProvider { events: vec![], fail: false },
            StaticRefresher::new(false),
            false,
        );

        sync.run("user-1", None).await.unwrap();

        let profiles = harness.store.profiles.lock().unwrap();
        assert_eq!(profiles[0].access_token.as_deref(), Some("fresh-token"));
        assert!(profiles[0].token_expiry.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_valid_token_skips_refresh() {
        let store = Arc::new(MemoryStore::with_profile(valid_profile()));
        let refresher = StaticRefresher::new(true); // would fail if called
        let (sync, _) = sync_with(
            store,
            StaticProvider { events: vec![], fail: false },
            refresher,
            false,
        );

        sync.run("user-1", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_failure_aborts_sync() {
        let store = Arc::new(MemoryStore::with_profile(profile(
            Some("stale"),
            Some("refresh-token"),
            Some(Utc::now() - Duration::hours(1)),
        )));
        let (sync, harness) = sync_with(
            store,
            StaticProvider {
                events: vec![provider_event("e1", "DevConf", None)],
                fail: false,
            },
            StaticRefresher::new(true),
            false,
        );

        let err = sync.run("user-1", None).await.unwrap_err();
        assert!(matches!(err, SyncError::Refresh(_)));
        // nothing downstream ran
        assert!(harness.store.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_aborts_sync() {
        let store = Arc::new(MemoryStore::with_profile(valid_profile()));
        let (sync, _) = sync_with(
            store,
            StaticProvider { events: vec![], fail: true },
            StaticRefresher::new(false),
            false,
        );

        let err = sync.run("user-1", None).await.unwrap_err();
        assert!(matches!(err, SyncError::ProviderFetch(_)));
    }

    #[tokio::test]
    async fn test_malformed_provider_events_skipped_silently() {
        let store = Arc::new(MemoryStore::with_profile(valid_profile()));
        let no_id = ProviderEvent {
            id: None,
            summary: Some("ghost".to_string()),
            ..Default::default()
        };
        let no_title = ProviderEvent {
            id: Some("e0".to_string()),
            ..Default::default()
        };
        let no_start = ProviderEvent {
            id: Some("e2".to_string()),
            summary: Some("undated".to_string()),
            ..Default::default()
        };
        let (sync, harness) = sync_with(
            store,
            StaticProvider {
                events: vec![no_id, no_title, no_start, provider_event("e1", "DevConf", None)],
                fail: false,
            },
            StaticRefresher::new(false),
            false,
        );

        let summary = sync.run("user-1", None).await.unwrap();
        assert_eq!(summary.events_processed, 1);
        assert_eq!(harness.store.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_updates_existing_row_by_key() {
        let store = Arc::new(MemoryStore::with_profile(valid_profile()));
        let (sync, harness) = sync_with(
            store.clone(),
            StaticProvider {
                events: vec![provider_event("e1", "DevConf", None)],
                fail: false,
            },
            StaticRefresher::new(false),
            false,
        );
        sync.run("user-1", None).await.unwrap();

        let (sync, _) = sync_with(
            store,
            StaticProvider {
                events: vec![provider_event("e1", "DevConf 2024", None)],
                fail: false,
            },
            StaticRefresher::new(false),
            false,
        );
        sync.run("user-1", None).await.unwrap();

        let events = harness.store.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "DevConf 2024");
    }

    #[tokio::test]
    async fn test_unchanged_link_enriches_at_most_once() {
        let store = Arc::new(MemoryStore::with_profile(valid_profile()));
        let event = provider_event(
            "e1",
            "DevConf",
            Some("Agenda at https://devconf.example/agenda - see you there"),
        );

        let (sync, harness) = sync_with(
            store.clone(),
            StaticProvider { events: vec![event.clone()], fail: false },
            StaticRefresher::new(false),
            false,
        );
        sync.run("user-1", None).await.unwrap();
        assert_eq!(harness.fetch_calls.load(Ordering::SeqCst), 1);

        // second sync, same link: no re-enrichment
        let (sync, harness2) = sync_with(
            store,
            StaticProvider { events: vec![event], fail: false },
            StaticRefresher::new(false),
            false,
        );
        sync.run("user-1", None).await.unwrap();
        assert_eq!(harness2.fetch_calls.load(Ordering::SeqCst), 0);

        // the one enrichment that did run persisted sub-events
        assert_eq!(harness2.store.sub_events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_link_triggers_re_enrichment() {
        let store = Arc::new(MemoryStore::with_profile(valid_profile()));
        let (sync, _) = sync_with(
            store.clone(),
            StaticProvider {
                events: vec![provider_event("e1", "DevConf", Some("https://a.example/x"))],
                fail: false,
            },
            StaticRefresher::new(false),
            false,
        );
        sync.run("user-1", None).await.unwrap();

        let (sync, harness) = sync_with(
            store,
            StaticProvider {
                events: vec![provider_event("e1", "DevConf", Some("https://b.example/y"))],
                fail: false,
            },
            StaticRefresher::new(false),
            false,
        );
        sync.run("user-1", None).await.unwrap();
        assert_eq!(harness.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_event_without_link_is_synced_not_enriched() {
        let store = Arc::new(MemoryStore::with_profile(valid_profile()));
        let (sync, harness) = sync_with(
            store,
            StaticProvider {
                events: vec![provider_event("e1", "DevConf", Some("no links here"))],
                fail: false,
            },
            StaticRefresher::new(false),
            false,
        );

        let summary = sync.run("user-1", None).await.unwrap();
        assert_eq!(summary.events_processed, 1);
        assert_eq!(harness.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enrichment_failure_does_not_fail_sync() {
        let store = Arc::new(MemoryStore::with_profile(valid_profile()));
        let (sync, harness) = sync_with(
            store,
            StaticProvider {
                events: vec![
                    provider_event("e1", "DevConf", Some("https://down.example/agenda")),
                    provider_event("e2", "RustFest", None),
                ],
                fail: false,
            },
            StaticRefresher::new(false),
            true, // every fetch fails
        );

        let summary = sync.run("user-1", None).await.unwrap();
        // both events synced despite the failed enrichment
        assert_eq!(summary.events_processed, 2);
        assert_eq!(harness.store.events.lock().unwrap().len(), 2);
        assert!(harness.store.sub_events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_extract_first_url_takes_first_match_only() {
        let description = "RSVP at https://first.example/a then https://second.example/b";
        assert_eq!(
            extract_first_url(Some(description)).as_deref(),
            Some("https://first.example/a")
        );
        assert_eq!(extract_first_url(Some("plain text")), None);
        assert_eq!(extract_first_url(None), None);
    }

    #[test]
    fn test_extract_first_url_stops_at_html_delimiters() {
        let description = r#"<a href="https://linked.example/agenda">agenda</a>"#;
        assert_eq!(
            extract_first_url(Some(description)).as_deref(),
            Some("https://linked.example/agenda")
        );
    }

    #[test]
    fn test_derive_start_date_truncates_timestamp() {
        let instant = Utc.with_ymd_and_hms(2024, 6, 1, 18, 45, 0).unwrap();
        let start = ProviderEventStart {
            date_time: Some(instant),
            date: None,
        };
        assert_eq!(
            derive_start_date(Some(&start)),
            Some(instant.with_timezone(&Local).date_naive())
        );
    }

    #[test]
    fn test_derive_start_date_passes_bare_date_through() {
        let start = ProviderEventStart {
            date_time: None,
            date: NaiveDate::from_ymd_opt(2024, 6, 2),
        };
        assert_eq!(derive_start_date(Some(&start)), NaiveDate::from_ymd_opt(2024, 6, 2));
        assert_eq!(derive_start_date(None), None);
    }
}
