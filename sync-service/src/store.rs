//! Persistence interface consumed by the sync orchestrator and the
//! enrichment pipeline.
//!
//! The core is written against [`EventStore`] so the pipeline logic can be
//! exercised without a database; [`PgStore`] is the Postgres-backed
//! implementation used by the service binary.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use shared::{Event, Profile, SubEvent};
use uuid::Uuid;

use crate::db::{self, DbPool};

/// Fields for a new event row
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub owner_id: String,
    pub provider_event_id: String,
    pub title: String,
    pub start_date: NaiveDate,
    pub location: Option<String>,
    pub link: Option<String>,
}

/// Replacement values for all mutable fields of an existing event row
#[derive(Debug, Clone)]
pub struct EventChanges {
    pub title: String,
    pub start_date: NaiveDate,
    pub location: Option<String>,
    pub link: Option<String>,
}

/// Fields for a new sub-event row
#[derive(Debug, Clone)]
pub struct NewSubEvent {
    pub event_id: Uuid,
    pub name: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub speaker: Option<String>,
    pub speaker_position: Option<String>,
    pub speaker_company: Option<String>,
    pub location: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait EventStore {
    async fn find_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    /// Persist a refreshed access token and its expiry
    async fn update_profile_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        expiry: DateTime<Utc>,
    ) -> Result<()>;

    async fn find_event(&self, owner_id: &str, provider_event_id: &str)
        -> Result<Option<Event>>;

    async fn insert_event(&self, new: NewEvent) -> Result<Event>;

    async fn update_event(&self, id: Uuid, changes: EventChanges) -> Result<Event>;

    async fn update_event_location(&self, id: Uuid, location: &str) -> Result<()>;

    async fn insert_sub_event(&self, new: NewSubEvent) -> Result<SubEvent>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EventStore for PgStore {
    async fn find_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let mut conn = self.pool.get().await.context("Failed to get DB connection")?;
        db::profiles::find_by_user_id(&mut conn, user_id).await
    }

    async fn update_profile_tokens(
        &self,
        user_id: &str,
        access_token: &str,
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.pool.get().await.context("Failed to get DB connection")?;
        db::profiles::update_tokens(&mut conn, user_id, access_token, expiry).await
    }

    async fn find_event(
        &self,
        owner_id: &str,
        provider_event_id: &str,
    ) -> Result<Option<Event>> {
        let mut conn = self.pool.get().await.context("Failed to get DB connection")?;
        db::events::find_by_key(&mut conn, owner_id, provider_event_id).await
    }

    async fn insert_event(&self, new: NewEvent) -> Result<Event> {
        let mut conn = self.pool.get().await.context("Failed to get DB connection")?;
        db::events::insert(
            &mut conn,
            &new.owner_id,
            &new.provider_event_id,
            &new.title,
            new.start_date,
            new.location.as_deref(),
            new.link.as_deref(),
        )
        .await
    }

    async fn update_event(&self, id: Uuid, changes: EventChanges) -> Result<Event> {
        let mut conn = self.pool.get().await.context("Failed to get DB connection")?;
        db::events::update(
            &mut conn,
            id,
            &changes.title,
            changes.start_date,
            changes.location.as_deref(),
            changes.link.as_deref(),
        )
        .await
    }

    async fn update_event_location(&self, id: Uuid, location: &str) -> Result<()> {
        let mut conn = self.pool.get().await.context("Failed to get DB connection")?;
        db::events::update_location(&mut conn, id, location).await
    }

    async fn insert_sub_event(&self, new: NewSubEvent) -> Result<SubEvent> {
        let mut conn = self.pool.get().await.context("Failed to get DB connection")?;
        db::sub_events::insert(&mut conn, &new).await
    }
}

/// In-memory store for pipeline and orchestrator tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use anyhow::anyhow;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStore {
        pub profiles: Mutex<Vec<Profile>>,
        pub events: Mutex<Vec<Event>>,
        pub sub_events: Mutex<Vec<SubEvent>>,
        /// sub-event names whose insert should fail, for row-level failure
        /// isolation tests
        pub failing_sub_event_names: Mutex<HashSet<String>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_profile(profile: Profile) -> Self {
            let store = Self::default();
            store.profiles.lock().unwrap().push(profile);
            store
        }

        pub fn event_by_id(&self, id: Uuid) -> Option<Event> {
            self.events.lock().unwrap().iter().find(|e| e.id == id).cloned()
        }
    }

    impl EventStore for MemoryStore {
        async fn find_profile(&self, user_id: &str) -> Result<Option<Profile>> {
            Ok(self
                .profiles
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.user_id == user_id)
                .cloned())
        }

        async fn update_profile_tokens(
            &self,
            user_id: &str,
            access_token: &str,
            expiry: DateTime<Utc>,
        ) -> Result<()> {
            let mut profiles = self.profiles.lock().unwrap();
            let profile = profiles
                .iter_mut()
                .find(|p| p.user_id == user_id)
                .ok_or_else(|| anyhow!("no profile {}", user_id))?;
            profile.access_token = Some(access_token.to_string());
            profile.token_expiry = Some(expiry);
            Ok(())
        }

        async fn find_event(
            &self,
            owner_id: &str,
            provider_event_id: &str,
        ) -> Result<Option<Event>> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.owner_id == owner_id && e.provider_event_id == provider_event_id)
                .cloned())
        }

        async fn insert_event(&self, new: NewEvent) -> Result<Event> {
            let now = Utc::now();
            let event = Event {
                id: Uuid::new_v4(),
                owner_id: new.owner_id,
                provider_event_id: new.provider_event_id,
                title: new.title,
                start_date: new.start_date,
                location: new.location,
                link: new.link,
                created_at: now,
                updated_at: now,
            };
            self.events.lock().unwrap().push(event.clone());
            Ok(event)
        }

        async fn update_event(&self, id: Uuid, changes: EventChanges) -> Result<Event> {
            let mut events = self.events.lock().unwrap();
            let event = events
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| anyhow!("no event {}", id))?;
            event.title = changes.title;
            event.start_date = changes.start_date;
            event.location = changes.location;
            event.link = changes.link;
            event.updated_at = Utc::now();
            Ok(event.clone())
        }

        async fn update_event_location(&self, id: Uuid, location: &str) -> Result<()> {
            let mut events = self.events.lock().unwrap();
            let event = events
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| anyhow!("no event {}", id))?;
            event.location = Some(location.to_string());
            Ok(())
        }

        async fn insert_sub_event(&self, new: NewSubEvent) -> Result<SubEvent> {
            if self.failing_sub_event_names.lock().unwrap().contains(&new.name) {
                return Err(anyhow!("simulated insert failure for {}", new.name));
            }
            let row = SubEvent {
                id: Uuid::new_v4(),
                event_id: new.event_id,
                name: new.name,
                start_time: new.start_time,
                end_time: new.end_time,
                speaker: new.speaker,
                speaker_position: new.speaker_position,
                speaker_company: new.speaker_company,
                location: new.location,
                created_at: Utc::now(),
            };
            self.sub_events.lock().unwrap().push(row.clone());
            Ok(row)
        }
    }
}
