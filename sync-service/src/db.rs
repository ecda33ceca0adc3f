use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};
use shared::{Event, Profile, SubEvent};
use uuid::Uuid;

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url.to_string(),
        manager_config,
    );
    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

// Profile database operations
pub mod profiles {
    use super::*;

    pub async fn find_by_user_id(
        conn: &mut AsyncPgConnection,
        user: &str,
    ) -> anyhow::Result<Option<Profile>> {
        use crate::schema::profiles::dsl::*;

        let profile = profiles
            .filter(user_id.eq(user))
            .first::<Profile>(conn)
            .await
            .optional()?;

        Ok(profile)
    }

    pub async fn list_active(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<Profile>> {
        use crate::schema::profiles::dsl::*;

        let result = profiles
            .filter(is_active.eq(true))
            .filter(refresh_token.is_not_null())
            .order_by(last_synced.asc().nulls_first())
            .load::<Profile>(conn)
            .await?;

        Ok(result)
    }

    pub async fn update_tokens(
        conn: &mut AsyncPgConnection,
        user: &str,
        new_access_token: &str,
        new_expiry: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        use crate::schema::profiles::dsl::*;

        diesel::update(profiles.filter(user_id.eq(user)))
            .set((
                access_token.eq(Some(new_access_token)),
                token_expiry.eq(Some(new_expiry)),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn update_sync_status(
        conn: &mut AsyncPgConnection,
        user: &str,
        status: &str,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        use crate::schema::profiles::dsl::*;

        diesel::update(profiles.filter(user_id.eq(user)))
            .set((
                sync_status.eq(status),
                last_sync_error.eq(error),
                last_synced.eq(Some(Utc::now())),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }
}

// Event database operations
pub mod events {
    use super::*;

    pub async fn find_by_key(
        conn: &mut AsyncPgConnection,
        owner: &str,
        provider_id: &str,
    ) -> anyhow::Result<Option<Event>> {
        use crate::schema::events::dsl::*;

        let event = events
            .filter(owner_id.eq(owner))
            .filter(provider_event_id.eq(provider_id))
            .first::<Event>(conn)
            .await
            .optional()?;

        Ok(event)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        owner: &str,
        provider_id: &str,
        event_title: &str,
        event_start: NaiveDate,
        event_location: Option<&str>,
        event_link: Option<&str>,
    ) -> anyhow::Result<Event> {
        use crate::schema::events::dsl::*;

        let now = Utc::now();
        let event = diesel::insert_into(events)
            .values((
                id.eq(Uuid::new_v4()),
                owner_id.eq(owner),
                provider_event_id.eq(provider_id),
                title.eq(event_title),
                start_date.eq(event_start),
                location.eq(event_location),
                link.eq(event_link),
                created_at.eq(now),
                updated_at.eq(now),
            ))
            .get_result::<Event>(conn)
            .await?;

        Ok(event)
    }

    /// Overwrite all mutable fields of an existing event row
    pub async fn update(
        conn: &mut AsyncPgConnection,
        event_id: Uuid,
        event_title: &str,
        event_start: NaiveDate,
        event_location: Option<&str>,
        event_link: Option<&str>,
    ) -> anyhow::Result<Event> {
        use crate::schema::events::dsl::*;

        let event = diesel::update(events.filter(id.eq(event_id)))
            .set((
                title.eq(event_title),
                start_date.eq(event_start),
                location.eq(event_location),
                link.eq(event_link),
                updated_at.eq(Utc::now()),
            ))
            .get_result::<Event>(conn)
            .await?;

        Ok(event)
    }

    pub async fn update_location(
        conn: &mut AsyncPgConnection,
        event_id: Uuid,
        new_location: &str,
    ) -> anyhow::Result<()> {
        use crate::schema::events::dsl::*;

        diesel::update(events.filter(id.eq(event_id)))
            .set((location.eq(Some(new_location)), updated_at.eq(Utc::now())))
            .execute(conn)
            .await?;

        Ok(())
    }
}

// Sub-event database operations
pub mod sub_events {
    use super::*;
    use crate::store::NewSubEvent;

    /// Append-only: sub-events have no natural identity to upsert by, so
    /// every call inserts a fresh row.
    pub async fn insert(
        conn: &mut AsyncPgConnection,
        new: &NewSubEvent,
    ) -> anyhow::Result<SubEvent> {
        use crate::schema::sub_events::dsl::*;

        let row = diesel::insert_into(sub_events)
            .values((
                id.eq(Uuid::new_v4()),
                event_id.eq(new.event_id),
                name.eq(new.name.as_str()),
                start_time.eq(new.start_time.as_deref()),
                end_time.eq(new.end_time.as_deref()),
                speaker.eq(new.speaker.as_deref()),
                speaker_position.eq(new.speaker_position.as_deref()),
                speaker_company.eq(new.speaker_company.as_deref()),
                location.eq(new.location.as_deref()),
                created_at.eq(Utc::now()),
            ))
            .get_result::<SubEvent>(conn)
            .await?;

        Ok(row)
    }

    pub async fn list_for_event(
        conn: &mut AsyncPgConnection,
        parent_id: Uuid,
    ) -> anyhow::Result<Vec<SubEvent>> {
        use crate::schema::sub_events::dsl::*;

        let rows = sub_events
            .filter(event_id.eq(parent_id))
            .order_by(created_at.asc())
            .load::<SubEvent>(conn)
            .await?;

        Ok(rows)
    }
}
