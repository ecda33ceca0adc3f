use anyhow::{Context, Result};
use tokio::time::{interval, Duration};

use shared::SyncStatus;
use sync_service::chunk::CHUNK_MAX_CHARS;
use sync_service::config::SyncConfig;
use sync_service::db::{self, DbPool};
use sync_service::enrich::EnrichmentPipeline;
use sync_service::extract::ScheduleExtractor;
use sync_service::google::{GoogleCalendarClient, GoogleTokenRefresher};
use sync_service::llm::OpenAiChat;
use sync_service::scrape::HttpPageFetcher;
use sync_service::store::PgStore;
use sync_service::sync::CalendarSync;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    tracing::info!("Starting calendar sync service");

    let config = SyncConfig::from_env()?;
    let pool = db::establish_connection_pool(&config.database_url)?;

    let mut interval = interval(Duration::from_secs(config.sync_interval_seconds));

    loop {
        interval.tick().await;

        if let Err(e) = sync_all_profiles(&pool, &config).await {
            tracing::error!("Sync pass failed: {}", e);
        }
    }
}

/// Sync every active profile, one at a time. A failing profile is recorded
/// and skipped; the pass continues with the rest.
async fn sync_all_profiles(pool: &DbPool, config: &SyncConfig) -> Result<()> {
    let mut conn = pool.get().await.context("Failed to get DB connection")?;

    let profiles = db::profiles::list_active(&mut conn).await?;
    tracing::info!("Found {} active profiles", profiles.len());

    for profile in profiles {
        db::profiles::update_sync_status(
            &mut conn,
            &profile.user_id,
            SyncStatus::Syncing.as_str(),
            None,
        )
        .await?;

        let sync = build_sync(pool.clone(), config);
        match sync.run(&profile.user_id, None).await {
            Ok(summary) => {
                tracing::info!(
                    "user {}: {} ({} events)",
                    profile.user_id,
                    summary.message,
                    summary.events_processed
                );
                db::profiles::update_sync_status(
                    &mut conn,
                    &profile.user_id,
                    SyncStatus::Success.as_str(),
                    None,
                )
                .await?;
            }
            Err(e) => {
                tracing::error!("user {}: sync failed: {}", profile.user_id, e);
                db::profiles::update_sync_status(
                    &mut conn,
                    &profile.user_id,
                    SyncStatus::Failed.as_str(),
                    Some(&e.to_string()),
                )
                .await?;
            }
        }
    }

    Ok(())
}

fn build_sync(
    pool: DbPool,
    config: &SyncConfig,
) -> CalendarSync<PgStore, GoogleCalendarClient, GoogleTokenRefresher, HttpPageFetcher, OpenAiChat>
{
    let extractor = ScheduleExtractor::new(
        OpenAiChat::new(config.openai_api_key.clone(), config.openai_model.clone()),
        CHUNK_MAX_CHARS,
    );
    let pipeline = EnrichmentPipeline::new(
        HttpPageFetcher::new(),
        extractor,
        config.scrape_timeout_ms,
    );

    CalendarSync::new(
        PgStore::new(pool),
        GoogleCalendarClient::new(),
        GoogleTokenRefresher::new(
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
        ),
        pipeline,
        config.sync_window_days,
    )
}
