use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use sliceline_core::config::AppConfig;
use sliceline_core::flows::engine::Dispatcher;
use sliceline_core::ports::Capabilities;
use sliceline_db::{connect, migrations, DbPool, SqlSessionStore};
use sliceline_geocode::GeocodeClient;
use sliceline_storefront::{CartClient, CatalogClient, DirectoryClient, TokenCache};
use sliceline_telegram::{
    ApiError, LongPollRunner, LongPollSource, PollPolicy, TelegramClient, UserRouter,
};

use crate::reminder::TokioReminderScheduler;
use crate::worker::TurnWorker;

/// Events waiting per user before the router applies backpressure.
const USER_QUEUE_DEPTH: usize = 32;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runner: LongPollRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("messaging channel client construction failed: {0}")]
    Channel(#[from] ApiError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Wires the whole service from a validated config: pool and migrations,
/// the channel client, the commerce/geocoding clients, the dispatcher with
/// its capability bundle, and the per-user router behind the long-poll
/// runner. Nothing talks to the network until the runner starts.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let request_timeout = Duration::from_secs(config.http.timeout_secs);
    let http = reqwest::Client::builder().build().map_err(BootstrapError::HttpClient)?;

    let telegram = Arc::new(TelegramClient::new(
        config.telegram.api_base.clone(),
        config.telegram.bot_token.clone(),
        config.payments.provider_token.clone(),
        request_timeout,
    )?);

    let tokens = Arc::new(TokenCache::new(
        http.clone(),
        &config.storefront.base_url,
        config.storefront.client_id.clone(),
        config.storefront.client_secret.clone(),
        Duration::from_secs(config.storefront.token_ttl_secs),
        request_timeout,
    ));

    let reminders = TokioReminderScheduler::new(
        telegram.clone(),
        Duration::from_secs(config.reminder.delay_secs),
    );

    let caps = Capabilities {
        catalog: Arc::new(CatalogClient::new(
            http.clone(),
            &config.storefront.base_url,
            tokens.clone(),
            config.payments.currency.clone(),
            request_timeout,
        )),
        cart: Arc::new(CartClient::new(
            http.clone(),
            &config.storefront.base_url,
            tokens.clone(),
            request_timeout,
        )),
        geocoder: Arc::new(GeocodeClient::new(
            http.clone(),
            config.geocoder.base_url.clone(),
            config.geocoder.api_key.clone(),
            request_timeout,
        )),
        directory: Arc::new(DirectoryClient::new(
            http,
            &config.storefront.base_url,
            tokens,
            request_timeout,
        )),
        sessions: Arc::new(SqlSessionStore::new(db_pool.clone())),
        gateway: telegram.clone(),
        reminders: Arc::new(reminders),
        settings: config.flow_settings(),
    };

    let worker = Arc::new(TurnWorker::new(Dispatcher::new(caps)));
    let router = UserRouter::new(worker, USER_QUEUE_DEPTH);
    let source = Arc::new(LongPollSource::new(telegram, config.telegram.poll_timeout_secs));
    let runner = LongPollRunner::new(source, router, PollPolicy::default());

    info!(event_name = "system.bootstrap.ready", "application wiring complete");
    Ok(Application { config, db_pool, runner })
}

#[cfg(test)]
mod tests {
    use sliceline_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use super::bootstrap_with_config;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                bot_token: Some("123456:test-token".to_string()),
                provider_token: Some("provider-test".to_string()),
                storefront_client_id: Some("client-test".to_string()),
                storefront_client_secret: Some("secret-test".to_string()),
                geocoder_api_key: Some("geo-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[test]
    fn startup_fails_fast_without_required_credentials() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("bot_token"));
    }

    #[tokio::test]
    async fn bootstrap_connects_migrates_and_wires_the_flow() {
        let config = AppConfig::load(valid_overrides("sqlite::memory:?cache=shared"))
            .expect("overrides should satisfy validation");
        let app = bootstrap_with_config(config)
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('session_state', 'session_value')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("session tables should be available after bootstrap");
        assert_eq!(table_count, 2, "bootstrap should apply the session migrations");

        assert_eq!(app.config.menu.page_size, 6);
    }
}
