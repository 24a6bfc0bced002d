//! Application state wiring the engine components together.
//!
//! The core components are generic over their ports; AppState pins them to
//! the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use flowrun_core::event::NotificationBus;
use flowrun_core::recovery::CrashRecovery;
use flowrun_core::scheduler::{WaitTracker, WaitTrackerConfig};
use flowrun_infra::config::{load_engine_config, resolve_database_url};
use flowrun_infra::credential::EnvCredentialProvider;
use flowrun_infra::event_log::JsonlEventLog;
use flowrun_infra::http::WebhookRunner;
use flowrun_infra::sqlite::pool::{default_data_dir, DatabasePool};
use flowrun_infra::sqlite::run::SqliteRunStore;
use flowrun_types::config::EngineConfig;

pub type ConcreteWaitTracker = WaitTracker<SqliteRunStore, WebhookRunner, EnvCredentialProvider>;

pub type ConcreteCrashRecovery = CrashRecovery<SqliteRunStore, JsonlEventLog, NotificationBus>;

/// Shared state of one `flowrun` process.
pub struct AppState {
    pub config: EngineConfig,
    pub data_dir: PathBuf,
    pub store: Arc<SqliteRunStore>,
    pub events: Arc<JsonlEventLog>,
    pub runner: Arc<WebhookRunner>,
    pub bus: Arc<NotificationBus>,
    pub wait_tracker: ConcreteWaitTracker,
    pub recovery: ConcreteCrashRecovery,
}

impl AppState {
    /// Load configuration, open the database and wire the components.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        let config = load_engine_config(&data_dir).await;

        let db_url = resolve_database_url(&config, &data_dir);
        let pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("opening database {db_url}"))?;

        let store = Arc::new(SqliteRunStore::new(pool));
        let events = Arc::new(JsonlEventLog::in_data_dir(&data_dir));
        let credentials = Arc::new(EnvCredentialProvider::new());
        let runner = Arc::new(
            WebhookRunner::from_config(&config.http, &config.runner)
                .context("building runner client")?,
        );
        let bus = Arc::new(NotificationBus::new(64));

        let wait_tracker = WaitTracker::new(
            Arc::clone(&store),
            Arc::clone(&runner),
            credentials,
            WaitTrackerConfig::from(&config.scheduler),
        );
        let recovery = CrashRecovery::new(
            Arc::clone(&store),
            Arc::clone(&events),
            Arc::clone(&bus),
            config.recovery.clone(),
        );

        Ok(Self {
            config,
            data_dir,
            store,
            events,
            runner,
            bus,
            wait_tracker,
            recovery,
        })
    }
}
