//! Reconciliation pipeline + background scheduling for the scouting mirror.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use scout_adapters::{FtcScoutRest, DEFAULT_BASE_URL, DEFAULT_ENRICH_WORKERS};
use scout_core::SyncSettings;
use scout_storage::{HttpClientConfig, HttpFetcher, Store};
use tokio::sync::RwLock;

mod reconciler;
mod scheduler;
#[cfg(test)]
mod testing;

pub use reconciler::{Reconciler, SyncOutcome};
pub use scheduler::Scheduler;

pub const CRATE_NAME: &str = "scout-sync";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub api_base: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub enrich_workers: usize,
    pub settings: SyncSettings,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = SyncSettings::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        Self {
            db_path: lookup("SCOUT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("scouting.db")),
            api_base: lookup("SCOUT_API_BASE").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            user_agent: lookup("SCOUT_USER_AGENT")
                .unwrap_or_else(|| "scout-mirror/0.1".to_string()),
            http_timeout_secs: number("SCOUT_HTTP_TIMEOUT_SECS").unwrap_or(10),
            enrich_workers: number("SCOUT_ENRICH_WORKERS")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_ENRICH_WORKERS)
                .max(1),
            settings: SyncSettings {
                season: lookup("SCOUT_SEASON").unwrap_or(defaults.season),
                event_code: lookup("SCOUT_EVENT_CODE").unwrap_or(defaults.event_code),
                interval_secs: number("SCOUT_SYNC_INTERVAL_SECS")
                    .unwrap_or(defaults.interval_secs)
                    .max(1),
            },
        }
    }
}

/// Shared, runtime-mutable season/event/interval selection.
///
/// Passes take one [`SettingsHandle::snapshot`] at their start and never look again.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    inner: Arc<RwLock<SyncSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub async fn snapshot(&self) -> SyncSettings {
        self.inner.read().await.clone()
    }

    /// Swap in new settings, returning the previous ones.
    pub async fn replace(&self, mut settings: SyncSettings) -> SyncSettings {
        settings.interval_secs = settings.interval_secs.max(1);
        std::mem::replace(&mut *self.inner.write().await, settings)
    }
}

/// Wire the store, HTTP client and FTCScout adapter together from config.
pub async fn build_reconciler(config: &AppConfig) -> Result<Reconciler> {
    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("opening store {}", config.db_path.display()))?;
    let http = HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
        global_concurrency: config.enrich_workers.max(2),
    })?;
    let source = FtcScoutRest::new(http, config.api_base.clone());
    Ok(Reconciler::new(store, Arc::new(source)).with_enrich_workers(config.enrich_workers))
}

pub async fn run_sync_once_from_env() -> Result<SyncOutcome> {
    let config = AppConfig::from_env();
    let reconciler = build_reconciler(&config).await?;
    Ok(reconciler.perform_sync(&config.settings).await)
}
