use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use scout_core::SyncSettings;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{Reconciler, SettingsHandle, SyncOutcome};

#[derive(Debug, Clone, Copy)]
struct InstalledJob {
    id: Uuid,
    interval_secs: u64,
}

/// Owns the background sync cadence.
///
/// `start` runs one pass right away and then every `interval_secs`. Manual
/// triggers run outside that cadence and leave the next tick where it was.
pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    settings: SettingsHandle,
    jobs: JobScheduler,
    installed: Mutex<Option<InstalledJob>>,
    first_pass: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub async fn new(reconciler: Arc<Reconciler>, settings: SettingsHandle) -> Result<Self> {
        let jobs = JobScheduler::new().await.context("creating scheduler")?;
        Ok(Self {
            reconciler,
            settings,
            jobs,
            installed: Mutex::new(None),
            first_pass: Mutex::new(None),
        })
    }

    pub async fn start(&self) -> Result<()> {
        let interval_secs = self.settings.snapshot().await.interval_secs;
        self.install_job(interval_secs).await?;
        self.jobs.start().await.context("starting scheduler")?;

        let reconciler = Arc::clone(&self.reconciler);
        let settings = self.settings.clone();
        let handle = tokio::spawn(async move {
            run_scheduled_pass(&reconciler, &settings).await;
        });
        *self.first_pass.lock().await = Some(handle);
        info!(interval_secs, "background sync started");
        Ok(())
    }

    /// One extra pass with the current settings, awaited by the caller.
    pub async fn trigger_now(&self) -> SyncOutcome {
        let settings = self.settings.snapshot().await;
        info!(event = %settings.event_code, "manual sync requested");
        self.reconciler.perform_sync(&settings).await
    }

    /// Apply new admin settings and sync against them immediately.
    pub async fn update_settings(&self, settings: SyncSettings) -> Result<SyncOutcome> {
        self.settings.replace(settings).await;
        let current = self.settings.snapshot().await;
        info!(
            season = %current.season,
            event = %current.event_code,
            interval_secs = current.interval_secs,
            "sync settings updated"
        );

        // Only a running cadence is rebuilt; `start` installs the first job.
        let reschedule = self
            .installed
            .lock()
            .await
            .is_some_and(|job| job.interval_secs != current.interval_secs);
        if reschedule {
            self.install_job(current.interval_secs).await?;
        }

        Ok(self.reconciler.perform_sync(&current).await)
    }

    /// Stop the cadence and wait for the startup pass if it is still running.
    pub async fn shutdown(&self) -> Result<()> {
        let mut jobs = self.jobs.clone();
        jobs.shutdown().await.context("stopping scheduler")?;
        if let Some(handle) = self.first_pass.lock().await.take() {
            handle.await.context("startup sync pass panicked")?;
        }
        info!("background sync stopped");
        Ok(())
    }

    async fn install_job(&self, interval_secs: u64) -> Result<()> {
        let mut installed = self.installed.lock().await;
        if let Some(existing) = installed.take() {
            self.jobs
                .remove(&existing.id)
                .await
                .context("removing previous sync job")?;
        }

        let reconciler = Arc::clone(&self.reconciler);
        let settings = self.settings.clone();
        let job = Job::new_repeated_async(Duration::from_secs(interval_secs.max(1)), move |_uuid, _l| {
            let reconciler = Arc::clone(&reconciler);
            let settings = settings.clone();
            Box::pin(async move {
                run_scheduled_pass(&reconciler, &settings).await;
            })
        })
        .with_context(|| format!("creating sync job every {interval_secs}s"))?;
        let id = self.jobs.add(job).await.context("adding sync job")?;
        *installed = Some(InstalledJob { id, interval_secs });
        Ok(())
    }
}

async fn run_scheduled_pass(reconciler: &Reconciler, settings: &SettingsHandle) {
    let snapshot = settings.snapshot().await;
    if let SyncOutcome::Failed { run_id, error } = reconciler.perform_sync(&snapshot).await {
        warn!(%run_id, %error, "scheduled sync failed; retrying next interval");
    }
}
