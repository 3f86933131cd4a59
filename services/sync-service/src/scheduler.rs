// Scheduler - runs sync cycles on a cron schedule plus one startup run

use crate::config::TriggerConfig;
use anyhow::{anyhow, Result};
use delegation_sync::{SyncContext, SyncOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub struct SyncScheduler {
    scheduler: JobScheduler,
    orchestrator: Arc<SyncOrchestrator>,
    config: TriggerConfig,
}

impl SyncScheduler {
    pub async fn new(orchestrator: Arc<SyncOrchestrator>, config: TriggerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create job scheduler: {}", e))?;

        Ok(Self {
            scheduler,
            orchestrator,
            config,
        })
    }

    /// Register the cron job, start the scheduler and queue the startup run
    pub async fn start(&mut self) -> Result<()> {
        info!(cron = %self.config.cron, "Starting delegation sync scheduler");

        let orchestrator = self.orchestrator.clone();
        let timeout = self.config.cycle_timeout();
        let sync_job = Job::new_async(self.config.cron.as_str(), move |_uuid, _lock| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move {
                info!("Scheduled delegations sync triggered");
                run_sync(&orchestrator, timeout).await;
            })
        })
        .map_err(|e| anyhow!("Invalid sync schedule '{}': {}", self.config.cron, e))?;

        self.scheduler
            .add(sync_job)
            .await
            .map_err(|e| anyhow!("Failed to add sync job: {}", e))?;

        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {}", e))?;

        if self.config.run_on_startup {
            let orchestrator = self.orchestrator.clone();
            let delay = self.config.startup_delay();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                info!("Running startup delegations sync");
                run_sync(&orchestrator, timeout).await;
            });
        }

        info!("Delegation sync scheduler started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| anyhow!("Failed to stop scheduler: {}", e))
    }
}

/// One triggered cycle; failures are logged and the next tick proceeds
pub async fn run_sync(orchestrator: &SyncOrchestrator, timeout: Duration) {
    let ctx = SyncContext::with_timeout(timeout);
    match orchestrator.run_cycle(&ctx).await {
        Ok(stats) => info!(
            succeeded = stats.succeeded,
            skipped = stats.skipped,
            records = stats.records_processed,
            "Delegations sync finished"
        ),
        Err(e) => error!("Delegations sync failed: {}", e),
    }
}
