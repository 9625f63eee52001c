// Execution Resumer - Wakes suspended executions whose delay has elapsed

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use super::coordinator::ExecutionCoordinator;
use crate::error::WorkflowResult;
use crate::store::ExecutionStore;

#[derive(Clone)]
pub struct Resumer {
    executions: Arc<dyn ExecutionStore>,
    coordinator: Arc<ExecutionCoordinator>,
}

impl Resumer {
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        coordinator: Arc<ExecutionCoordinator>,
    ) -> Self {
        Self {
            executions,
            coordinator,
        }
    }

    /// One polling pass: resume everything due right now.
    pub async fn tick(&self) -> WorkflowResult<usize> {
        self.tick_at(Utc::now()).await
    }

    /// Resume everything due at `now`. Returns how many executions this
    /// pass actually resumed; claims lost to concurrent workers or ticks
    /// do not count and do not error.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> WorkflowResult<usize> {
        let due = self.executions.due_for_resume(now).await?;
        let mut resumed = 0;
        for id in due {
            match self.coordinator.run(id).await {
                Ok(true) => resumed += 1,
                Ok(false) => {}
                Err(err) => {
                    error!(execution_id = %id, "failed to resume execution: {err}");
                }
            }
        }
        if resumed > 0 {
            info!(count = resumed, "resumed waiting executions");
        }
        Ok(resumed)
    }

    /// Register the polling job on a scheduler. The interval comes from
    /// WORKFLOW_RESUME_INTERVAL_SECS, default 60.
    pub async fn start(&self, scheduler: &JobScheduler, interval_secs: u64) -> WorkflowResult<()> {
        let schedule = if interval_secs < 60 {
            format!("*/{interval_secs} * * * * *")
        } else {
            format!("0 */{} * * * *", (interval_secs / 60).max(1))
        };

        let resumer = self.clone();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let resumer = resumer.clone();
            Box::pin(async move {
                if let Err(err) = resumer.tick().await {
                    error!("resume pass failed: {err}");
                }
            })
        })?;
        scheduler.add(job).await?;
        info!(interval_secs, "workflow resumer scheduled");
        Ok(())
    }
}
