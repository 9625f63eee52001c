// Trigger Dispatcher - Fans a business event out to matching rules
//
// Dispatch is fire-and-forget: created executions are handed to the run
// queue and nothing here propagates back to the code that raised the event.
// The queue worker claims each execution before running it, so a duplicate
// enqueue is harmless.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::coordinator::ExecutionCoordinator;
use super::execution::WorkflowExecution;
use super::triggers::TriggerEvent;
use crate::store::{ExecutionStore, RuleStore};

/// Spawn the run-queue worker: receives execution ids and drives each one
/// on its own task. Returns the sender side handed to the dispatcher and
/// the resumer's callers.
pub fn start_run_queue(coordinator: Arc<ExecutionCoordinator>) -> mpsc::UnboundedSender<Uuid> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Uuid>();
    tokio::spawn(async move {
        while let Some(execution_id) = rx.recv().await {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                if let Err(err) = coordinator.run(execution_id).await {
                    error!(%execution_id, "execution run failed: {err}");
                }
            });
        }
    });
    tx
}

pub struct TriggerDispatcher {
    rules: Arc<dyn RuleStore>,
    executions: Arc<dyn ExecutionStore>,
    queue: mpsc::UnboundedSender<Uuid>,
}

impl TriggerDispatcher {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        executions: Arc<dyn ExecutionStore>,
        queue: mpsc::UnboundedSender<Uuid>,
    ) -> Self {
        Self {
            rules,
            executions,
            queue,
        }
    }

    /// Create and enqueue executions for every enabled rule matching the
    /// event. Returns the ids of the executions created; failures are
    /// logged, never raised to the event producer.
    pub async fn dispatch(&self, organization_id: Uuid, event: TriggerEvent) -> Vec<Uuid> {
        let rules = match self
            .rules
            .find_enabled(organization_id, event.trigger_type)
            .await
        {
            Ok(rules) => rules,
            Err(err) => {
                error!(%organization_id, trigger = %event.trigger_type,
                    "failed to load rules for dispatch: {err}");
                return Vec::new();
            }
        };

        let mut started = Vec::new();
        for rule in rules {
            if !rule.matches(&event.context) {
                debug!(workflow_id = %rule.id, "trigger filter did not match");
                continue;
            }

            // Run-once dedup happens inside insert: the store refuses a
            // second execution for the same rule and entity, so concurrent
            // dispatches of one event cannot both get through.
            let execution = WorkflowExecution::new(&rule, &event);
            match self.executions.insert(&execution).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(workflow_id = %rule.id, entity_id = %event.entity_id,
                        "run-once rule already executed for entity");
                    continue;
                }
                Err(err) => {
                    error!(workflow_id = %rule.id, "failed to create execution: {err}");
                    continue;
                }
            }

            info!(execution_id = %execution.id, workflow_id = %rule.id,
                trigger = %event.trigger_type, "execution created");
            started.push(execution.id);

            if self.queue.send(execution.id).is_err() {
                // Worker gone; the execution stays pending and a restart
                // or manual run can pick it up.
                error!(execution_id = %execution.id, "run queue is closed");
            }
        }
        started
    }
}
