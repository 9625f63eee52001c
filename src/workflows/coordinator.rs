// Execution Coordinator - Drives one execution through its action sequence
//
// Single writer of execution state: handlers report outcomes, the
// coordinator persists them. Every step is recorded before the next one
// starts, so a crash resumes from the last durable step.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::execution::{ActionLogEntry, ExecutionStatus, StepResult};
use super::executor::{ActionExecutor, ExecutionScope};
use crate::error::WorkflowResult;
use crate::store::{ActionLogStore, ExecutionStore, RuleStore};

pub struct ExecutionCoordinator {
    rules: Arc<dyn RuleStore>,
    executions: Arc<dyn ExecutionStore>,
    logs: Arc<dyn ActionLogStore>,
    executor: ActionExecutor,
}

impl ExecutionCoordinator {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        executions: Arc<dyn ExecutionStore>,
        logs: Arc<dyn ActionLogStore>,
        executor: ActionExecutor,
    ) -> Self {
        Self {
            rules,
            executions,
            logs,
            executor,
        }
    }

    /// Claim and run an execution until it completes, fails or suspends.
    /// Returns false when the claim was lost to another worker.
    pub async fn run(&self, id: Uuid) -> WorkflowResult<bool> {
        let Some(execution) = self.executions.claim(id).await? else {
            return Ok(false);
        };

        let Some(rule) = self.rules.fetch(execution.workflow_id).await? else {
            warn!(execution_id = %id, workflow_id = %execution.workflow_id,
                "execution refers to a deleted rule");
            self.executions
                .mark_failed(id, execution.current_step, "workflow rule no longer exists")
                .await?;
            return Ok(true);
        };

        let scope = ExecutionScope {
            execution_id: execution.id,
            organization_id: execution.organization_id,
            entity_type: execution.trigger_entity_type.clone(),
            entity_id: execution.trigger_entity_id.clone(),
            context: execution.context.clone(),
        };

        let start = execution.current_step.max(0) as usize;
        for (index, action) in rule.actions.iter().enumerate().skip(start) {
            // Cooperative cancellation between steps.
            if self.executions.status(id).await? == Some(ExecutionStatus::Cancelled) {
                info!(execution_id = %id, "execution cancelled, stopping");
                return Ok(true);
            }

            let outcome = self.executor.execute(action, &scope).await;
            let step = StepResult {
                step: index as i32,
                action: action.kind().to_string(),
                success: outcome.success,
                result: outcome.result.clone(),
                error: outcome.error.clone(),
                executed_at: Utc::now(),
            };
            self.executions
                .record_step(id, &step, (index + 1) as i32)
                .await?;

            if let Some(error) = &outcome.error {
                let entry = ActionLogEntry {
                    id: Uuid::new_v4(),
                    execution_id: id,
                    step_index: index as i32,
                    action_type: action.kind().to_string(),
                    action_config: serde_json::to_value(action).unwrap_or(json!({})),
                    success: false,
                    result: outcome.result.clone(),
                    error_message: Some(error.clone()),
                    completed_at: Utc::now(),
                };
                self.logs.append(&entry).await?;
            }

            if let Some(resume_at) = outcome.resume_at {
                self.executions
                    .suspend(id, resume_at, (index + 1) as i32)
                    .await?;
                info!(execution_id = %id, %resume_at, "execution suspended");
                return Ok(true);
            }

            if !outcome.success {
                let error = outcome
                    .error
                    .unwrap_or_else(|| "action failed".to_string());
                error!(execution_id = %id, step = index, action = action.kind(),
                    "workflow step failed: {error}");
                self.executions
                    .mark_failed(id, index as i32, &error)
                    .await?;
                return Ok(true);
            }
        }

        self.executions.mark_completed(id).await?;
        self.rules.record_execution(rule.id, Utc::now()).await?;
        info!(execution_id = %id, workflow_id = %rule.id, "execution completed");
        Ok(true)
    }
}
