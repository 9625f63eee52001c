// In-memory store backend
//
// Single mutex over all three maps keeps claim and the status-guarded
// writes atomic without juggling lock ordering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ActionLogStore, ExecutionStore, RuleStore};
use crate::error::{WorkflowError, WorkflowResult};
use crate::workflows::execution::{
    ActionLogEntry, ExecutionStatus, StepResult, WorkflowExecution,
};
use crate::workflows::rules::{RuleStatus, WorkflowRule};
use crate::workflows::triggers::TriggerType;

#[derive(Default)]
struct Inner {
    rules: HashMap<Uuid, WorkflowRule>,
    executions: HashMap<Uuid, WorkflowExecution>,
    logs: Vec<ActionLogEntry>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn insert(&self, rule: &WorkflowRule) -> WorkflowResult<()> {
        self.inner.lock().await.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> WorkflowResult<Option<WorkflowRule>> {
        Ok(self.inner.lock().await.rules.get(&id).cloned())
    }

    async fn list(&self, organization_id: Uuid) -> WorkflowResult<Vec<WorkflowRule>> {
        let inner = self.inner.lock().await;
        let mut rules: Vec<_> = inner
            .rules
            .values()
            .filter(|rule| rule.organization_id == organization_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rules)
    }

    async fn update(&self, rule: &WorkflowRule) -> WorkflowResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.rules.contains_key(&rule.id) {
            return Err(WorkflowError::RuleNotFound(rule.id));
        }
        inner.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> WorkflowResult<bool> {
        Ok(self.inner.lock().await.rules.remove(&id).is_some())
    }

    async fn find_enabled(
        &self,
        organization_id: Uuid,
        trigger_type: TriggerType,
    ) -> WorkflowResult<Vec<WorkflowRule>> {
        let inner = self.inner.lock().await;
        let mut rules: Vec<_> = inner
            .rules
            .values()
            .filter(|rule| {
                rule.organization_id == organization_id
                    && rule.trigger_type == trigger_type
                    && rule.enabled
                    && rule.status == RuleStatus::Active
            })
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rules)
    }

    async fn record_execution(&self, id: Uuid, at: DateTime<Utc>) -> WorkflowResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(rule) = inner.rules.get_mut(&id) {
            rule.execution_count += 1;
            rule.last_executed_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn insert(&self, execution: &WorkflowExecution) -> WorkflowResult<bool> {
        let mut inner = self.inner.lock().await;
        // Check and insert under the same lock, the memory counterpart of
        // the partial unique index.
        if execution.run_once {
            let duplicate = inner.executions.values().any(|existing| {
                existing.workflow_id == execution.workflow_id
                    && existing.trigger_entity_id == execution.trigger_entity_id
            });
            if duplicate {
                return Ok(false);
            }
        }
        inner.executions.insert(execution.id, execution.clone());
        Ok(true)
    }

    async fn fetch(&self, id: Uuid) -> WorkflowResult<Option<WorkflowExecution>> {
        Ok(self.inner.lock().await.executions.get(&id).cloned())
    }

    async fn claim(&self, id: Uuid) -> WorkflowResult<Option<WorkflowExecution>> {
        let mut inner = self.inner.lock().await;
        let Some(execution) = inner.executions.get_mut(&id) else {
            return Ok(None);
        };
        match execution.status {
            ExecutionStatus::Pending | ExecutionStatus::Waiting => {
                execution.status = ExecutionStatus::Running;
                execution.started_at.get_or_insert_with(Utc::now);
                execution.resume_at = None;
                Ok(Some(execution.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn status(&self, id: Uuid) -> WorkflowResult<Option<ExecutionStatus>> {
        Ok(self
            .inner
            .lock()
            .await
            .executions
            .get(&id)
            .map(|execution| execution.status))
    }

    async fn record_step(
        &self,
        id: Uuid,
        step: &StepResult,
        next_step: i32,
    ) -> WorkflowResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(execution) = inner.executions.get_mut(&id) else {
            return Err(WorkflowError::ExecutionNotFound(id));
        };
        if execution.status == ExecutionStatus::Running {
            execution.step_results.push(step.clone());
            execution.current_step = next_step;
        }
        Ok(())
    }

    async fn suspend(
        &self,
        id: Uuid,
        resume_at: DateTime<Utc>,
        next_step: i32,
    ) -> WorkflowResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(execution) = inner.executions.get_mut(&id) else {
            return Err(WorkflowError::ExecutionNotFound(id));
        };
        if execution.status == ExecutionStatus::Running {
            execution.status = ExecutionStatus::Waiting;
            execution.resume_at = Some(resume_at);
            execution.current_step = next_step;
        }
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid) -> WorkflowResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(execution) = inner.executions.get_mut(&id) else {
            return Err(WorkflowError::ExecutionNotFound(id));
        };
        if execution.status == ExecutionStatus::Running {
            execution.status = ExecutionStatus::Completed;
            execution.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, step: i32, error: &str) -> WorkflowResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(execution) = inner.executions.get_mut(&id) else {
            return Err(WorkflowError::ExecutionNotFound(id));
        };
        if execution.status == ExecutionStatus::Running {
            execution.status = ExecutionStatus::Failed;
            execution.error_message = Some(error.to_string());
            execution.error_step = Some(step);
            execution.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> WorkflowResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(execution) = inner.executions.get_mut(&id) else {
            return Ok(false);
        };
        if execution.status.is_terminal() {
            return Ok(false);
        }
        execution.status = ExecutionStatus::Cancelled;
        execution.completed_at = Some(Utc::now());
        execution.resume_at = None;
        Ok(true)
    }

    async fn due_for_resume(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<Uuid>> {
        let inner = self.inner.lock().await;
        let mut due: Vec<_> = inner
            .executions
            .values()
            .filter(|execution| {
                execution.status == ExecutionStatus::Waiting
                    && execution.resume_at.is_some_and(|at| at <= now)
            })
            .map(|execution| (execution.resume_at, execution.id))
            .collect();
        due.sort();
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    async fn list_for_rule(
        &self,
        rule_id: Uuid,
        limit: i64,
    ) -> WorkflowResult<Vec<WorkflowExecution>> {
        let inner = self.inner.lock().await;
        let mut executions: Vec<_> = inner
            .executions
            .values()
            .filter(|execution| execution.workflow_id == rule_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        executions.truncate(limit.max(0) as usize);
        Ok(executions)
    }
}

#[async_trait]
impl ActionLogStore for MemoryStore {
    async fn append(&self, entry: &ActionLogEntry) -> WorkflowResult<()> {
        self.inner.lock().await.logs.push(entry.clone());
        Ok(())
    }

    async fn list_for_execution(
        &self,
        execution_id: Uuid,
    ) -> WorkflowResult<Vec<ActionLogEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .logs
            .iter()
            .filter(|entry| entry.execution_id == execution_id)
            .cloned()
            .collect())
    }
}
