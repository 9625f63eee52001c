// Postgres store backend
//
// All status transitions are single guarded UPDATE statements so concurrent
// workers and resumer ticks cannot double-run or resurrect an execution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ActionLogStore, ExecutionStore, RuleStore};
use crate::error::{WorkflowError, WorkflowResult};
use crate::workflows::execution::{
    ActionLogEntry, ExecutionStatus, StepResult, WorkflowExecution,
};
use crate::workflows::rules::{RuleStatus, WorkflowRule};
use crate::workflows::triggers::TriggerType;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type RuleRow = (
    Uuid,                  // id
    Uuid,                  // organization_id
    String,                // name
    Option<String>,        // description
    String,                // trigger_type
    Value,                 // trigger_filter
    Value,                 // actions
    bool,                  // enabled
    bool,                  // run_once
    String,                // status
    i64,                   // execution_count
    Option<DateTime<Utc>>, // last_executed_at
    Option<Uuid>,          // created_by
    DateTime<Utc>,         // created_at
    DateTime<Utc>,         // updated_at
);

const RULE_COLUMNS: &str = "id, organization_id, name, description, trigger_type, \
     trigger_filter, actions, enabled, run_once, status, execution_count, \
     last_executed_at, created_by, created_at, updated_at";

fn rule_from_row(row: RuleRow) -> WorkflowResult<WorkflowRule> {
    Ok(WorkflowRule {
        id: row.0,
        organization_id: row.1,
        name: row.2,
        description: row.3,
        trigger_type: row.4.parse::<TriggerType>()?,
        trigger_filter: serde_json::from_value(row.5)?,
        actions: serde_json::from_value(row.6)?,
        enabled: row.7,
        run_once: row.8,
        status: row.9.parse::<RuleStatus>()?,
        execution_count: row.10,
        last_executed_at: row.11,
        created_by: row.12,
        created_at: row.13,
        updated_at: row.14,
    })
}

type ExecutionRow = (
    Uuid,                  // id
    Uuid,                  // workflow_id
    Uuid,                  // organization_id
    String,                // trigger_entity_type
    String,                // trigger_entity_id
    bool,                  // run_once
    String,                // status
    i32,                   // current_step
    Value,                 // context
    Value,                 // step_results
    Option<DateTime<Utc>>, // resume_at
    Option<String>,        // error_message
    Option<i32>,           // error_step
    Option<DateTime<Utc>>, // started_at
    Option<DateTime<Utc>>, // completed_at
    DateTime<Utc>,         // created_at
);

const EXECUTION_COLUMNS: &str = "id, workflow_id, organization_id, trigger_entity_type, \
     trigger_entity_id, run_once, status, current_step, context, step_results, resume_at, \
     error_message, error_step, started_at, completed_at, created_at";

fn execution_from_row(row: ExecutionRow) -> WorkflowResult<WorkflowExecution> {
    Ok(WorkflowExecution {
        id: row.0,
        workflow_id: row.1,
        organization_id: row.2,
        trigger_entity_type: row.3,
        trigger_entity_id: row.4,
        run_once: row.5,
        status: row.6.parse::<ExecutionStatus>()?,
        current_step: row.7,
        context: row.8,
        step_results: serde_json::from_value(row.9)?,
        resume_at: row.10,
        error_message: row.11,
        error_step: row.12,
        started_at: row.13,
        completed_at: row.14,
        created_at: row.15,
    })
}

#[async_trait]
impl RuleStore for PostgresStore {
    async fn insert(&self, rule: &WorkflowRule) -> WorkflowResult<()> {
        sqlx::query(
            "INSERT INTO workflow_rules \
             (id, organization_id, name, description, trigger_type, trigger_filter, \
              actions, enabled, run_once, status, execution_count, last_executed_at, \
              created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(rule.id)
        .bind(rule.organization_id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.trigger_type.as_str())
        .bind(serde_json::to_value(&rule.trigger_filter)?)
        .bind(serde_json::to_value(&rule.actions)?)
        .bind(rule.enabled)
        .bind(rule.run_once)
        .bind(rule.status.as_str())
        .bind(rule.execution_count)
        .bind(rule.last_executed_at)
        .bind(rule.created_by)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> WorkflowResult<Option<WorkflowRule>> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM workflow_rules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(rule_from_row).transpose()
    }

    async fn list(&self, organization_id: Uuid) -> WorkflowResult<Vec<WorkflowRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM workflow_rules \
             WHERE organization_id = $1 ORDER BY created_at DESC"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(rule_from_row).collect()
    }

    async fn update(&self, rule: &WorkflowRule) -> WorkflowResult<()> {
        let result = sqlx::query(
            "UPDATE workflow_rules SET \
             name = $2, description = $3, trigger_filter = $4, actions = $5, \
             enabled = $6, run_once = $7, status = $8, updated_at = $9 \
             WHERE id = $1",
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(serde_json::to_value(&rule.trigger_filter)?)
        .bind(serde_json::to_value(&rule.actions)?)
        .bind(rule.enabled)
        .bind(rule.run_once)
        .bind(rule.status.as_str())
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(WorkflowError::RuleNotFound(rule.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> WorkflowResult<bool> {
        let result = sqlx::query("DELETE FROM workflow_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_enabled(
        &self,
        organization_id: Uuid,
        trigger_type: TriggerType,
    ) -> WorkflowResult<Vec<WorkflowRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM workflow_rules \
             WHERE organization_id = $1 AND trigger_type = $2 \
             AND enabled = true AND status = 'active' \
             ORDER BY created_at ASC"
        ))
        .bind(organization_id)
        .bind(trigger_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(rule_from_row).collect()
    }

    async fn record_execution(&self, id: Uuid, at: DateTime<Utc>) -> WorkflowResult<()> {
        sqlx::query(
            "UPDATE workflow_rules SET \
             execution_count = execution_count + 1, last_executed_at = $2 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for PostgresStore {
    async fn insert(&self, execution: &WorkflowExecution) -> WorkflowResult<bool> {
        // The partial unique index on run-once executions turns a
        // concurrent duplicate into an affected-rows 0, not an error.
        let result = sqlx::query(
            "INSERT INTO workflow_executions \
             (id, workflow_id, organization_id, trigger_entity_type, trigger_entity_id, \
              run_once, status, current_step, context, step_results, resume_at, \
              error_message, error_step, started_at, completed_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             ON CONFLICT (workflow_id, trigger_entity_id) WHERE run_once = true \
             DO NOTHING",
        )
        .bind(execution.id)
        .bind(execution.workflow_id)
        .bind(execution.organization_id)
        .bind(&execution.trigger_entity_type)
        .bind(&execution.trigger_entity_id)
        .bind(execution.run_once)
        .bind(execution.status.as_str())
        .bind(execution.current_step)
        .bind(&execution.context)
        .bind(serde_json::to_value(&execution.step_results)?)
        .bind(execution.resume_at)
        .bind(&execution.error_message)
        .bind(execution.error_step)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch(&self, id: Uuid) -> WorkflowResult<Option<WorkflowExecution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(execution_from_row).transpose()
    }

    async fn claim(&self, id: Uuid) -> WorkflowResult<Option<WorkflowExecution>> {
        // Compare-and-set: loses cleanly when another worker got here first.
        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            "UPDATE workflow_executions SET \
             status = 'running', started_at = COALESCE(started_at, NOW()), resume_at = NULL \
             WHERE id = $1 AND status IN ('pending', 'waiting') \
             RETURNING {EXECUTION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(execution_from_row).transpose()
    }

    async fn status(&self, id: Uuid) -> WorkflowResult<Option<ExecutionStatus>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT status FROM workflow_executions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(status,)| status.parse::<ExecutionStatus>())
            .transpose()
    }

    async fn record_step(
        &self,
        id: Uuid,
        step: &StepResult,
        next_step: i32,
    ) -> WorkflowResult<()> {
        sqlx::query(
            "UPDATE workflow_executions SET \
             step_results = step_results || $2::jsonb, current_step = $3 \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(serde_json::to_value(step)?)
        .bind(next_step)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn suspend(
        &self,
        id: Uuid,
        resume_at: DateTime<Utc>,
        next_step: i32,
    ) -> WorkflowResult<()> {
        sqlx::query(
            "UPDATE workflow_executions SET \
             status = 'waiting', resume_at = $2, current_step = $3 \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(resume_at)
        .bind(next_step)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid) -> WorkflowResult<()> {
        sqlx::query(
            "UPDATE workflow_executions SET status = 'completed', completed_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, step: i32, error: &str) -> WorkflowResult<()> {
        sqlx::query(
            "UPDATE workflow_executions SET \
             status = 'failed', error_message = $2, error_step = $3, completed_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(error)
        .bind(step)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> WorkflowResult<bool> {
        let result = sqlx::query(
            "UPDATE workflow_executions SET \
             status = 'cancelled', completed_at = NOW(), resume_at = NULL \
             WHERE id = $1 AND status IN ('pending', 'running', 'waiting')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn due_for_resume(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<Uuid>> {
        let rows = sqlx::query_as::<_, (Uuid,)>(
            "SELECT id FROM workflow_executions \
             WHERE status = 'waiting' AND resume_at <= $1 \
             ORDER BY resume_at ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_for_rule(
        &self,
        rule_id: Uuid,
        limit: i64,
    ) -> WorkflowResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions \
             WHERE workflow_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(rule_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(execution_from_row).collect()
    }
}

#[async_trait]
impl ActionLogStore for PostgresStore {
    async fn append(&self, entry: &ActionLogEntry) -> WorkflowResult<()> {
        sqlx::query(
            "INSERT INTO workflow_action_logs \
             (id, execution_id, step_index, action_type, action_config, success, \
              result, error_message, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(entry.execution_id)
        .bind(entry.step_index)
        .bind(&entry.action_type)
        .bind(&entry.action_config)
        .bind(entry.success)
        .bind(&entry.result)
        .bind(&entry.error_message)
        .bind(entry.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_execution(
        &self,
        execution_id: Uuid,
    ) -> WorkflowResult<Vec<ActionLogEntry>> {
        type LogRow = (
            Uuid,
            Uuid,
            i32,
            String,
            Value,
            bool,
            Option<Value>,
            Option<String>,
            DateTime<Utc>,
        );
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT id, execution_id, step_index, action_type, action_config, success, \
             result, error_message, completed_at \
             FROM workflow_action_logs WHERE execution_id = $1 ORDER BY step_index ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| ActionLogEntry {
                id: row.0,
                execution_id: row.1,
                step_index: row.2,
                action_type: row.3,
                action_config: row.4,
                success: row.5,
                result: row.6,
                error_message: row.7,
                completed_at: row.8,
            })
            .collect())
    }
}
