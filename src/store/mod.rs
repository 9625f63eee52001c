// Persistence traits for rules, executions and action logs
//
// Two backends: Postgres for production and an in-memory store for tests
// and embedded use. The engine only ever sees these traits.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::WorkflowResult;
use crate::workflows::execution::{
    ActionLogEntry, ExecutionStatus, StepResult, WorkflowExecution,
};
use crate::workflows::rules::WorkflowRule;
use crate::workflows::triggers::TriggerType;

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn insert(&self, rule: &WorkflowRule) -> WorkflowResult<()>;

    async fn fetch(&self, id: Uuid) -> WorkflowResult<Option<WorkflowRule>>;

    async fn list(&self, organization_id: Uuid) -> WorkflowResult<Vec<WorkflowRule>>;

    async fn update(&self, rule: &WorkflowRule) -> WorkflowResult<()>;

    /// Returns false when the rule did not exist.
    async fn delete(&self, id: Uuid) -> WorkflowResult<bool>;

    /// Enabled rules for one organization and trigger, the dispatch set.
    async fn find_enabled(
        &self,
        organization_id: Uuid,
        trigger_type: TriggerType,
    ) -> WorkflowResult<Vec<WorkflowRule>>;

    /// Bump execution_count and stamp last_executed_at.
    async fn record_execution(&self, id: Uuid, at: DateTime<Utc>) -> WorkflowResult<()>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a new execution. For a run-once execution this is the atomic
    /// deduplication point: returns false, inserting nothing, when an
    /// execution already exists for `(workflow_id, trigger_entity_id)`.
    async fn insert(&self, execution: &WorkflowExecution) -> WorkflowResult<bool>;

    async fn fetch(&self, id: Uuid) -> WorkflowResult<Option<WorkflowExecution>>;

    /// Atomically move a pending or waiting execution to running. Returns
    /// None when another worker already claimed it or the status moved on.
    async fn claim(&self, id: Uuid) -> WorkflowResult<Option<WorkflowExecution>>;

    async fn status(&self, id: Uuid) -> WorkflowResult<Option<ExecutionStatus>>;

    /// Append one step result and advance current_step in a single write.
    /// Only applies while the execution is running.
    async fn record_step(
        &self,
        id: Uuid,
        step: &StepResult,
        next_step: i32,
    ) -> WorkflowResult<()>;

    /// running -> waiting with a wake-up time.
    async fn suspend(
        &self,
        id: Uuid,
        resume_at: DateTime<Utc>,
        next_step: i32,
    ) -> WorkflowResult<()>;

    async fn mark_completed(&self, id: Uuid) -> WorkflowResult<()>;

    async fn mark_failed(&self, id: Uuid, step: i32, error: &str) -> WorkflowResult<()>;

    /// Cancel a non-terminal execution. Returns false when it had already
    /// finished.
    async fn cancel(&self, id: Uuid) -> WorkflowResult<bool>;

    /// Waiting executions whose resume_at has passed.
    async fn due_for_resume(&self, now: DateTime<Utc>) -> WorkflowResult<Vec<Uuid>>;

    async fn list_for_rule(
        &self,
        rule_id: Uuid,
        limit: i64,
    ) -> WorkflowResult<Vec<WorkflowExecution>>;
}

#[async_trait]
pub trait ActionLogStore: Send + Sync {
    async fn append(&self, entry: &ActionLogEntry) -> WorkflowResult<()>;

    async fn list_for_execution(
        &self,
        execution_id: Uuid,
    ) -> WorkflowResult<Vec<ActionLogEntry>>;
}
