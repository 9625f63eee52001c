// Workflow automation engine
//
// Rules bind a trigger to an action sequence; the dispatcher fans trigger
// events out to matching rules, the coordinator drives each execution and
// the resumer wakes executions suspended by delay actions.

pub mod actions;
pub mod conditions;
pub mod coordinator;
pub mod dispatcher;
pub mod execution;
pub mod executor;
pub mod interpolate;
pub mod resumer;
pub mod rules;
pub mod templates;
pub mod triggers;

pub use actions::{ActionOutcome, ActionSpec};
pub use coordinator::ExecutionCoordinator;
pub use dispatcher::TriggerDispatcher;
pub use execution::{ActionLogEntry, ExecutionStatus, StepResult, WorkflowExecution};
pub use executor::{ActionExecutor, ExecutionScope};
pub use resumer::Resumer;
pub use rules::{CreateRule, RuleStatus, UpdateRule, WorkflowRule, WorkflowStats};
pub use triggers::{TriggerEvent, TriggerType};

use std::sync::Arc;
use tokio_cron_scheduler::JobScheduler;
use tracing::info;
use uuid::Uuid;

use crate::channels::Capabilities;
use crate::config::EngineConfig;
use crate::error::{WorkflowError, WorkflowResult};
use crate::store::{ActionLogStore, ExecutionStore, MemoryStore, PostgresStore, RuleStore};

/// Facade over the whole engine: rule CRUD, event dispatch and the resumer.
pub struct WorkflowEngine {
    rules: Arc<dyn RuleStore>,
    executions: Arc<dyn ExecutionStore>,
    logs: Arc<dyn ActionLogStore>,
    dispatcher: TriggerDispatcher,
    resumer: Resumer,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Build an engine over the given stores. Spawns the run-queue worker,
    /// so this must be called from within a tokio runtime.
    pub fn new(
        rules: Arc<dyn RuleStore>,
        executions: Arc<dyn ExecutionStore>,
        logs: Arc<dyn ActionLogStore>,
        capabilities: Capabilities,
        config: EngineConfig,
    ) -> Self {
        let executor = ActionExecutor::new(capabilities, config.clone());
        let coordinator = Arc::new(ExecutionCoordinator::new(
            rules.clone(),
            executions.clone(),
            logs.clone(),
            executor,
        ));
        let queue = dispatcher::start_run_queue(coordinator.clone());
        let dispatcher = TriggerDispatcher::new(rules.clone(), executions.clone(), queue);
        let resumer = Resumer::new(executions.clone(), coordinator);

        Self {
            rules,
            executions,
            logs,
            dispatcher,
            resumer,
            config,
        }
    }

    /// Engine backed by Postgres, the production setup.
    pub fn with_postgres(
        pool: sqlx::PgPool,
        capabilities: Capabilities,
        config: EngineConfig,
    ) -> Self {
        let store = Arc::new(PostgresStore::new(pool));
        Self::new(store.clone(), store.clone(), store, capabilities, config)
    }

    /// Engine backed by the in-memory store, for tests and embedded use.
    pub fn in_memory(capabilities: Capabilities, config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store.clone(), store, capabilities, config)
    }

    // ---- rules ----

    pub async fn create_rule(
        &self,
        organization_id: Uuid,
        created_by: Option<Uuid>,
        create: CreateRule,
    ) -> WorkflowResult<WorkflowRule> {
        if create.name.trim().is_empty() {
            return Err(WorkflowError::InvalidRule(
                "rule name must not be empty".to_string(),
            ));
        }
        rules::validate_actions(&create.actions)?;

        let rule = WorkflowRule::from_create(organization_id, created_by, create);
        self.rules.insert(&rule).await?;
        info!(workflow_id = %rule.id, trigger = %rule.trigger_type, "workflow rule created");
        Ok(rule)
    }

    pub async fn update_rule(&self, id: Uuid, update: UpdateRule) -> WorkflowResult<WorkflowRule> {
        let mut rule = self
            .rules
            .fetch(id)
            .await?
            .ok_or(WorkflowError::RuleNotFound(id))?;
        if let Some(actions) = &update.actions {
            rules::validate_actions(actions)?;
        }
        update.apply(&mut rule);
        self.rules.update(&rule).await?;
        Ok(rule)
    }

    pub async fn delete_rule(&self, id: Uuid) -> WorkflowResult<bool> {
        self.rules.delete(id).await
    }

    pub async fn rule(&self, id: Uuid) -> WorkflowResult<Option<WorkflowRule>> {
        self.rules.fetch(id).await
    }

    pub async fn rules(&self, organization_id: Uuid) -> WorkflowResult<Vec<WorkflowRule>> {
        self.rules.list(organization_id).await
    }

    pub async fn stats(&self, organization_id: Uuid) -> WorkflowResult<WorkflowStats> {
        let rules = self.rules.list(organization_id).await?;
        Ok(WorkflowStats::from_rules(&rules))
    }

    // ---- executions ----

    pub async fn execution(&self, id: Uuid) -> WorkflowResult<Option<WorkflowExecution>> {
        self.executions.fetch(id).await
    }

    pub async fn executions(
        &self,
        rule_id: Uuid,
        limit: i64,
    ) -> WorkflowResult<Vec<WorkflowExecution>> {
        self.executions.list_for_rule(rule_id, limit).await
    }

    pub async fn cancel_execution(&self, id: Uuid) -> WorkflowResult<bool> {
        let cancelled = self.executions.cancel(id).await?;
        if cancelled {
            info!(execution_id = %id, "execution cancelled");
        }
        Ok(cancelled)
    }

    pub async fn action_logs(&self, execution_id: Uuid) -> WorkflowResult<Vec<ActionLogEntry>> {
        self.logs.list_for_execution(execution_id).await
    }

    // ---- dispatch / resume ----

    /// Hand a business event to the engine. Fire-and-forget; returns the
    /// ids of the executions it started.
    pub async fn dispatch(&self, organization_id: Uuid, event: TriggerEvent) -> Vec<Uuid> {
        self.dispatcher.dispatch(organization_id, event).await
    }

    pub fn resumer(&self) -> Resumer {
        self.resumer.clone()
    }

    /// Register the resume-polling job on the host's scheduler.
    pub async fn start_resumer(&self, scheduler: &JobScheduler) -> WorkflowResult<()> {
        self.resumer
            .start(scheduler, self.config.resume_interval_secs)
            .await
    }
}
