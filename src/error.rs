// Engine error taxonomy
//
// Action-level failures are never represented here: they are recorded as
// step outcomes on the execution itself. This type covers rule validation,
// storage and scheduler failures.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid workflow rule: {0}")]
    InvalidRule(String),
    #[error("workflow rule {0} not found")]
    RuleNotFound(Uuid),
    #[error("workflow execution {0} not found")]
    ExecutionNotFound(Uuid),
    #[error("invalid stored data: {0}")]
    InvalidData(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
