//! Workflow automation engine for field-service businesses.
//!
//! Organizations define rules that bind a business trigger (a client was
//! created, an invoice went overdue, ...) to a sequence of actions: send an
//! email or SMS, create a follow-up task, call a webhook, wait a few days,
//! branch on a condition. The engine matches incoming trigger events
//! against enabled rules, runs each match as a persisted execution and
//! resumes executions suspended by delay actions.
//!
//! The engine runs in-process. Hosts hand it a store backend, wire their
//! delivery channels into [`channels::Capabilities`] and call
//! [`workflows::WorkflowEngine::dispatch`] whenever a business event
//! happens.

pub mod channels;
pub mod config;
pub mod database;
pub mod error;
pub mod store;
pub mod workflows;

pub use config::EngineConfig;
pub use error::{WorkflowError, WorkflowResult};
pub use workflows::{
    ActionSpec, CreateRule, ExecutionStatus, TriggerEvent, TriggerType, UpdateRule,
    WorkflowEngine, WorkflowExecution, WorkflowRule,
};
