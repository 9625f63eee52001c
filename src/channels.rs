// Injected delivery and side-effect capabilities
//
// The engine never talks to SMTP, SMS gateways or the task tables directly.
// Hosts wire in whichever channels they support; an absent channel makes the
// corresponding action fail with a recorded "not configured" outcome instead
// of blowing up the execution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Receipt returned by message-delivery channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<DeliveryReceipt>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, text: &str) -> anyhow::Result<DeliveryReceipt>;
}

#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    async fn send(
        &self,
        to: &str,
        template: &str,
        params: &HashMap<String, String>,
    ) -> anyhow::Result<DeliveryReceipt>;
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        data: Option<&serde_json::Value>,
    ) -> anyhow::Result<()>;
}

/// A task to create in the host's task tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<String>,
    pub due_date: DateTime<Utc>,
    pub related_entity_type: String,
    pub related_entity_id: String,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: NewTask) -> anyhow::Result<Uuid>;
}

/// A future notification handed to the reminder subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReminder {
    pub organization_id: Uuid,
    pub client_id: Option<String>,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub scheduled_for: DateTime<Utc>,
    pub channels: Vec<String>,
}

#[async_trait]
pub trait ReminderScheduler: Send + Sync {
    async fn schedule(&self, reminder: NewReminder) -> anyhow::Result<Uuid>;
}

/// Updates a single field on a business entity (client, invoice, ...).
/// Backed by the host's own repositories; the engine only knows the entity
/// type name and id it found in the execution context.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn update_field(
        &self,
        entity_type: &str,
        entity_id: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> anyhow::Result<()>;
}

/// Bundle of everything a host may inject. All channels are optional.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub email: Option<Arc<dyn EmailSender>>,
    pub sms: Option<Arc<dyn SmsSender>>,
    pub whatsapp: Option<Arc<dyn WhatsAppSender>>,
    pub push: Option<Arc<dyn PushSender>>,
    pub tasks: Option<Arc<dyn TaskStore>>,
    pub reminders: Option<Arc<dyn ReminderScheduler>>,
    pub entities: Option<Arc<dyn EntityStore>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(sender);
        self
    }

    pub fn with_sms(mut self, sender: Arc<dyn SmsSender>) -> Self {
        self.sms = Some(sender);
        self
    }

    pub fn with_whatsapp(mut self, sender: Arc<dyn WhatsAppSender>) -> Self {
        self.whatsapp = Some(sender);
        self
    }

    pub fn with_push(mut self, sender: Arc<dyn PushSender>) -> Self {
        self.push = Some(sender);
        self
    }

    pub fn with_tasks(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(store);
        self
    }

    pub fn with_reminders(mut self, scheduler: Arc<dyn ReminderScheduler>) -> Self {
        self.reminders = Some(scheduler);
        self
    }

    pub fn with_entities(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.entities = Some(store);
        self
    }
}
