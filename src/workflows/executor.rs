// Workflow Action Executor - Runs a single action against the host channels
//
// Handlers never return Err: every problem becomes a failed ActionOutcome so
// the coordinator can record it and apply the rule's failure semantics.

use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};
use uuid::Uuid;

use super::actions::{
    ActionOutcome, ActionSpec, ConditionConfig, DelayConfig, EmailConfig, PushConfig,
    ReminderConfig, SmsConfig, TagConfig, TaskConfig, UpdateFieldConfig, WebhookConfig,
    WebhookMethod, WhatsAppConfig,
};
use super::conditions::Comparison;
use super::interpolate;
use crate::channels::{Capabilities, NewReminder, NewTask};
use crate::config::EngineConfig;

/// Identity of the execution an action runs for, plus its context snapshot.
#[derive(Debug, Clone)]
pub struct ExecutionScope {
    pub execution_id: Uuid,
    pub organization_id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub context: Value,
}

#[derive(Clone)]
pub struct ActionExecutor {
    capabilities: Capabilities,
    http: reqwest::Client,
    config: EngineConfig,
}

impl ActionExecutor {
    pub fn new(capabilities: Capabilities, config: EngineConfig) -> Self {
        Self {
            capabilities,
            http: reqwest::Client::new(),
            config,
        }
    }

    pub async fn execute(&self, action: &ActionSpec, scope: &ExecutionScope) -> ActionOutcome {
        debug!(
            execution_id = %scope.execution_id,
            action = action.kind(),
            "executing workflow action"
        );

        match action {
            ActionSpec::SendEmail(config) => self.send_email(config, scope).await,
            ActionSpec::SendSms(config) => self.send_sms(config, scope).await,
            ActionSpec::SendWhatsapp(config) => self.send_whatsapp(config, scope).await,
            ActionSpec::SendPush(config) => self.send_push(config, scope).await,
            ActionSpec::CreateTask(config) => self.create_task(config, scope).await,
            ActionSpec::CreateReminder(config) => self.create_reminder(config, scope).await,
            ActionSpec::UpdateField(config) => self.update_field(config, scope).await,
            ActionSpec::AddTag(config) => self.add_tag(config, scope).await,
            ActionSpec::Webhook(config) => self.webhook(config, scope).await,
            ActionSpec::Delay(config) => self.delay(config),
            ActionSpec::Condition(config) => self.condition(config, scope).await,
        }
    }

    async fn send_email(&self, config: &EmailConfig, scope: &ExecutionScope) -> ActionOutcome {
        let Some(sender) = self.capabilities.email.clone() else {
            return ActionOutcome::failure("email channel not configured");
        };
        let config: EmailConfig = match resolve_config(config, &scope.context) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };

        let html = config.body.replace('\n', "<br>");
        match sender.send(&config.to, &config.subject, &html).await {
            Ok(receipt) => ActionOutcome::success(Some(json!({
                "to": config.to,
                "message_id": receipt.message_id,
            }))),
            Err(err) => ActionOutcome::failure(format!("email delivery failed: {err}")),
        }
    }

    async fn send_sms(&self, config: &SmsConfig, scope: &ExecutionScope) -> ActionOutcome {
        let Some(sender) = self.capabilities.sms.clone() else {
            return ActionOutcome::failure("sms channel not configured");
        };
        let config: SmsConfig = match resolve_config(config, &scope.context) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };

        match sender.send(&config.to, &config.message).await {
            Ok(receipt) => ActionOutcome::success(Some(json!({
                "to": config.to,
                "message_id": receipt.message_id,
            }))),
            Err(err) => ActionOutcome::failure(format!("sms delivery failed: {err}")),
        }
    }

    async fn send_whatsapp(
        &self,
        config: &WhatsAppConfig,
        scope: &ExecutionScope,
    ) -> ActionOutcome {
        let Some(sender) = self.capabilities.whatsapp.clone() else {
            return ActionOutcome::failure("whatsapp channel not configured");
        };
        let config: WhatsAppConfig = match resolve_config(config, &scope.context) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };

        match sender
            .send(&config.to, &config.template, &config.parameters)
            .await
        {
            Ok(receipt) => ActionOutcome::success(Some(json!({
                "to": config.to,
                "message_id": receipt.message_id,
            }))),
            Err(err) => ActionOutcome::failure(format!("whatsapp delivery failed: {err}")),
        }
    }

    async fn send_push(&self, config: &PushConfig, scope: &ExecutionScope) -> ActionOutcome {
        let Some(sender) = self.capabilities.push.clone() else {
            return ActionOutcome::failure("push channel not configured");
        };
        let config: PushConfig = match resolve_config(config, &scope.context) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };

        // Push goes to the user account behind the client, falling back to
        // the technician on internal triggers.
        let user_id = interpolate::lookup(&scope.context, "client.user_id")
            .or_else(|| interpolate::lookup(&scope.context, "technician.user_id"))
            .and_then(Value::as_str);
        let Some(user_id) = user_id else {
            return ActionOutcome::failure("no push recipient in execution context");
        };

        match sender
            .send(user_id, &config.title, &config.body, config.data.as_ref())
            .await
        {
            Ok(()) => ActionOutcome::success(Some(json!({ "user_id": user_id }))),
            Err(err) => ActionOutcome::failure(format!("push delivery failed: {err}")),
        }
    }

    async fn create_task(&self, config: &TaskConfig, scope: &ExecutionScope) -> ActionOutcome {
        let Some(tasks) = self.capabilities.tasks.clone() else {
            return ActionOutcome::failure("task store not configured");
        };
        let config: TaskConfig = match resolve_config(config, &scope.context) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };

        let due_date = Utc::now() + Duration::days(config.due_in_days.unwrap_or(1));
        let task = NewTask {
            organization_id: scope.organization_id,
            title: config.title,
            description: config.description,
            assigned_to: config.assign_to,
            due_date,
            related_entity_type: scope.entity_type.clone(),
            related_entity_id: scope.entity_id.clone(),
        };

        match tasks.create(task).await {
            Ok(task_id) => ActionOutcome::success(Some(json!({ "task_id": task_id }))),
            Err(err) => ActionOutcome::failure(format!("task creation failed: {err}")),
        }
    }

    async fn create_reminder(
        &self,
        config: &ReminderConfig,
        scope: &ExecutionScope,
    ) -> ActionOutcome {
        let Some(reminders) = self.capabilities.reminders.clone() else {
            return ActionOutcome::failure("reminder scheduler not configured");
        };
        let config: ReminderConfig = match resolve_config(config, &scope.context) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };

        let client_id = interpolate::lookup(&scope.context, "client.id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let channels = if config.channels.is_empty() {
            vec!["push".to_string()]
        } else {
            config.channels
        };
        let reminder = NewReminder {
            organization_id: scope.organization_id,
            client_id,
            kind: config.kind.unwrap_or_else(|| "workflow".to_string()),
            title: config.title,
            body: config.body,
            scheduled_for: config
                .scheduled_for
                .unwrap_or_else(|| Utc::now() + Duration::days(1)),
            channels,
        };

        match reminders.schedule(reminder).await {
            Ok(reminder_id) => ActionOutcome::success(Some(json!({ "reminder_id": reminder_id }))),
            Err(err) => ActionOutcome::failure(format!("reminder scheduling failed: {err}")),
        }
    }

    async fn update_field(
        &self,
        config: &UpdateFieldConfig,
        scope: &ExecutionScope,
    ) -> ActionOutcome {
        let Some(entities) = self.capabilities.entities.clone() else {
            return ActionOutcome::failure("entity store not configured");
        };
        let config: UpdateFieldConfig = match resolve_config(config, &scope.context) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };

        let id_path = format!("{}.id", config.entity_type);
        let Some(entity_id) = interpolate::lookup(&scope.context, &id_path)
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return ActionOutcome::failure(format!(
                "no {} entity in execution context",
                config.entity_type
            ));
        };

        match entities
            .update_field(&config.entity_type, &entity_id, &config.field, &config.value)
            .await
        {
            Ok(()) => ActionOutcome::success(Some(json!({
                "entity_type": config.entity_type,
                "entity_id": entity_id,
                "field": config.field,
            }))),
            Err(err) => ActionOutcome::failure(format!("field update failed: {err}")),
        }
    }

    async fn add_tag(&self, config: &TagConfig, scope: &ExecutionScope) -> ActionOutcome {
        let config: TagConfig = match resolve_config(config, &scope.context) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };
        // Tags live in host-side metadata; recorded here so the step history
        // carries the resolved tag even when no entity store is wired in.
        ActionOutcome::success(Some(json!({
            "entity_type": config.entity_type,
            "tag": config.tag,
        })))
    }

    async fn webhook(&self, config: &WebhookConfig, scope: &ExecutionScope) -> ActionOutcome {
        let config: WebhookConfig = match resolve_config(config, &scope.context) {
            Ok(config) => config,
            Err(outcome) => return outcome,
        };

        let method = match config.method {
            WebhookMethod::Get => reqwest::Method::GET,
            WebhookMethod::Post => reqwest::Method::POST,
            WebhookMethod::Put => reqwest::Method::PUT,
            WebhookMethod::Delete => reqwest::Method::DELETE,
            WebhookMethod::Patch => reqwest::Method::PATCH,
        };

        let mut attempt = 0u32;
        let mut backoff = self.config.webhook_retry_backoff_ms;
        loop {
            let mut request = self
                .http
                .request(method.clone(), &config.url)
                .timeout(std::time::Duration::from_secs(self.config.webhook_timeout_secs));
            for (name, value) in &config.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &config.body {
                request = request.json(body);
            }

            let retryable_error = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return ActionOutcome::success(Some(json!({
                            "status": status.as_u16(),
                            "body": body,
                        })));
                    }
                    if status.is_server_error() {
                        format!("webhook returned {status}")
                    } else {
                        // Client errors are not retried; the request itself
                        // is wrong.
                        return ActionOutcome::failure(format!(
                            "webhook returned {}",
                            status.as_u16()
                        ));
                    }
                }
                Err(err) if err.is_timeout() => format!(
                    "webhook timed out after {}s",
                    self.config.webhook_timeout_secs
                ),
                Err(err) => format!("webhook request failed: {err}"),
            };

            if attempt >= self.config.webhook_retry_attempts {
                return ActionOutcome::failure(retryable_error);
            }
            attempt += 1;
            warn!(
                execution_id = %scope.execution_id,
                url = %config.url,
                attempt,
                "retrying webhook: {retryable_error}"
            );
            tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
            backoff = backoff.saturating_mul(2);
        }
    }

    fn delay(&self, config: &DelayConfig) -> ActionOutcome {
        ActionOutcome::suspend(Utc::now() + config.duration())
    }

    async fn condition(&self, config: &ConditionConfig, scope: &ExecutionScope) -> ActionOutcome {
        let comparison = match Comparison::parse(&config.condition) {
            Ok(comparison) => comparison,
            Err(err) => return ActionOutcome::failure(err.to_string()),
        };
        let matched = comparison.evaluate(&scope.context);
        let branch = if matched {
            &config.then_actions
        } else {
            &config.else_actions
        };

        for nested in branch {
            let outcome = self.execute_boxed(nested, scope).await;
            if outcome.resume_at.is_some() {
                // Delays inside branches are rejected at validation; treat
                // one slipping through as a failure rather than suspending
                // mid-branch.
                return ActionOutcome::failure(
                    "delay action is not supported inside a condition branch",
                );
            }
            if !outcome.success {
                return ActionOutcome {
                    success: false,
                    result: Some(json!({ "matched": matched })),
                    error: outcome.error,
                    resume_at: None,
                };
            }
        }

        ActionOutcome::success(Some(json!({
            "matched": matched,
            "executed": branch.len(),
        })))
    }

    // Boxing breaks the infinite future type from condition recursion.
    fn execute_boxed<'a>(
        &'a self,
        action: &'a ActionSpec,
        scope: &'a ExecutionScope,
    ) -> Pin<Box<dyn Future<Output = ActionOutcome> + Send + 'a>> {
        Box::pin(self.execute(action, scope))
    }
}

/// Interpolate `{{path}}` tokens through a typed config. A context value
/// that no longer fits the config's types reads back as a decode error and
/// fails the step.
fn resolve_config<T>(config: &T, context: &Value) -> Result<T, ActionOutcome>
where
    T: Serialize + DeserializeOwned,
{
    interpolate::interpolate_config(config, context)
        .map_err(|err| ActionOutcome::failure(format!("invalid action configuration: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{DeliveryReceipt, EmailSender};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct RecordingEmail {
        sent: AtomicUsize,
        last: Mutex<Option<(String, String, String)>>,
    }

    impl RecordingEmail {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl EmailSender for RecordingEmail {
        async fn send(
            &self,
            to: &str,
            subject: &str,
            html: &str,
        ) -> anyhow::Result<DeliveryReceipt> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() =
                Some((to.to_string(), subject.to_string(), html.to_string()));
            Ok(DeliveryReceipt {
                message_id: "msg-1".to_string(),
            })
        }
    }

    fn scope(context: Value) -> ExecutionScope {
        ExecutionScope {
            execution_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            entity_type: "client".to_string(),
            entity_id: "c1".to_string(),
            context,
        }
    }

    #[tokio::test]
    async fn test_email_interpolates_and_sends() {
        let email = RecordingEmail::new();
        let executor = ActionExecutor::new(
            Capabilities::new().with_email(email.clone()),
            EngineConfig::default(),
        );

        let action = ActionSpec::SendEmail(EmailConfig {
            to: "{{client.email}}".to_string(),
            subject: "Hola {{client.name}}".to_string(),
            body: "line1\nline2".to_string(),
            template_id: None,
        });
        let scope = scope(json!({"client": {"email": "ana@example.com", "name": "Ana"}}));

        let outcome = executor.execute(&action, &scope).await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(email.sent.load(Ordering::SeqCst), 1);
        let (to, subject, html) = email.last.lock().unwrap().clone().unwrap();
        assert_eq!(to, "ana@example.com");
        assert_eq!(subject, "Hola Ana");
        assert_eq!(html, "line1<br>line2");
    }

    #[tokio::test]
    async fn test_missing_channel_fails_without_panic() {
        let executor = ActionExecutor::new(Capabilities::new(), EngineConfig::default());
        let action = ActionSpec::SendSms(SmsConfig {
            to: "+34600000000".to_string(),
            message: "hi".to_string(),
        });
        let outcome = executor.execute(&action, &scope(json!({}))).await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn test_delay_suspends() {
        let executor = ActionExecutor::new(Capabilities::new(), EngineConfig::default());
        let action = ActionSpec::Delay(DelayConfig {
            minutes: 0,
            hours: 2,
            days: 0,
        });
        let before = Utc::now();
        let outcome = executor.execute(&action, &scope(json!({}))).await;
        assert!(outcome.success);
        let resume_at = outcome.resume_at.unwrap();
        assert!(resume_at >= before + Duration::hours(2));
        assert!(resume_at <= Utc::now() + Duration::hours(2));
    }

    #[tokio::test]
    async fn test_condition_picks_branch() {
        let email = RecordingEmail::new();
        let executor = ActionExecutor::new(
            Capabilities::new().with_email(email.clone()),
            EngineConfig::default(),
        );

        let action = ActionSpec::Condition(ConditionConfig {
            condition: "{{invoice.amount}} > 100".to_string(),
            then_actions: vec![ActionSpec::SendEmail(EmailConfig {
                to: "big@example.com".to_string(),
                subject: "big".to_string(),
                body: "b".to_string(),
                template_id: None,
            })],
            else_actions: vec![],
        });

        let outcome = executor
            .execute(&action, &scope(json!({"invoice": {"amount": 250}})))
            .await;
        assert!(outcome.success);
        assert_eq!(email.sent.load(Ordering::SeqCst), 1);

        let outcome = executor
            .execute(&action, &scope(json!({"invoice": {"amount": 50}})))
            .await;
        assert!(outcome.success);
        // else branch empty, no extra send
        assert_eq!(email.sent.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome.result.unwrap(),
            json!({"matched": false, "executed": 0})
        );
    }

    #[tokio::test]
    async fn test_update_field_requires_entity_in_context() {
        struct NoEntities;
        #[async_trait]
        impl crate::channels::EntityStore for NoEntities {
            async fn update_field(
                &self,
                _entity_type: &str,
                _entity_id: &str,
                _field: &str,
                _value: &Value,
            ) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let executor = ActionExecutor::new(
            Capabilities::new().with_entities(Arc::new(NoEntities)),
            EngineConfig::default(),
        );
        let action = ActionSpec::UpdateField(UpdateFieldConfig {
            entity_type: "invoice".to_string(),
            field: "status".to_string(),
            value: json!("chased"),
        });
        let outcome = executor.execute(&action, &scope(json!({}))).await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("invoice"));
    }
}
