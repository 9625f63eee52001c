// Workflow Actions - The action sequence vocabulary
//
// Action specs are a tagged sum type so that an unknown action kind or a
// malformed configuration is rejected when the rule is created or decoded,
// never in the middle of a running execution.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One step in a rule's action sequence, with its typed configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum ActionSpec {
    SendEmail(EmailConfig),
    SendSms(SmsConfig),
    SendWhatsapp(WhatsAppConfig),
    SendPush(PushConfig),
    CreateTask(TaskConfig),
    CreateReminder(ReminderConfig),
    UpdateField(UpdateFieldConfig),
    AddTag(TagConfig),
    Webhook(WebhookConfig),
    Delay(DelayConfig),
    Condition(ConditionConfig),
}

impl ActionSpec {
    /// Stable wire name of the action kind, used in step results and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendEmail(_) => "send_email",
            Self::SendSms(_) => "send_sms",
            Self::SendWhatsapp(_) => "send_whatsapp",
            Self::SendPush(_) => "send_push",
            Self::CreateTask(_) => "create_task",
            Self::CreateReminder(_) => "create_reminder",
            Self::UpdateField(_) => "update_field",
            Self::AddTag(_) => "add_tag",
            Self::Webhook(_) => "webhook",
            Self::Delay(_) => "delay",
            Self::Condition(_) => "condition",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailConfig {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmsConfig {
    pub to: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhatsAppConfig {
    pub to: String,
    pub template: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushConfig {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_to: Option<String>,
    /// Days from now until the task is due; defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_in_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateFieldConfig {
    /// Context root naming the entity to update ("client", "invoice", ...).
    pub entity_type: String,
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagConfig {
    pub entity_type: String,
    pub tag: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    Get,
    #[default]
    Post,
    Put,
    Delete,
    Patch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub method: WebhookMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DelayConfig {
    #[serde(default)]
    pub minutes: i64,
    #[serde(default)]
    pub hours: i64,
    #[serde(default)]
    pub days: i64,
}

impl DelayConfig {
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes) + Duration::hours(self.hours) + Duration::days(self.days)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionConfig {
    /// Expression of the form `LHS <op> RHS`, see the conditions module.
    pub condition: String,
    #[serde(rename = "then")]
    pub then_actions: Vec<ActionSpec>,
    #[serde(rename = "else", default)]
    pub else_actions: Vec<ActionSpec>,
}

/// Uniform outcome returned by every action handler. Handlers never persist
/// anything themselves; the coordinator is the only writer of execution
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set only by the delay action: the execution suspends until this time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
}

impl ActionOutcome {
    pub fn success(result: Option<Value>) -> Self {
        Self {
            success: true,
            result,
            error: None,
            resume_at: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            resume_at: None,
        }
    }

    pub fn suspend(resume_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            result: Some(serde_json::json!({ "resume_at": resume_at })),
            error: None,
            resume_at: Some(resume_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_spec_wire_format() {
        let action = ActionSpec::SendEmail(EmailConfig {
            to: "{{client.email}}".to_string(),
            subject: "Hello".to_string(),
            body: "Dear {{client.first_name}}".to_string(),
            template_id: None,
        });

        let encoded = serde_json::to_value(&action).unwrap();
        assert_eq!(encoded["type"], "send_email");
        assert_eq!(encoded["config"]["to"], "{{client.email}}");

        let decoded: ActionSpec = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, action);
        assert_eq!(decoded.kind(), "send_email");
    }

    #[test]
    fn test_unknown_action_kind_rejected() {
        let raw = json!({"type": "launch_rocket", "config": {}});
        assert!(serde_json::from_value::<ActionSpec>(raw).is_err());
    }

    #[test]
    fn test_webhook_defaults() {
        let raw = json!({"type": "webhook", "config": {"url": "https://example.com/hook"}});
        let action: ActionSpec = serde_json::from_value(raw).unwrap();
        match action {
            ActionSpec::Webhook(config) => {
                assert_eq!(config.method, WebhookMethod::Post);
                assert!(config.headers.is_empty());
                assert!(config.body.is_none());
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_delay_duration() {
        let delay = DelayConfig {
            minutes: 30,
            hours: 1,
            days: 0,
        };
        assert_eq!(delay.duration(), Duration::minutes(90));
    }
}
