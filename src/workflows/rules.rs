// Workflow Rules - Definitions, validation and trigger filtering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::actions::ActionSpec;
use super::conditions::Comparison;
use super::interpolate;
use super::triggers::TriggerType;
use crate::error::{WorkflowError, WorkflowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Draft => "draft",
            RuleStatus::Active => "active",
            RuleStatus::Paused => "paused",
            RuleStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RuleStatus::Draft),
            "active" => Ok(RuleStatus::Active),
            "paused" => Ok(RuleStatus::Paused),
            "archived" => Ok(RuleStatus::Archived),
            other => Err(WorkflowError::InvalidData(format!(
                "unknown rule status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRule {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    /// Exact-match conditions on the event context, ANDed together.
    /// Values may contain `{{path}}` tokens resolved against the context.
    #[serde(default)]
    pub trigger_filter: BTreeMap<String, Value>,
    pub actions: Vec<ActionSpec>,
    pub enabled: bool,
    /// At most one execution per (rule, entity) when set.
    pub run_once: bool,
    pub status: RuleStatus,
    pub execution_count: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRule {
    pub fn from_create(organization_id: Uuid, created_by: Option<Uuid>, create: CreateRule) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: create.name,
            description: create.description,
            trigger_type: create.trigger_type,
            trigger_filter: create.trigger_filter,
            actions: create.actions,
            enabled: create.enabled,
            run_once: create.run_once,
            status: if create.enabled {
                RuleStatus::Active
            } else {
                RuleStatus::Draft
            },
            execution_count: 0,
            last_executed_at: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the trigger filter accepts an event context. Every filter
    /// entry must match; a path that resolves to nothing never matches.
    pub fn matches(&self, context: &Value) -> bool {
        self.trigger_filter.iter().all(|(path, expected)| {
            let expected = interpolate::interpolate_value(expected, context);
            match interpolate::lookup(context, path) {
                Some(actual) => *actual == expected,
                None => false,
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_filter: BTreeMap<String, Value>,
    pub actions: Vec<ActionSpec>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub run_once: bool,
}

fn default_true() -> bool {
    true
}

/// Partial update. The trigger type is fixed at creation; changing it would
/// orphan in-flight executions, so there is deliberately no field for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger_filter: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub actions: Option<Vec<ActionSpec>>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub run_once: Option<bool>,
    #[serde(default)]
    pub status: Option<RuleStatus>,
}

impl UpdateRule {
    pub fn apply(self, rule: &mut WorkflowRule) {
        if let Some(name) = self.name {
            rule.name = name;
        }
        if let Some(description) = self.description {
            rule.description = Some(description);
        }
        if let Some(filter) = self.trigger_filter {
            rule.trigger_filter = filter;
        }
        if let Some(actions) = self.actions {
            rule.actions = actions;
        }
        if let Some(run_once) = self.run_once {
            rule.run_once = run_once;
        }
        // Dispatch requires enabled && status == active, so the two fields
        // are kept coherent: setting one without the other moves both.
        match (self.enabled, self.status) {
            (Some(enabled), Some(status)) => {
                rule.enabled = enabled;
                rule.status = status;
            }
            (Some(true), None) => {
                rule.enabled = true;
                rule.status = RuleStatus::Active;
            }
            (Some(false), None) => {
                rule.enabled = false;
                if rule.status == RuleStatus::Active {
                    rule.status = RuleStatus::Paused;
                }
            }
            (None, Some(status)) => {
                rule.status = status;
                rule.enabled = status == RuleStatus::Active;
            }
            (None, None) => {}
        }
        rule.updated_at = Utc::now();
    }
}

/// Validate an action list before persisting a rule.
pub fn validate_actions(actions: &[ActionSpec]) -> WorkflowResult<()> {
    if actions.is_empty() {
        return Err(WorkflowError::InvalidRule(
            "a workflow rule needs at least one action".to_string(),
        ));
    }
    for action in actions {
        validate_action(action, false)?;
    }
    Ok(())
}

fn validate_action(action: &ActionSpec, in_branch: bool) -> WorkflowResult<()> {
    match action {
        ActionSpec::Delay(config) => {
            if in_branch {
                return Err(WorkflowError::InvalidRule(
                    "delay actions are not allowed inside condition branches".to_string(),
                ));
            }
            if config.duration() <= chrono::Duration::zero() {
                return Err(WorkflowError::InvalidRule(
                    "delay duration must be positive".to_string(),
                ));
            }
        }
        ActionSpec::Webhook(config) => {
            if config.url.trim().is_empty() {
                return Err(WorkflowError::InvalidRule(
                    "webhook action needs a url".to_string(),
                ));
            }
        }
        ActionSpec::Condition(config) => {
            Comparison::parse(&config.condition)?;
            if config.then_actions.is_empty() {
                return Err(WorkflowError::InvalidRule(
                    "condition action needs at least one 'then' action".to_string(),
                ));
            }
            for nested in config.then_actions.iter().chain(&config.else_actions) {
                validate_action(nested, true)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Aggregate counters for an organization's rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub total: u64,
    pub active: u64,
    pub total_executions: u64,
    pub by_trigger: BTreeMap<String, u64>,
}

impl WorkflowStats {
    pub fn from_rules<'a>(rules: impl IntoIterator<Item = &'a WorkflowRule>) -> Self {
        let mut stats = Self::default();
        for rule in rules {
            stats.total += 1;
            if rule.status == RuleStatus::Active {
                stats.active += 1;
            }
            stats.total_executions += rule.execution_count.max(0) as u64;
            *stats
                .by_trigger
                .entry(rule.trigger_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::actions::{ConditionConfig, DelayConfig, EmailConfig, WebhookConfig};
    use serde_json::json;

    fn email_action() -> ActionSpec {
        ActionSpec::SendEmail(EmailConfig {
            to: "{{client.email}}".to_string(),
            subject: "Hi".to_string(),
            body: "Hello".to_string(),
            template_id: None,
        })
    }

    fn rule_with_filter(filter: BTreeMap<String, Value>) -> WorkflowRule {
        WorkflowRule::from_create(
            Uuid::new_v4(),
            None,
            CreateRule {
                name: "test".to_string(),
                description: None,
                trigger_type: TriggerType::ClientCreated,
                trigger_filter: filter,
                actions: vec![email_action()],
                enabled: true,
                run_once: false,
            },
        )
    }

    #[test]
    fn test_validate_rejects_empty_actions() {
        assert!(validate_actions(&[]).is_err());
        assert!(validate_actions(&[email_action()]).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_delay() {
        let delay = ActionSpec::Delay(DelayConfig {
            minutes: 0,
            hours: 0,
            days: 0,
        });
        assert!(validate_actions(&[delay]).is_err());
    }

    #[test]
    fn test_validate_rejects_delay_in_branch() {
        let condition = ActionSpec::Condition(ConditionConfig {
            condition: "{{x}} == 1".to_string(),
            then_actions: vec![ActionSpec::Delay(DelayConfig {
                minutes: 5,
                hours: 0,
                days: 0,
            })],
            else_actions: vec![],
        });
        let err = validate_actions(&[condition]).unwrap_err();
        assert!(err.to_string().contains("condition branches"));
    }

    #[test]
    fn test_validate_rejects_bad_condition_expression() {
        let condition = ActionSpec::Condition(ConditionConfig {
            condition: "{{x}}".to_string(),
            then_actions: vec![email_action()],
            else_actions: vec![],
        });
        assert!(validate_actions(&[condition]).is_err());

        let empty_then = ActionSpec::Condition(ConditionConfig {
            condition: "{{x}} == 1".to_string(),
            then_actions: vec![],
            else_actions: vec![email_action()],
        });
        assert!(validate_actions(&[empty_then]).is_err());
    }

    #[test]
    fn test_validate_rejects_blank_webhook_url() {
        let webhook = ActionSpec::Webhook(WebhookConfig {
            url: "  ".to_string(),
            method: Default::default(),
            headers: Default::default(),
            body: None,
        });
        assert!(validate_actions(&[webhook]).is_err());
    }

    #[test]
    fn test_filter_matching() {
        let mut filter = BTreeMap::new();
        filter.insert("client.language".to_string(), json!("es"));
        let rule = rule_with_filter(filter);

        assert!(rule.matches(&json!({"client": {"language": "es"}})));
        assert!(!rule.matches(&json!({"client": {"language": "en"}})));
        // Missing path never matches.
        assert!(!rule.matches(&json!({"client": {}})));
    }

    #[test]
    fn test_filter_conjunction() {
        let mut filter = BTreeMap::new();
        filter.insert("client.language".to_string(), json!("es"));
        filter.insert("client.vip".to_string(), json!(true));
        let rule = rule_with_filter(filter);

        assert!(rule.matches(&json!({"client": {"language": "es", "vip": true}})));
        assert!(!rule.matches(&json!({"client": {"language": "es", "vip": false}})));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let rule = rule_with_filter(BTreeMap::new());
        assert!(rule.matches(&json!({})));
    }

    #[test]
    fn test_update_never_touches_trigger_type() {
        let mut rule = rule_with_filter(BTreeMap::new());
        let update = UpdateRule {
            name: Some("renamed".to_string()),
            enabled: Some(false),
            ..Default::default()
        };
        update.apply(&mut rule);
        assert_eq!(rule.name, "renamed");
        assert!(!rule.enabled);
        assert_eq!(rule.trigger_type, TriggerType::ClientCreated);
    }

    #[test]
    fn test_update_keeps_enabled_and_status_coherent() {
        let mut rule = rule_with_filter(BTreeMap::new());
        assert_eq!(rule.status, RuleStatus::Active);

        // Disabling pauses an active rule.
        UpdateRule {
            enabled: Some(false),
            ..Default::default()
        }
        .apply(&mut rule);
        assert_eq!(rule.status, RuleStatus::Paused);

        // Pausing by status alone also stops dispatch via enabled.
        UpdateRule {
            enabled: Some(true),
            ..Default::default()
        }
        .apply(&mut rule);
        UpdateRule {
            status: Some(RuleStatus::Paused),
            ..Default::default()
        }
        .apply(&mut rule);
        assert!(!rule.enabled);

        UpdateRule {
            status: Some(RuleStatus::Active),
            ..Default::default()
        }
        .apply(&mut rule);
        assert!(rule.enabled);
        assert_eq!(rule.status, RuleStatus::Active);
    }

    #[test]
    fn test_stats() {
        let mut a = rule_with_filter(BTreeMap::new());
        a.execution_count = 3;
        let mut b = rule_with_filter(BTreeMap::new());
        b.enabled = false;
        b.status = RuleStatus::Paused;
        b.trigger_type = TriggerType::InvoiceOverdue;

        let stats = WorkflowStats::from_rules([&a, &b]);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.by_trigger.get("client_created"), Some(&1));
        assert_eq!(stats.by_trigger.get("invoice_overdue"), Some(&1));
    }
}
