// Workflow Triggers - Business events that can start workflow executions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowError;

/// Closed set of business events that rules can subscribe to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    ServiceCreated,
    ServiceCompleted,
    ClientCreated,
    PianoRegistered,
    AppointmentScheduled,
    InvoiceCreated,
    InvoicePaid,
    InvoiceOverdue,
    QuoteAccepted,
    QuoteRejected,
    WarrantyExpiring,
    ContractExpiring,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceCreated => "service_created",
            Self::ServiceCompleted => "service_completed",
            Self::ClientCreated => "client_created",
            Self::PianoRegistered => "piano_registered",
            Self::AppointmentScheduled => "appointment_scheduled",
            Self::InvoiceCreated => "invoice_created",
            Self::InvoicePaid => "invoice_paid",
            Self::InvoiceOverdue => "invoice_overdue",
            Self::QuoteAccepted => "quote_accepted",
            Self::QuoteRejected => "quote_rejected",
            Self::WarrantyExpiring => "warranty_expiring",
            Self::ContractExpiring => "contract_expiring",
        }
    }

    /// Context roots each event provides, for rule editors and filter
    /// validation in the host application.
    pub fn context_variables(&self) -> &'static [&'static str] {
        match self {
            Self::ServiceCreated | Self::ServiceCompleted => {
                &["service", "client", "piano", "technician"]
            }
            Self::ClientCreated => &["client"],
            Self::PianoRegistered => &["piano", "client"],
            Self::AppointmentScheduled => &["appointment", "client", "piano"],
            Self::InvoiceCreated | Self::InvoicePaid => &["invoice", "client", "service"],
            Self::InvoiceOverdue => &["invoice", "client"],
            Self::QuoteAccepted | Self::QuoteRejected => &["quote", "client", "piano"],
            Self::WarrantyExpiring => &["warranty", "client", "piano", "service"],
            Self::ContractExpiring => &["contract", "client"],
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service_created" => Ok(Self::ServiceCreated),
            "service_completed" => Ok(Self::ServiceCompleted),
            "client_created" => Ok(Self::ClientCreated),
            "piano_registered" => Ok(Self::PianoRegistered),
            "appointment_scheduled" => Ok(Self::AppointmentScheduled),
            "invoice_created" => Ok(Self::InvoiceCreated),
            "invoice_paid" => Ok(Self::InvoicePaid),
            "invoice_overdue" => Ok(Self::InvoiceOverdue),
            "quote_accepted" => Ok(Self::QuoteAccepted),
            "quote_rejected" => Ok(Self::QuoteRejected),
            "warranty_expiring" => Ok(Self::WarrantyExpiring),
            "contract_expiring" => Ok(Self::ContractExpiring),
            other => Err(WorkflowError::InvalidData(format!(
                "unknown trigger type '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business event handed to the dispatcher. The context is captured as an
/// immutable snapshot on every execution created from this event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub trigger_type: TriggerType,
    /// Entity kind the event is about ("invoice", "service", ...), used for
    /// run-once deduplication together with `entity_id`.
    pub entity_type: String,
    pub entity_id: String,
    pub context: Value,
    pub occurred_at: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(
        trigger_type: TriggerType,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            trigger_type,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            context: Value::Object(serde_json::Map::new()),
            occurred_at: Utc::now(),
        }
    }

    /// Attach a context root (e.g. `client`, `invoice`) to the event.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.context {
            map.insert(key.to_string(), value);
        }
        self
    }

    // ===== Convenience constructors for common events =====

    pub fn client_created(client_id: &str, client: Value) -> Self {
        Self::new(TriggerType::ClientCreated, "client", client_id).with("client", client)
    }

    pub fn service_completed(service_id: &str, service: Value, client: Value) -> Self {
        Self::new(TriggerType::ServiceCompleted, "service", service_id)
            .with("service", service)
            .with("client", client)
    }

    pub fn invoice_overdue(invoice_id: &str, invoice: Value, client: Value) -> Self {
        Self::new(TriggerType::InvoiceOverdue, "invoice", invoice_id)
            .with("invoice", invoice)
            .with("client", client)
    }

    pub fn appointment_scheduled(appointment_id: &str, appointment: Value, client: Value) -> Self {
        Self::new(TriggerType::AppointmentScheduled, "appointment", appointment_id)
            .with("appointment", appointment)
            .with("client", client)
    }
}
