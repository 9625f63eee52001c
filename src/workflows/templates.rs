// Workflow Templates - Ready-made rules an organization can enable as-is

use super::actions::{ActionSpec, DelayConfig, EmailConfig, SmsConfig};
use super::rules::CreateRule;
use super::triggers::TriggerType;

pub fn all() -> Vec<CreateRule> {
    vec![
        welcome_new_client(),
        post_service_feedback(),
        overdue_invoice_reminder(),
        appointment_confirmation(),
    ]
}

/// Greets a client right after they are registered.
pub fn welcome_new_client() -> CreateRule {
    CreateRule {
        name: "Welcome new client".to_string(),
        description: Some("Sends a welcome email when a client is registered".to_string()),
        trigger_type: TriggerType::ClientCreated,
        trigger_filter: Default::default(),
        actions: vec![ActionSpec::SendEmail(EmailConfig {
            to: "{{client.email}}".to_string(),
            subject: "Welcome, {{client.name}}!".to_string(),
            body: "Hi {{client.name}},\n\nThanks for trusting us with your piano.\nWe'll keep you posted about tunings and maintenance.".to_string(),
            template_id: None,
        })],
        enabled: false,
        run_once: true,
    }
}

/// Asks for feedback one day after a service is completed.
pub fn post_service_feedback() -> CreateRule {
    CreateRule {
        name: "Post-service feedback".to_string(),
        description: Some("Requests feedback the day after a completed service".to_string()),
        trigger_type: TriggerType::ServiceCompleted,
        trigger_filter: Default::default(),
        actions: vec![
            ActionSpec::Delay(DelayConfig {
                minutes: 0,
                hours: 0,
                days: 1,
            }),
            ActionSpec::SendEmail(EmailConfig {
                to: "{{client.email}}".to_string(),
                subject: "How was your {{service.type}}?".to_string(),
                body: "Hi {{client.name}},\n\nYesterday we finished the {{service.type}} on your piano.\nWe'd love to hear how everything went.".to_string(),
                template_id: None,
            }),
        ],
        enabled: false,
        run_once: false,
    }
}

/// Nudges a client when an invoice goes overdue.
pub fn overdue_invoice_reminder() -> CreateRule {
    CreateRule {
        name: "Overdue invoice reminder".to_string(),
        description: Some("Emails the client when an invoice becomes overdue".to_string()),
        trigger_type: TriggerType::InvoiceOverdue,
        trigger_filter: Default::default(),
        actions: vec![ActionSpec::SendEmail(EmailConfig {
            to: "{{client.email}}".to_string(),
            subject: "Invoice {{invoice.number}} is overdue".to_string(),
            body: "Hi {{client.name}},\n\nInvoice {{invoice.number}} for {{invoice.amount}} is past its due date.\nPlease settle it at your earliest convenience.".to_string(),
            template_id: None,
        })],
        enabled: false,
        run_once: false,
    }
}

/// Confirms a new appointment by email and SMS.
pub fn appointment_confirmation() -> CreateRule {
    CreateRule {
        name: "Appointment confirmation".to_string(),
        description: Some("Confirms scheduled appointments by email and SMS".to_string()),
        trigger_type: TriggerType::AppointmentScheduled,
        trigger_filter: Default::default(),
        actions: vec![
            ActionSpec::SendEmail(EmailConfig {
                to: "{{client.email}}".to_string(),
                subject: "Appointment confirmed for {{appointment.date}}".to_string(),
                body: "Hi {{client.name}},\n\nYour appointment is confirmed for {{appointment.date}}.\nSee you then!".to_string(),
                template_id: None,
            }),
            ActionSpec::SendSms(SmsConfig {
                to: "{{client.phone}}".to_string(),
                message: "Appointment confirmed for {{appointment.date}}.".to_string(),
            }),
        ],
        enabled: false,
        run_once: false,
    }
}
