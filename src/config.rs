use std::env;

/// Engine tuning knobs, read from the environment with sensible defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the resumer scans for due executions (seconds).
    pub resume_interval_secs: u64,
    /// Bound on each outbound webhook request.
    pub webhook_timeout_secs: u64,
    /// Extra attempts for transient webhook failures (timeouts, 5xx).
    pub webhook_retry_attempts: u32,
    /// Base backoff between webhook retries; doubles per attempt.
    pub webhook_retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resume_interval_secs: 60,
            webhook_timeout_secs: 10,
            webhook_retry_attempts: 2,
            webhook_retry_backoff_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            resume_interval_secs: env::var("WORKFLOW_RESUME_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.resume_interval_secs),
            webhook_timeout_secs: env::var("WORKFLOW_WEBHOOK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.webhook_timeout_secs),
            webhook_retry_attempts: env::var("WORKFLOW_WEBHOOK_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.webhook_retry_attempts),
            webhook_retry_backoff_ms: env::var("WORKFLOW_WEBHOOK_RETRY_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.webhook_retry_backoff_ms),
        })
    }
}
