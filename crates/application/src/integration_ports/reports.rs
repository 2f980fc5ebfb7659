use procura_domain::{EnterpriseStatusSnapshot, IntegrationRecord, RecordId, RecordStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushResult {
    /// Records attempted.
    pub processed: usize,
    /// Records delivered.
    pub success: usize,
    /// Records that failed, dead-lettered ones included.
    pub failed: usize,
    /// Records moved to dead-letter.
    pub dead_lettered: usize,
    /// Records left in the queue after commit.
    pub queue_remaining: usize,
    /// Whether the static target webhook is configured.
    pub target_configured: bool,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No dead letters and no stale queued records.
    Ok,
    /// Dead letters exist or the oldest queued record is stale.
    Degraded,
}

/// Delivery activity over the last 24 hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushWindowCounts {
    /// Records delivered.
    pub sent: usize,
    /// Records moved to dead-letter.
    pub dead_lettered: usize,
    /// Queued records with a failed attempt.
    pub retried: usize,
}

/// Health view over the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Overall status.
    pub status: HealthStatus,
    /// Queued records.
    pub queue_total: usize,
    /// Delivered records kept.
    pub history_total: usize,
    /// Dead-lettered records kept.
    pub dead_letter_total: usize,
    /// Autopilot snapshots kept.
    pub enterprise_status_total: usize,
    /// Age of the oldest queued record.
    pub oldest_queued_seconds: i64,
    /// Whether the static target webhook is configured.
    pub target_configured: bool,
    /// Configured retry budget.
    pub max_attempts: u32,
    /// Best-effort audit writes that failed since start.
    pub audit_write_failures: u64,
    /// Activity over the last 24 hours.
    pub flush_24h_counts: FlushWindowCounts,
}

/// Totals and latest items of every collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueOverview {
    /// Queued records.
    pub queue_total: usize,
    /// Delivered records kept.
    pub history_total: usize,
    /// Dead-lettered records kept.
    pub dead_letter_total: usize,
    /// Autopilot snapshots kept.
    pub enterprise_status_total: usize,
    /// Latest queued records.
    pub queue: Vec<IntegrationRecord>,
    /// Latest delivered records.
    pub history: Vec<IntegrationRecord>,
    /// Latest dead-lettered records.
    pub dead_letter: Vec<IntegrationRecord>,
    /// Latest autopilot snapshots.
    pub enterprise_status: Vec<EnterpriseStatusSnapshot>,
    /// Whether the static target webhook is configured.
    pub target_configured: bool,
}

/// Input for one externally submitted event.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitEventInput {
    /// Semantic event type.
    pub kind: String,
    /// Origin tag.
    pub source: String,
    /// Opaque payload.
    pub payload: Value,
    /// Optional idempotency key.
    pub idempotency_key: Option<String>,
}

/// Replayable acknowledgement of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Always true for accepted submissions.
    pub ok: bool,
    /// Identifier of the queued record.
    pub record_id: RecordId,
    /// Status at acceptance time.
    pub status: RecordStatus,
    /// True when this receipt was replayed from the idempotency cache.
    #[serde(default)]
    pub duplicate: bool,
}
