use std::collections::VecDeque;

use super::*;

const OVERVIEW_DEFAULT_LIMIT: usize = 20;
const OVERVIEW_MAX_LIMIT: usize = 500;
const ENTERPRISE_STATUS_MAX_LIMIT: usize = 500;

impl IntegrationQueueService {
    /// Returns collection totals and the latest items of each, newest first.
    pub async fn queue_overview(&self, limit: Option<usize>) -> AppResult<QueueOverview> {
        let limit = limit
            .unwrap_or(OVERVIEW_DEFAULT_LIMIT)
            .clamp(1, OVERVIEW_MAX_LIMIT);
        let state = self.store.load().await?;

        Ok(QueueOverview {
            queue_total: state.queue.len(),
            history_total: state.history.len(),
            dead_letter_total: state.dead_letter.len(),
            enterprise_status_total: state.enterprise_status.len(),
            queue: latest(&state.queue, limit),
            history: latest(&state.history, limit),
            dead_letter: latest(&state.dead_letter, limit),
            enterprise_status: latest(&state.enterprise_status, limit),
            target_configured: self.dispatcher.target_configured(),
        })
    }

    /// Returns the latest autopilot snapshots, newest first.
    /// `limit` is clamped to 1..=500.
    pub async fn enterprise_status(
        &self,
        limit: usize,
    ) -> AppResult<Vec<EnterpriseStatusSnapshot>> {
        let state = self.store.load().await?;
        Ok(latest(
            &state.enterprise_status,
            limit.clamp(1, ENTERPRISE_STATUS_MAX_LIMIT),
        ))
    }

    /// Lists the latest audit entries, newest first.
    pub async fn read_audit(&self, limit: usize) -> AppResult<Vec<AuditEntry>> {
        self.audit.read_recent(limit).await
    }

    /// Summarizes queue health.
    ///
    /// Status is degraded when dead letters exist or the oldest queued record
    /// is older than the configured staleness threshold.
    pub async fn health_snapshot(&self) -> AppResult<HealthSnapshot> {
        let state = self.store.load().await?;
        let now = Utc::now();

        let oldest_queued_seconds = state
            .queue
            .iter()
            .map(IntegrationRecord::created_at)
            .min()
            .map(|created_at| (now - created_at).num_seconds().max(0))
            .unwrap_or_default();

        let degraded = !state.dead_letter.is_empty()
            || oldest_queued_seconds > self.config.stale_queue_threshold_seconds;

        Ok(HealthSnapshot {
            status: if degraded {
                HealthStatus::Degraded
            } else {
                HealthStatus::Ok
            },
            queue_total: state.queue.len(),
            history_total: state.history.len(),
            dead_letter_total: state.dead_letter.len(),
            enterprise_status_total: state.enterprise_status.len(),
            oldest_queued_seconds,
            target_configured: self.dispatcher.target_configured(),
            max_attempts: self.config.max_attempts,
            audit_write_failures: self.audit.write_failures(),
            flush_24h_counts: window_counts(&state, now - Duration::hours(24)),
        })
    }
}

fn latest<T: Clone>(items: &VecDeque<T>, limit: usize) -> Vec<T> {
    items.iter().rev().take(limit).cloned().collect()
}

fn window_counts(state: &IntegrationStoreState, since: chrono::DateTime<Utc>) -> FlushWindowCounts {
    let within = |at: Option<chrono::DateTime<Utc>>| at.is_some_and(|at| at >= since);

    FlushWindowCounts {
        sent: state
            .history
            .iter()
            .filter(|record| within(record.sent_at()))
            .count(),
        dead_lettered: state
            .dead_letter
            .iter()
            .filter(|record| within(record.dead_letter_at()))
            .count(),
        retried: state
            .queue
            .iter()
            .filter(|record| record.attempts() > 0 && within(record.last_attempt_at()))
            .count(),
    }
}
