use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::bounded::push_bounded;
use crate::enterprise::EnterpriseStatusSnapshot;
use crate::integration::{IntegrationRecord, RecordId, RecordStatus};

/// Capacity limits for the persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapacity {
    /// Maximum queued records.
    pub queue: usize,
    /// Maximum delivered records kept for inspection.
    pub history: usize,
    /// Maximum dead-lettered records kept for inspection.
    pub dead_letter: usize,
    /// Maximum autopilot status snapshots.
    pub enterprise_status: usize,
}

impl Default for StoreCapacity {
    fn default() -> Self {
        Self {
            queue: 3_000,
            history: 10_000,
            dead_letter: 10_000,
            enterprise_status: 2_000,
        }
    }
}

/// Persisted integration document.
///
/// A record lives in exactly one of `queue`, `history`, `dead_letter`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationStoreState {
    /// Records awaiting delivery, oldest first.
    #[serde(default)]
    pub queue: VecDeque<IntegrationRecord>,
    /// Delivered records, oldest first.
    #[serde(default)]
    pub history: VecDeque<IntegrationRecord>,
    /// Records that exhausted their retry budget, oldest first.
    #[serde(default)]
    pub dead_letter: VecDeque<IntegrationRecord>,
    /// Autopilot run snapshots, oldest first.
    #[serde(default)]
    pub enterprise_status: VecDeque<EnterpriseStatusSnapshot>,
}

impl IntegrationStoreState {
    /// Appends one queued record and returns records evicted by capacity.
    pub fn push_queued(
        &mut self,
        record: IntegrationRecord,
        capacity: &StoreCapacity,
    ) -> Vec<IntegrationRecord> {
        push_bounded(&mut self.queue, record, capacity.queue)
    }

    /// Appends one autopilot snapshot.
    pub fn push_enterprise_status(
        &mut self,
        snapshot: EnterpriseStatusSnapshot,
        capacity: &StoreCapacity,
    ) {
        push_bounded(
            &mut self.enterprise_status,
            snapshot,
            capacity.enterprise_status,
        );
    }

    /// Returns the position of one queued record.
    #[must_use]
    pub fn queue_position(&self, record_id: RecordId) -> Option<usize> {
        self.queue.iter().position(|record| record.id() == record_id)
    }

    /// Commits one attempted record into the collection matching its status.
    ///
    /// Queued records are replaced in place so insertion order is preserved.
    /// Terminal records leave the queue and move to `history` or
    /// `dead_letter`. Returns false when a queued record is no longer
    /// present, which happens only after capacity eviction.
    pub fn commit_attempt(&mut self, record: IntegrationRecord, capacity: &StoreCapacity) -> bool {
        let position = self.queue_position(record.id());

        match record.status() {
            RecordStatus::Queued => match position {
                Some(index) => {
                    self.queue[index] = record;
                    true
                }
                None => false,
            },
            RecordStatus::Sent => {
                if let Some(index) = position {
                    self.queue.remove(index);
                }
                push_bounded(&mut self.history, record, capacity.history);
                true
            }
            RecordStatus::DeadLetter => {
                if let Some(index) = position {
                    self.queue.remove(index);
                }
                push_bounded(&mut self.dead_letter, record, capacity.dead_letter);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{IntegrationStoreState, StoreCapacity};
    use crate::integration::{IntegrationRecord, NewIntegrationRecord, RecordStatus, Transport};

    fn record(kind: &str) -> IntegrationRecord {
        match IntegrationRecord::new(
            NewIntegrationRecord {
                kind: kind.to_owned(),
                source: "ui".to_owned(),
                payload: json!({}),
                transport: Transport::TargetWebhook,
            },
            Utc::now(),
        ) {
            Ok(record) => record,
            Err(error) => panic!("record should be valid: {error}"),
        }
    }

    #[test]
    fn commit_keeps_retried_record_in_original_position() {
        let mut state = IntegrationStoreState::default();
        let capacity = StoreCapacity::default();
        let first = record("event.first");
        let second = record("event.second");
        state.push_queued(first.clone(), &capacity);
        state.push_queued(second.clone(), &capacity);

        let mut attempted = first.clone();
        attempted.begin_attempt(Utc::now());
        attempted.complete_attempt(false, "http=500", 5, Utc::now());
        assert!(state.commit_attempt(attempted, &capacity));

        assert_eq!(state.queue[0].id(), first.id());
        assert_eq!(state.queue[0].attempts(), 1);
        assert_eq!(state.queue[1].id(), second.id());
    }

    #[test]
    fn commit_moves_terminal_records_out_of_queue() {
        let mut state = IntegrationStoreState::default();
        let capacity = StoreCapacity::default();
        let delivered = record("event.delivered");
        let exhausted = record("event.exhausted");
        state.push_queued(delivered.clone(), &capacity);
        state.push_queued(exhausted.clone(), &capacity);

        let mut delivered = delivered;
        delivered.begin_attempt(Utc::now());
        delivered.complete_attempt(true, "http=200", 1, Utc::now());
        let mut exhausted = exhausted;
        exhausted.begin_attempt(Utc::now());
        exhausted.complete_attempt(false, "http=500", 1, Utc::now());

        assert!(state.commit_attempt(delivered, &capacity));
        assert!(state.commit_attempt(exhausted, &capacity));

        assert!(state.queue.is_empty());
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].status(), RecordStatus::Sent);
        assert_eq!(state.dead_letter.len(), 1);
        assert_eq!(state.dead_letter[0].status(), RecordStatus::DeadLetter);
    }

    #[test]
    fn commit_reports_evicted_retry() {
        let mut state = IntegrationStoreState::default();
        let mut orphan = record("event.orphan");
        orphan.begin_attempt(Utc::now());
        orphan.complete_attempt(false, "http=0", 5, Utc::now());

        assert!(!state.commit_attempt(orphan, &StoreCapacity::default()));
        assert!(state.queue.is_empty());
    }

    #[test]
    fn missing_collections_deserialize_empty() {
        let parsed = serde_json::from_str::<IntegrationStoreState>(r#"{"queue": []}"#);
        assert!(parsed.is_ok_and(|state| state.history.is_empty() && state.dead_letter.is_empty()));
    }
}
