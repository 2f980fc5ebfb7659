use super::*;

const FLUSH_MAX_LIMIT: usize = 500;

impl IntegrationQueueService {
    /// Attempts delivery of up to `limit` oldest queued records.
    ///
    /// Claimed records stay in the queue while they are dispatched and are
    /// committed once per batch: delivered records move to history,
    /// exhausted ones to dead-letter, the rest keep their queue position.
    pub async fn flush(&self, limit: usize) -> AppResult<FlushResult> {
        if !(1..=FLUSH_MAX_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "flush limit must be between 1 and {FLUSH_MAX_LIMIT}"
            )));
        }

        let claimed = self.claim_batch(limit).await?;
        let mut result = FlushResult {
            target_configured: self.dispatcher.target_configured(),
            ..FlushResult::default()
        };

        let mut attempted = Vec::with_capacity(claimed.len());
        for mut record in claimed {
            record.begin_attempt(Utc::now());
            let outcome = self.dispatcher.dispatch_record(&record).await;
            let status = record.complete_attempt(
                outcome.delivered,
                outcome.diagnostic.as_str(),
                self.config.max_attempts,
                Utc::now(),
            );

            result.processed += 1;
            match status {
                RecordStatus::Sent => result.success += 1,
                RecordStatus::Queued => result.failed += 1,
                RecordStatus::DeadLetter => {
                    result.failed += 1;
                    result.dead_lettered += 1;
                }
            }

            debug!(
                record_id = %record.id(),
                attempts = record.attempts(),
                status = status.as_str(),
                diagnostic = %outcome.diagnostic,
                "integration record attempted"
            );
            attempted.push(record);
        }

        result.queue_remaining = match self.commit_batch(&attempted).await {
            Ok(queue_remaining) => queue_remaining,
            Err(error) => {
                warn!(
                    processed = result.processed,
                    success = result.success,
                    failed = result.failed,
                    dead_lettered = result.dead_lettered,
                    error = %error,
                    "failed to persist flush batch"
                );
                return Err(error);
            }
        };

        self.audit_batch(&attempted, &result).await;

        if result.processed > 0 {
            info!(
                processed = result.processed,
                success = result.success,
                failed = result.failed,
                dead_lettered = result.dead_lettered,
                queue_remaining = result.queue_remaining,
                "integration queue flushed"
            );
        }

        Ok(result)
    }

    async fn claim_batch(&self, limit: usize) -> AppResult<Vec<IntegrationRecord>> {
        let mut in_flight = self.store_lock.lock().await;
        let state = self.store.load().await?;

        let claimed: Vec<IntegrationRecord> = state
            .queue
            .iter()
            .filter(|record| !in_flight.contains(&record.id()))
            .take(limit)
            .cloned()
            .collect();

        in_flight.extend(claimed.iter().map(IntegrationRecord::id));
        Ok(claimed)
    }

    async fn commit_batch(&self, attempted: &[IntegrationRecord]) -> AppResult<usize> {
        let mut in_flight = self.store_lock.lock().await;
        for record in attempted {
            in_flight.remove(&record.id());
        }

        if attempted.is_empty() {
            return Ok(self.store.load().await?.queue.len());
        }

        let mut state = self.store.load().await?;
        for record in attempted {
            if !state.commit_attempt(record.clone(), &self.config.capacity) {
                warn!(
                    record_id = %record.id(),
                    "retried record was evicted from the queue before commit"
                );
            }
        }
        self.store.save(&state).await?;

        Ok(state.queue.len())
    }

    async fn audit_batch(&self, attempted: &[IntegrationRecord], result: &FlushResult) {
        if attempted.is_empty() {
            return;
        }

        for record in attempted {
            self.audit
                .record(
                    NewAuditEntry::new("queue.flush_item", record.status().as_str())
                        .with_record_id(record.id())
                        .with_note(record.last_result().unwrap_or_default())
                        .with_payload(json!({
                            "kind": record.kind(),
                            "attempts": record.attempts(),
                        })),
                )
                .await;
        }

        self.audit
            .record(
                NewAuditEntry::new("queue.flush", "ok").with_note(format!(
                    "processed={} success={} failed={} dead_lettered={}",
                    result.processed, result.success, result.failed, result.dead_lettered
                )),
            )
            .await;
    }
}
