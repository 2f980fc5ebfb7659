use super::*;

impl IntegrationQueueService {
    /// Validates and appends one record to the queue.
    ///
    /// The record is durable once this returns. Records evicted by the queue
    /// capacity are logged.
    pub async fn enqueue(&self, input: NewIntegrationRecord) -> AppResult<IntegrationRecord> {
        let record = IntegrationRecord::new(input, Utc::now())?;

        let evicted = {
            let _guard = self.store_lock.lock().await;
            let mut state = self.store.load().await?;
            let evicted = state.push_queued(record.clone(), &self.config.capacity);
            self.store.save(&state).await?;
            evicted
        };

        for dropped in &evicted {
            warn!(
                record_id = %dropped.id(),
                kind = dropped.kind(),
                "queue capacity reached, evicted oldest record"
            );
        }

        info!(
            record_id = %record.id(),
            kind = record.kind(),
            transport = record.transport().mode(),
            "integration record queued"
        );

        self.audit
            .record(
                NewAuditEntry::new("queue.append", "ok")
                    .with_record_id(record.id())
                    .with_note(record.kind())
                    .with_payload(json!({ "source": record.source() })),
            )
            .await;

        Ok(record)
    }

    /// Appends one autopilot snapshot to the bounded status history.
    pub async fn record_enterprise_status(&self, snapshot: EnterpriseStatusSnapshot) -> AppResult<()> {
        let _guard = self.store_lock.lock().await;
        let mut state = self.store.load().await?;
        state.push_enterprise_status(snapshot, &self.config.capacity);
        self.store.save(&state).await
    }
}
