use super::*;

impl EnterpriseAutopilotService {
    /// Runs the pipeline for one caller request.
    ///
    /// A keyed request replays its first response. Unless disabled in
    /// settings, every fresh run appends one entry to the immutable ledger;
    /// a ledger failure fails the request after the run was recorded.
    pub async fn run_autopilot_request(
        &self,
        request: AutopilotRequest,
    ) -> AppResult<AutopilotResponse> {
        let idempotency_key =
            IdempotencyService::normalize_key(request.idempotency_key.as_deref())?;
        let settings = AutopilotSettings::from_value(&request.settings)?;
        let procedure_id = request.procedure_id.trim().to_owned();

        let Some(key) = idempotency_key else {
            return self
                .execute(&request.payload, &settings, procedure_id, request.access)
                .await;
        };

        let idempotency = self.queue_service.idempotency();
        let _guard = idempotency
            .lock_key(IdempotencyScope::Autopilot, key.as_str())
            .await;

        if let Some(cached) = idempotency.get(IdempotencyScope::Autopilot, key.as_str()).await {
            match serde_json::from_value::<AutopilotResponse>(cached) {
                Ok(mut response) => {
                    response.duplicate = true;
                    self.queue_service
                        .audit()
                        .record(
                            NewAuditEntry::new("enterprise.autopilot.idempotency_hit", "ok")
                                .with_note(key.as_str()),
                        )
                        .await;
                    return Ok(response);
                }
                Err(error) => {
                    warn!(key = %key, error = %error, "ignoring unreadable cached autopilot response");
                }
            }
        }

        let response = self
            .execute(&request.payload, &settings, procedure_id, request.access)
            .await?;

        match serde_json::to_value(&response) {
            Ok(value) => {
                idempotency
                    .put(IdempotencyScope::Autopilot, key.as_str(), &value)
                    .await;
            }
            Err(error) => warn!(key = %key, error = %error, "failed to serialize autopilot response"),
        }

        Ok(response)
    }

    async fn execute(
        &self,
        payload: &Value,
        settings: &AutopilotSettings,
        procedure_id: String,
        access: String,
    ) -> AppResult<AutopilotResponse> {
        let result = self.run(payload, settings, procedure_id.as_str()).await?;

        let immutable_audit = if settings.immutable_audit {
            let entry = self
                .audit_chain
                .append(
                    Utc::now(),
                    CHAIN_ACTION,
                    json!({
                        "access": access,
                        "procedure_id": procedure_id,
                        "stages_success": result.stages_success,
                        "stages_failed": result.stages_failed,
                        "queued_retry_records": result.queued_retry_records,
                    }),
                )
                .await?;
            Some(entry)
        } else {
            None
        };

        self.queue_service
            .audit()
            .record(
                NewAuditEntry::new(CHAIN_ACTION, if result.ok { "ok" } else { "partial" })
                    .with_note(format!(
                        "success={} failed={}",
                        result.stages_success, result.stages_failed
                    ))
                    .with_payload(json!({"procedure_id": procedure_id})),
            )
            .await;

        Ok(AutopilotResponse {
            ok: true,
            access,
            result,
            immutable_audit,
            duplicate: false,
        })
    }
}
