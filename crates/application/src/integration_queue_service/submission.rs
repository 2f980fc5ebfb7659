use std::collections::BTreeMap;

use super::*;

const DRAFT_KIND: &str = "procurement.draft";
const DRAFT_SOURCE: &str = "platform_connector";
const DRAFT_CONTROL_KEYS: [&str; 4] = [
    "connector_endpoint",
    "connector_token",
    "connector_headers",
    "idempotency_key",
];

impl IntegrationQueueService {
    /// Accepts one event for delivery to the target webhook.
    pub async fn submit_event(&self, input: SubmitEventInput) -> AppResult<SubmissionReceipt> {
        let idempotency_key = IdempotencyService::normalize_key(input.idempotency_key.as_deref())?;

        self.submit(
            IdempotencyScope::Event,
            idempotency_key,
            NewIntegrationRecord {
                kind: input.kind,
                source: input.source,
                payload: input.payload,
                transport: Transport::TargetWebhook,
            },
        )
        .await
    }

    /// Accepts one procurement draft from the platform connector.
    ///
    /// `connector_endpoint`, `connector_token` and `connector_headers` select
    /// a per-record endpoint; without an endpoint the draft goes to the
    /// target webhook. These control keys are not forwarded in the payload.
    pub async fn submit_draft(&self, payload: Value) -> AppResult<SubmissionReceipt> {
        let Value::Object(mut fields) = payload else {
            return Err(AppError::Validation(
                "draft payload must be a JSON object".to_owned(),
            ));
        };

        let idempotency_key = IdempotencyService::normalize_key(
            fields.get("idempotency_key").and_then(Value::as_str),
        )?;

        let endpoint = fields
            .get("connector_endpoint")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .map(str::to_owned);

        let transport = match endpoint {
            Some(url) => {
                let token = fields
                    .get("connector_token")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let headers = connector_headers(fields.get("connector_headers"))?;
                Transport::endpoint(url, token, headers)?
            }
            None => Transport::TargetWebhook,
        };

        for key in DRAFT_CONTROL_KEYS {
            fields.remove(key);
        }

        self.submit(
            IdempotencyScope::Draft,
            idempotency_key,
            NewIntegrationRecord {
                kind: DRAFT_KIND.to_owned(),
                source: DRAFT_SOURCE.to_owned(),
                payload: Value::Object(fields),
                transport,
            },
        )
        .await
    }

    async fn submit(
        &self,
        scope: IdempotencyScope,
        idempotency_key: Option<String>,
        input: NewIntegrationRecord,
    ) -> AppResult<SubmissionReceipt> {
        let Some(key) = idempotency_key else {
            return self.accept(scope, input).await;
        };

        let _guard = self.idempotency.lock_key(scope, key.as_str()).await;

        if let Some(cached) = self.idempotency.get(scope, key.as_str()).await {
            match serde_json::from_value::<SubmissionReceipt>(cached) {
                Ok(mut receipt) => {
                    receipt.duplicate = true;
                    self.audit
                        .record(
                            NewAuditEntry::new(format!("{}.idempotency_hit", scope.prefix()), "ok")
                                .with_record_id(receipt.record_id)
                                .with_note(key.as_str()),
                        )
                        .await;
                    return Ok(receipt);
                }
                Err(error) => {
                    warn!(key = %key, error = %error, "ignoring unreadable cached submission");
                }
            }
        }

        let receipt = self.accept(scope, input).await?;
        match serde_json::to_value(&receipt) {
            Ok(response) => self.idempotency.put(scope, key.as_str(), &response).await,
            Err(error) => warn!(key = %key, error = %error, "failed to serialize submission receipt"),
        }

        Ok(receipt)
    }

    async fn accept(
        &self,
        scope: IdempotencyScope,
        input: NewIntegrationRecord,
    ) -> AppResult<SubmissionReceipt> {
        let record = self.enqueue(input).await?;

        self.audit
            .record(
                NewAuditEntry::new(format!("{}.accepted", scope.prefix()), "ok")
                    .with_record_id(record.id())
                    .with_note(record.kind()),
            )
            .await;

        Ok(SubmissionReceipt {
            ok: true,
            record_id: record.id(),
            status: record.status(),
            duplicate: false,
        })
    }
}

fn connector_headers(value: Option<&Value>) -> AppResult<BTreeMap<String, String>> {
    match value {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(headers)) => Ok(headers
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect()),
        Some(_) => Err(AppError::Validation(
            "connector_headers must be a JSON object".to_owned(),
        )),
    }
}
