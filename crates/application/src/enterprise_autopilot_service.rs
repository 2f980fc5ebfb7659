use std::collections::BTreeMap;

use chrono::Utc;
use procura_core::{AppResult, truncate_chars};
use procura_domain::{
    AutopilotResult, AutopilotSettings, AutopilotStage, ChainEntry, DEFAULT_APPROVAL_ROUTE,
    EnterpriseStatusSnapshot, NewAuditEntry, NewIntegrationRecord, RecordId, StageResult,
    Transport, content_digest,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::audit_chain_service::AuditChainService;
use crate::idempotency_service::{IdempotencyScope, IdempotencyService};
use crate::integration_ports::{EndpointCall, EndpointMethod};
use crate::integration_queue_service::IntegrationQueueService;

mod request;
mod simulation;
mod stages;

const RETRY_SOURCE: &str = "enterprise_autopilot";
const CHAIN_ACTION: &str = "enterprise.autopilot";

/// Caller request for one autopilot run.
#[derive(Debug, Clone, PartialEq)]
pub struct AutopilotRequest {
    /// Procurement payload forwarded to every stage.
    pub payload: Value,
    /// Raw settings object, camelCase or snake_case keys.
    pub settings: Value,
    /// Procurement procedure identifier, may be empty.
    pub procedure_id: String,
    /// Optional idempotency key.
    pub idempotency_key: Option<String>,
    /// Label of the caller's access path, recorded in the ledger.
    pub access: String,
}

/// Replayable response of one autopilot run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutopilotResponse {
    /// Always true once the run completed; see `result.ok` for stage outcome.
    pub ok: bool,
    /// Label of the caller's access path.
    pub access: String,
    /// Aggregated stage outcome.
    pub result: AutopilotResult,
    /// Ledger entry appended for the run.
    pub immutable_audit: Option<ChainEntry>,
    /// True when replayed from the idempotency cache.
    #[serde(default)]
    pub duplicate: bool,
}

/// Orchestrates the fixed enterprise integration pipeline.
///
/// Stages run in order and independently of each other's outcome. A failed
/// real call queues a retry record addressed to the same endpoint.
#[derive(Clone)]
pub struct EnterpriseAutopilotService {
    queue_service: IntegrationQueueService,
    audit_chain: AuditChainService,
}

impl EnterpriseAutopilotService {
    /// Creates an enterprise autopilot service.
    #[must_use]
    pub fn new(queue_service: IntegrationQueueService, audit_chain: AuditChainService) -> Self {
        Self {
            queue_service,
            audit_chain,
        }
    }

    /// Runs all four stages and records the run in the status history.
    pub async fn run(
        &self,
        payload: &Value,
        settings: &AutopilotSettings,
        procedure_id: &str,
    ) -> AppResult<AutopilotResult> {
        let simulation_mode = settings
            .simulation_mode
            .unwrap_or(self.queue_service.config().simulation_mode_default);

        let mut stages = Vec::with_capacity(AutopilotStage::ALL.len());
        let mut queued_retry_records = Vec::new();

        for stage in AutopilotStage::ALL {
            let result = match self.plan_stage(stage, payload, settings, procedure_id) {
                StagePlan::Call(call) => {
                    let (result, retry) = self.call_stage(stage, call).await;
                    if let Some(retry) = retry {
                        queued_retry_records.push(self.queue_retry(stage, retry).await?);
                    }
                    result
                }
                StagePlan::Unconfigured if simulation_mode => {
                    simulation::simulate_stage(stage, payload, settings, procedure_id)
                }
                StagePlan::Unconfigured => StageResult::skipped(stage, "not_configured"),
                StagePlan::Disabled => StageResult::skipped(stage, "disabled"),
            };
            stages.push(result);
        }

        let result = AutopilotResult::from_stages(stages, queued_retry_records);

        self.queue_service
            .record_enterprise_status(EnterpriseStatusSnapshot {
                at: Utc::now(),
                procedure_id: procedure_id.to_owned(),
                summary: result.summary(),
                stages: result.stages.clone(),
            })
            .await?;

        info!(
            procedure_id = %procedure_id,
            ok = result.ok,
            stages_success = result.stages_success,
            stages_failed = result.stages_failed,
            stages_skipped = result.stages_skipped,
            simulation_mode,
            "enterprise autopilot finished"
        );

        Ok(result)
    }

    async fn queue_retry(&self, stage: AutopilotStage, retry: RetryTarget) -> AppResult<RecordId> {
        let record = self
            .queue_service
            .enqueue(NewIntegrationRecord {
                kind: stage.retry_kind().to_owned(),
                source: RETRY_SOURCE.to_owned(),
                payload: retry.payload,
                transport: Transport::endpoint(retry.url, retry.token, retry.headers)?,
            })
            .await?;

        warn!(
            stage = stage.name(),
            record_id = %record.id(),
            "enterprise stage failed, queued retry record"
        );
        Ok(record.id())
    }
}

/// What one stage will do for the given settings.
#[derive(Debug, Clone, PartialEq)]
enum StagePlan {
    Call(PlannedCall),
    Unconfigured,
    Disabled,
}

/// Real call plus the record payload to queue if it fails.
#[derive(Debug, Clone, PartialEq)]
struct PlannedCall {
    call: EndpointCall,
    retry_payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
struct RetryTarget {
    url: String,
    token: String,
    headers: BTreeMap<String, String>,
    payload: Value,
}
