use chrono::{DateTime, Utc};
use procura_core::{AppResult, truncate_chars};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::integration::{RecordId, validate_endpoint_url};

const STAGE_DETAIL_MAX_CHARS: usize = 240;

/// Approval route used by simulated approval submissions.
pub const DEFAULT_APPROVAL_ROUTE: [&str; 4] = ["legal", "security", "finance", "head"];

/// Fixed autopilot pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutopilotStage {
    /// Read-only status check against the trading platform.
    StatusSync,
    /// Approval workflow submission.
    ApprovalSubmission,
    /// Resource-planning module sync.
    ResourcePlanningSync,
    /// External signature over the payload digest.
    CryptographicSigning,
}

impl AutopilotStage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 4] = [
        Self::StatusSync,
        Self::ApprovalSubmission,
        Self::ResourcePlanningSync,
        Self::CryptographicSigning,
    ];

    /// Returns stable stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusSync => "etp.status.sync",
            Self::ApprovalSubmission => "ecm.approval.submit",
            Self::ResourcePlanningSync => "erp.sync",
            Self::CryptographicSigning => "crypto.sign",
        }
    }

    /// Returns the record kind used when a failed attempt is queued for retry.
    #[must_use]
    pub fn retry_kind(&self) -> &'static str {
        match self {
            Self::StatusSync => "enterprise.etp.status.sync",
            Self::ApprovalSubmission => "enterprise.ecm.approval.submit",
            Self::ResourcePlanningSync => "enterprise.erp.sync",
            Self::CryptographicSigning => "enterprise.crypto.sign",
        }
    }
}

/// Resource-planning module that can be synced independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErpModule {
    /// Reference data.
    Nsi,
    /// Budget lines.
    Budget,
    /// Contracts.
    Contracts,
    /// Spending limits.
    Limits,
}

impl ErpModule {
    /// Returns stable module value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nsi => "nsi",
            Self::Budget => "budget",
            Self::Contracts => "contracts",
            Self::Limits => "limits",
        }
    }
}

/// Per-invocation autopilot settings.
///
/// Keys are accepted in camelCase or snake_case. A stage counts as configured
/// only when its endpoint is a non-empty URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutopilotSettings {
    /// Explicit simulation flag; `None` falls back to the deployment default.
    pub simulation_mode: Option<bool>,
    /// Whether the status sync stage runs at all.
    pub etp_bidirectional_status: bool,
    /// Trading platform base URL.
    pub etp_endpoint: Option<String>,
    /// Trading platform token.
    pub etp_token: String,
    /// Approval workflow base URL.
    pub ecm_endpoint: Option<String>,
    /// Approval workflow token.
    pub ecm_token: String,
    /// Raw approval route as supplied, `A -> B -> C`.
    pub ecm_approval_route: String,
    /// Resource-planning base URL.
    pub erp_endpoint: Option<String>,
    /// Resource-planning token.
    pub erp_token: String,
    /// Modules selected for sync, in fixed order.
    pub erp_modules: Vec<ErpModule>,
    /// Signing service base URL.
    pub crypto_endpoint: Option<String>,
    /// Signing service token.
    pub crypto_token: String,
    /// Signing provider label.
    pub crypto_provider: String,
    /// Whether a chain entry is appended for the run.
    pub immutable_audit: bool,
}

impl Default for AutopilotSettings {
    fn default() -> Self {
        Self {
            simulation_mode: None,
            etp_bidirectional_status: true,
            etp_endpoint: None,
            etp_token: String::new(),
            ecm_endpoint: None,
            ecm_token: String::new(),
            ecm_approval_route: String::new(),
            erp_endpoint: None,
            erp_token: String::new(),
            erp_modules: vec![
                ErpModule::Nsi,
                ErpModule::Budget,
                ErpModule::Contracts,
                ErpModule::Limits,
            ],
            crypto_endpoint: None,
            crypto_token: String::new(),
            crypto_provider: "cryptopro".to_owned(),
            immutable_audit: true,
        }
    }
}

impl AutopilotSettings {
    /// Parses settings from caller JSON. Non-object values yield defaults.
    pub fn from_value(value: &Value) -> AppResult<Self> {
        let empty = Map::new();
        let map = value.as_object().unwrap_or(&empty);
        let defaults = Self::default();

        let module_flags = [
            (ErpModule::Nsi, ["erpSyncNsi", "erp_sync_nsi"]),
            (ErpModule::Budget, ["erpSyncBudget", "erp_sync_budget"]),
            (ErpModule::Contracts, ["erpSyncContracts", "erp_sync_contracts"]),
            (ErpModule::Limits, ["erpSyncLimits", "erp_sync_limits"]),
        ];
        let erp_modules = module_flags
            .into_iter()
            .filter(|(_, keys)| setting_bool(map, keys).unwrap_or(true))
            .map(|(module, _)| module)
            .collect();

        let crypto_provider = setting_string(map, &["cryptoProvider", "crypto_provider"]);

        Ok(Self {
            simulation_mode: setting_bool(map, &["simulationMode", "simulation_mode"]),
            etp_bidirectional_status: setting_bool(
                map,
                &["etpBidirectionalStatus", "etp_bidirectional_status"],
            )
            .unwrap_or(defaults.etp_bidirectional_status),
            etp_endpoint: setting_endpoint(map, &["etpEndpoint", "etp_endpoint"])?,
            etp_token: setting_string(map, &["etpToken", "etp_token"]),
            ecm_endpoint: setting_endpoint(map, &["ecmEndpoint", "ecm_endpoint"])?,
            ecm_token: setting_string(map, &["ecmToken", "ecm_token"]),
            ecm_approval_route: setting_string(map, &["ecmApprovalRoute", "ecm_approval_route"]),
            erp_endpoint: setting_endpoint(map, &["erpEndpoint", "erp_endpoint"])?,
            erp_token: setting_string(map, &["erpToken", "erp_token"]),
            erp_modules,
            crypto_endpoint: setting_endpoint(map, &["cryptoEndpoint", "crypto_endpoint"])?,
            crypto_token: setting_string(map, &["cryptoToken", "crypto_token"]),
            crypto_provider: if crypto_provider.is_empty() {
                defaults.crypto_provider
            } else {
                crypto_provider
            },
            immutable_audit: setting_bool(map, &["immutableAudit", "immutable_audit"])
                .unwrap_or(defaults.immutable_audit),
        })
    }

    /// Returns approver roles parsed from the configured route.
    #[must_use]
    pub fn approval_route_steps(&self) -> Vec<String> {
        self.ecm_approval_route
            .split("->")
            .map(str::trim)
            .filter(|step| !step.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

fn setting_value<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| map.get(*key))
        .filter(|value| !value.is_null())
}

fn setting_string(map: &Map<String, Value>, keys: &[&str]) -> String {
    match setting_value(map, keys) {
        Some(Value::String(value)) => value.trim().to_owned(),
        Some(Value::Number(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn setting_bool(map: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    match setting_value(map, keys)? {
        Value::Bool(value) => Some(*value),
        Value::Number(value) => Some(value.as_f64().is_some_and(|number| number != 0.0)),
        Value::String(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn setting_endpoint(map: &Map<String, Value>, keys: &[&str]) -> AppResult<Option<String>> {
    let value = setting_string(map, keys);
    if value.is_empty() {
        return Ok(None);
    }

    validate_endpoint_url(value.as_str())?;
    Ok(Some(value))
}

/// Outcome of one autopilot stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stable stage name.
    pub name: String,
    /// Whether the stage succeeded.
    pub ok: bool,
    /// Short diagnostic, at most 240 characters.
    pub detail: String,
    /// Structured stage output.
    pub data: Value,
}

impl StageResult {
    /// Result of a real endpoint call.
    #[must_use]
    pub fn called(stage: AutopilotStage, ok: bool, status: u16, data: Value) -> Self {
        Self::new(stage, ok, format!("http={status}"), data)
    }

    /// Deterministic stand-in used in simulation mode.
    #[must_use]
    pub fn simulated(stage: AutopilotStage, data: Value) -> Self {
        Self::new(stage, true, "simulated".to_owned(), data)
    }

    /// Stage that did not run.
    #[must_use]
    pub fn skipped(stage: AutopilotStage, reason: &str) -> Self {
        Self::new(
            stage,
            false,
            format!("skipped_{reason}"),
            Value::Object(Map::new()),
        )
    }

    fn new(stage: AutopilotStage, ok: bool, detail: String, data: Value) -> Self {
        Self {
            name: stage.name().to_owned(),
            ok,
            detail: truncate_chars(detail.as_str(), STAGE_DETAIL_MAX_CHARS),
            data,
        }
    }

    /// Returns true when the stage did not run.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.detail.starts_with("skipped_")
    }
}

/// Stage outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    /// Stages that succeeded.
    pub success: usize,
    /// Stages that failed without being skipped.
    pub failed: usize,
    /// Stages that did not run.
    pub skipped: usize,
}

impl StageSummary {
    /// Counts outcomes over stage results.
    #[must_use]
    pub fn from_stages(stages: &[StageResult]) -> Self {
        stages.iter().fold(Self::default(), |mut summary, stage| {
            if stage.ok {
                summary.success += 1;
            } else if stage.is_skipped() {
                summary.skipped += 1;
            } else {
                summary.failed += 1;
            }
            summary
        })
    }
}

/// Aggregated result of one autopilot invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutopilotResult {
    /// True iff no stage failed; skips do not count.
    pub ok: bool,
    /// Number of stages executed.
    pub stages_total: usize,
    /// Successful stages.
    pub stages_success: usize,
    /// Failed stages excluding skips.
    pub stages_failed: usize,
    /// Skipped stages.
    pub stages_skipped: usize,
    /// Records queued for failed stages.
    pub queued_retry_records: Vec<RecordId>,
    /// Stage results in pipeline order.
    pub stages: Vec<StageResult>,
}

impl AutopilotResult {
    /// Aggregates stage results.
    #[must_use]
    pub fn from_stages(stages: Vec<StageResult>, queued_retry_records: Vec<RecordId>) -> Self {
        let summary = StageSummary::from_stages(&stages);

        Self {
            ok: summary.failed == 0,
            stages_total: stages.len(),
            stages_success: summary.success,
            stages_failed: summary.failed,
            stages_skipped: summary.skipped,
            queued_retry_records,
            stages,
        }
    }

    /// Returns stage counters.
    #[must_use]
    pub fn summary(&self) -> StageSummary {
        StageSummary {
            success: self.stages_success,
            failed: self.stages_failed,
            skipped: self.stages_skipped,
        }
    }
}

/// Snapshot appended to the bounded autopilot history on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterpriseStatusSnapshot {
    /// Run timestamp.
    pub at: DateTime<Utc>,
    /// Procurement procedure identifier, possibly empty.
    pub procedure_id: String,
    /// Stage counters.
    pub summary: StageSummary,
    /// Stage results.
    pub stages: Vec<StageResult>,
}
