use super::*;

use super::stages::{approval_route, status_profile};

const APPROVAL_ID_HEX_CHARS: usize = 8;
const SIGNATURE_ID_HEX_CHARS: usize = 10;

/// Deterministic stand-in result for a stage without a configured endpoint.
///
/// Pseudo-identifiers derive from the digest of the payload, the procedure
/// and the stage, so identical inputs always simulate identically.
pub(super) fn simulate_stage(
    stage: AutopilotStage,
    payload: &Value,
    settings: &AutopilotSettings,
    procedure_id: &str,
) -> StageResult {
    let seed = content_digest(&json!({
        "payload": payload,
        "procedure_id": procedure_id,
        "stage": stage.name(),
    }));

    let data = match stage {
        AutopilotStage::StatusSync => json!({
            "procedure_id": procedure_id,
            "profile": status_profile(payload),
            "status": "draft",
            "source": "simulation_mode",
        }),
        AutopilotStage::ApprovalSubmission => json!({
            "route": approval_route(settings),
            "request_id": pseudo_id("SIM-ECM", seed.as_str(), APPROVAL_ID_HEX_CHARS),
        }),
        AutopilotStage::ResourcePlanningSync => {
            let modules: Vec<&str> = settings
                .erp_modules
                .iter()
                .map(|module| module.as_str())
                .collect();
            let item_count = payload
                .get("items")
                .and_then(Value::as_array)
                .map_or(1, |items| items.len().max(1));
            json!({
                "synced_items": modules.len() * item_count,
                "modules": modules,
            })
        }
        AutopilotStage::CryptographicSigning => json!({
            "digest_sha256": content_digest(payload),
            "signature_id": pseudo_id("SIM-SIGN", seed.as_str(), SIGNATURE_ID_HEX_CHARS),
            "provider": settings.crypto_provider,
        }),
    };

    StageResult::simulated(stage, data)
}

fn pseudo_id(prefix: &str, seed: &str, hex_chars: usize) -> String {
    format!(
        "{prefix}-{}",
        truncate_chars(seed, hex_chars).to_ascii_uppercase()
    )
}
