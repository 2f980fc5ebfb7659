use super::*;

const STATUS_PROFILE_HEADER: &str = "X-Integration-Profile";
const DEFAULT_STATUS_PROFILE: &str = "eis";

impl EnterpriseAutopilotService {
    pub(super) fn plan_stage(
        &self,
        stage: AutopilotStage,
        payload: &Value,
        settings: &AutopilotSettings,
        procedure_id: &str,
    ) -> StagePlan {
        match stage {
            AutopilotStage::StatusSync => {
                if !settings.etp_bidirectional_status {
                    return StagePlan::Disabled;
                }
                let Some(endpoint) = settings.etp_endpoint.as_deref() else {
                    return StagePlan::Unconfigured;
                };

                let mut url = join_url(endpoint, "status");
                if !procedure_id.is_empty() {
                    url = format!("{url}/{procedure_id}");
                }
                let headers = BTreeMap::from([(
                    STATUS_PROFILE_HEADER.to_owned(),
                    status_profile(payload),
                )]);

                StagePlan::Call(PlannedCall {
                    call: EndpointCall {
                        method: EndpointMethod::Get,
                        url,
                        token: settings.etp_token.clone(),
                        headers,
                        body: None,
                    },
                    retry_payload: json!({"procedure_id": procedure_id, "payload": payload}),
                })
            }
            AutopilotStage::ApprovalSubmission => {
                let Some(endpoint) = settings.ecm_endpoint.as_deref() else {
                    return StagePlan::Unconfigured;
                };

                let body = json!({
                    "route": approval_route(settings),
                    "payload": payload,
                    "procedure_id": procedure_id,
                });
                post_plan(join_url(endpoint, "approvals"), &settings.ecm_token, body)
            }
            AutopilotStage::ResourcePlanningSync => {
                let Some(endpoint) = settings.erp_endpoint.as_deref() else {
                    return StagePlan::Unconfigured;
                };

                let modules: Vec<&str> = settings
                    .erp_modules
                    .iter()
                    .map(|module| module.as_str())
                    .collect();
                let body = json!({
                    "modules": modules,
                    "payload": payload,
                    "procedure_id": procedure_id,
                });
                post_plan(join_url(endpoint, "sync"), &settings.erp_token, body)
            }
            AutopilotStage::CryptographicSigning => {
                let Some(endpoint) = settings.crypto_endpoint.as_deref() else {
                    return StagePlan::Unconfigured;
                };

                let body = json!({
                    "digest_sha256": content_digest(payload),
                    "procedure_id": procedure_id,
                });
                post_plan(join_url(endpoint, "sign"), &settings.crypto_token, body)
            }
        }
    }

    pub(super) async fn call_stage(
        &self,
        stage: AutopilotStage,
        planned: PlannedCall,
    ) -> (StageResult, Option<RetryTarget>) {
        let PlannedCall {
            call,
            retry_payload,
        } = planned;
        let retry = RetryTarget {
            url: call.url.clone(),
            token: call.token.clone(),
            headers: call.headers.clone(),
            payload: retry_payload,
        };

        let response = self.queue_service.dispatcher().call_endpoint(call).await;
        let result = StageResult::called(stage, response.ok, response.status, response.body);

        if response.ok {
            (result, None)
        } else {
            (result, Some(retry))
        }
    }
}

/// Approver roles from settings, or the default route.
pub(super) fn approval_route(settings: &AutopilotSettings) -> Vec<String> {
    let steps = settings.approval_route_steps();
    if steps.is_empty() {
        DEFAULT_APPROVAL_ROUTE
            .iter()
            .map(|step| (*step).to_owned())
            .collect()
    } else {
        steps
    }
}

pub(super) fn status_profile(payload: &Value) -> String {
    match payload.get("profile") {
        Some(Value::String(profile)) if !profile.trim().is_empty() => profile.trim().to_owned(),
        _ => DEFAULT_STATUS_PROFILE.to_owned(),
    }
}

fn post_plan(url: String, token: &str, body: Value) -> StagePlan {
    StagePlan::Call(PlannedCall {
        call: EndpointCall {
            method: EndpointMethod::Post,
            url,
            token: token.to_owned(),
            headers: BTreeMap::new(),
            body: Some(body.clone()),
        },
        retry_payload: body,
    })
}

fn join_url(endpoint: &str, path: &str) -> String {
    format!("{}/{path}", endpoint.trim_end_matches('/'))
}
