use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use procura_application::{
    DispatchOutcome, EndpointCall, EndpointMethod, EndpointResponse, IntegrationDispatcher,
};
use procura_core::truncate_chars;
use procura_domain::{IntegrationRecord, Transport};
use serde_json::{Value, json};
use tracing::debug;

const DIAGNOSTIC_BODY_MAX_CHARS: usize = 200;
const RAW_TEXT_MAX_CHARS: usize = 4_000;
const RESPONSE_BODY_MAX_BYTES: usize = RAW_TEXT_MAX_CHARS * 4;

/// Outbound delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Application name stamped into envelopes.
    pub app_name: String,
    /// Static sink for `target_webhook` records.
    pub target_webhook_url: Option<String>,
    /// Timeout for target webhook deliveries.
    pub target_timeout: Duration,
    /// Timeout for per-record endpoints and direct stage calls.
    pub endpoint_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            app_name: "procura".to_owned(),
            target_webhook_url: None,
            target_timeout: Duration::from_secs(12),
            endpoint_timeout: Duration::from_secs(20),
        }
    }
}

/// reqwest implementation of the delivery port.
///
/// `target_webhook` records are posted as an `{app, event, at, payload}`
/// envelope. `endpoint` records carry the exact body of the call they
/// replay, so their payload is posted unchanged.
#[derive(Clone)]
pub struct HttpIntegrationDispatcher {
    http_client: reqwest::Client,
    config: DispatcherConfig,
}

impl HttpIntegrationDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(http_client: reqwest::Client, config: DispatcherConfig) -> Self {
        let target_webhook_url = config
            .target_webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_owned);

        Self {
            http_client,
            config: DispatcherConfig {
                target_webhook_url,
                ..config
            },
        }
    }

    async fn send(
        &self,
        method: EndpointMethod,
        url: &str,
        token: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
        timeout: Duration,
    ) -> EndpointResponse {
        let mut builder = match method {
            EndpointMethod::Get => self.http_client.get(url),
            EndpointMethod::Post => self.http_client.post(url),
        }
        .timeout(timeout)
        .header(reqwest::header::ACCEPT, "application/json");

        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let bearer = normalize_bearer_token(token);
        if !bearer.is_empty() {
            builder = builder.bearer_auth(bearer);
        }

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(method = method.as_str(), url = %url, error = %error, "outbound call failed");
                return EndpointResponse {
                    ok: false,
                    status: 0,
                    body: json!({ "error": transport_error(&error) }),
                };
            }
        };

        let status = response.status();
        let body = match read_body(response).await {
            Ok(text) => parse_body(text.as_str()),
            Err(error) => json!({ "error": format!("failed to read response body: {error}") }),
        };

        EndpointResponse {
            ok: status.is_success(),
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl IntegrationDispatcher for HttpIntegrationDispatcher {
    async fn dispatch_record(&self, record: &IntegrationRecord) -> DispatchOutcome {
        let response = match record.transport() {
            Transport::TargetWebhook => {
                let Some(url) = self.config.target_webhook_url.as_deref() else {
                    return DispatchOutcome::failed("target_webhook_not_configured");
                };

                let envelope = json!({
                    "app": self.config.app_name,
                    "event": record.kind(),
                    "at": Utc::now(),
                    "payload": record.payload(),
                });
                self.send(
                    EndpointMethod::Post,
                    url,
                    "",
                    &BTreeMap::new(),
                    Some(&envelope),
                    self.config.target_timeout,
                )
                .await
            }
            Transport::Endpoint {
                url,
                token,
                headers,
            } => {
                self.send(
                    EndpointMethod::Post,
                    url.as_str(),
                    token.as_str(),
                    headers,
                    Some(record.payload()),
                    self.config.endpoint_timeout,
                )
                .await
            }
        };

        let diagnostic = format!(
            "http={};{}",
            response.status,
            truncate_chars(response.body.to_string().as_str(), DIAGNOSTIC_BODY_MAX_CHARS)
        );

        if response.ok {
            DispatchOutcome::delivered(diagnostic)
        } else {
            DispatchOutcome::failed(diagnostic)
        }
    }

    async fn call_endpoint(&self, call: EndpointCall) -> EndpointResponse {
        self.send(
            call.method,
            call.url.as_str(),
            call.token.as_str(),
            &call.headers,
            call.body.as_ref(),
            self.config.endpoint_timeout,
        )
        .await
    }

    fn target_configured(&self) -> bool {
        self.config.target_webhook_url.is_some()
    }
}

fn normalize_bearer_token(token: &str) -> &str {
    let token = token.trim();
    match token.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => token[7..].trim(),
        _ => token,
    }
}

/// Reads at most `RESPONSE_BODY_MAX_BYTES` of the response body.
async fn read_body(mut response: reqwest::Response) -> Result<String, reqwest::Error> {
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = RESPONSE_BODY_MAX_BYTES.saturating_sub(bytes.len());
        bytes.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        if bytes.len() >= RESPONSE_BODY_MAX_BYTES {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parses a JSON body. Bodies longer than `RAW_TEXT_MAX_CHARS` are kept
/// as truncated raw text so stored stage data stays bounded.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return json!({});
    }

    if text.chars().count() > RAW_TEXT_MAX_CHARS {
        return json!({
            "raw_text": truncate_chars(text, RAW_TEXT_MAX_CHARS),
            "truncated": true,
        });
    }

    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw_text": text }))
}

fn transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timeout: {error}")
    } else if error.is_connect() {
        format!("connect_error: {error}")
    } else {
        format!("request_error: {error}")
    }
}
