use std::collections::BTreeMap;

use async_trait::async_trait;
use procura_domain::IntegrationRecord;
use serde_json::Value;

/// Normalized outcome of one record delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Whether the sink answered with a 2xx status.
    pub delivered: bool,
    /// Bounded diagnostic, status and body excerpt or network error.
    pub diagnostic: String,
}

impl DispatchOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn delivered(diagnostic: impl Into<String>) -> Self {
        Self {
            delivered: true,
            diagnostic: diagnostic.into(),
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            delivered: false,
            diagnostic: diagnostic.into(),
        }
    }
}

/// HTTP method used for direct stage calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointMethod {
    /// Read-only request.
    Get,
    /// JSON body request.
    Post,
}

impl EndpointMethod {
    /// Returns stable method value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One direct call to an external system.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointCall {
    /// Request method.
    pub method: EndpointMethod,
    /// Absolute URL.
    pub url: String,
    /// Optional bearer token, empty when absent.
    pub token: String,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// JSON body for `Post` calls.
    pub body: Option<Value>,
}

/// Normalized response of one direct call.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResponse {
    /// Whether the status was 2xx.
    pub ok: bool,
    /// HTTP status, zero for network failures.
    pub status: u16,
    /// Parsed JSON body or `{"raw_text": ..}` / `{"error": ..}`.
    pub body: Value,
}

/// Port for outbound delivery.
///
/// Implementations never fail: every error path normalizes into a failed
/// outcome carrying a diagnostic.
#[async_trait]
pub trait IntegrationDispatcher: Send + Sync {
    /// Delivers one record according to its transport.
    async fn dispatch_record(&self, record: &IntegrationRecord) -> DispatchOutcome;

    /// Performs one direct call and returns the normalized response.
    async fn call_endpoint(&self, call: EndpointCall) -> EndpointResponse;

    /// Returns whether the static target webhook is configured.
    fn target_configured(&self) -> bool;
}
