use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use procura_core::{AppError, AppResult, truncate_chars};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const KIND_MIN_LENGTH: usize = 3;
const KIND_MAX_LENGTH: usize = 120;
const SOURCE_MAX_LENGTH: usize = 120;
const LAST_RESULT_MAX_CHARS: usize = 400;

/// Stable identifier of one integration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a random record identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a record identifier from its string form.
    pub fn parse(value: &str) -> AppResult<Self> {
        Uuid::parse_str(value.trim()).map(Self).map_err(|error| {
            AppError::Validation(format!("invalid record id '{value}': {error}"))
        })
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RecordId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Delivery lifecycle status of an integration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Waiting in the queue for a delivery attempt.
    Queued,
    /// Delivered successfully.
    Sent,
    /// Exhausted the retry budget.
    DeadLetter,
}

impl RecordStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::DeadLetter => "dead_letter",
        }
    }
}

/// Delivery descriptor of one integration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Transport {
    /// Deliver to the statically configured target webhook.
    TargetWebhook,
    /// Deliver to a per-record endpoint.
    Endpoint {
        /// Absolute http(s) URL.
        url: String,
        /// Optional bearer token.
        #[serde(default)]
        token: String,
        /// Extra request headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl Transport {
    /// Creates a validated endpoint transport.
    pub fn endpoint(
        url: impl Into<String>,
        token: impl Into<String>,
        headers: BTreeMap<String, String>,
    ) -> AppResult<Self> {
        let url = url.into().trim().to_owned();
        validate_endpoint_url(url.as_str())?;

        Ok(Self::Endpoint {
            url,
            token: token.into().trim().to_owned(),
            headers,
        })
    }

    /// Parses a transport descriptor from caller-provided JSON.
    pub fn from_value(value: Value) -> AppResult<Self> {
        let transport = serde_json::from_value::<Self>(value).map_err(|error| {
            AppError::Validation(format!("invalid transport descriptor: {error}"))
        })?;

        if let Self::Endpoint { url, .. } = &transport {
            validate_endpoint_url(url.as_str())?;
        }

        Ok(transport)
    }

    /// Returns stable mode value.
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            Self::TargetWebhook => "target_webhook",
            Self::Endpoint { .. } => "endpoint",
        }
    }
}

pub(crate) fn validate_endpoint_url(value: &str) -> AppResult<()> {
    let parsed = url::Url::parse(value).map_err(|error| {
        AppError::Validation(format!("invalid endpoint url '{value}': {error}"))
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppError::Validation(format!(
            "endpoint url '{value}' must use http or https, got '{scheme}'"
        ))),
    }
}

/// Input for creating a new queued integration record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIntegrationRecord {
    /// Semantic event type.
    pub kind: String,
    /// Origin tag.
    pub source: String,
    /// Opaque structured payload.
    pub payload: Value,
    /// Delivery descriptor.
    pub transport: Transport,
}

/// One queued integration event awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationRecord {
    id: RecordId,
    kind: String,
    source: String,
    payload: Value,
    transport: Transport,
    status: RecordStatus,
    attempts: u32,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dead_letter_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_result: Option<String>,
}

impl IntegrationRecord {
    /// Creates a validated record in queued state.
    pub fn new(input: NewIntegrationRecord, created_at: DateTime<Utc>) -> AppResult<Self> {
        let kind = input.kind.trim().to_owned();
        let kind_length = kind.chars().count();
        if !(KIND_MIN_LENGTH..=KIND_MAX_LENGTH).contains(&kind_length) {
            return Err(AppError::Validation(format!(
                "record kind must be between {KIND_MIN_LENGTH} and {KIND_MAX_LENGTH} characters"
            )));
        }

        let source = input.source.trim().to_owned();
        if source.is_empty() || source.chars().count() > SOURCE_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "record source must be between 1 and {SOURCE_MAX_LENGTH} characters"
            )));
        }

        Ok(Self {
            id: RecordId::new(),
            kind,
            source,
            payload: input.payload,
            transport: input.transport,
            status: RecordStatus::Queued,
            attempts: 0,
            created_at,
            last_attempt_at: None,
            sent_at: None,
            dead_letter_at: None,
            last_result: None,
        })
    }

    /// Returns the record identifier.
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Returns the semantic event type.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.kind.as_str()
    }

    /// Returns the origin tag.
    #[must_use]
    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    /// Returns the opaque payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the delivery descriptor.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> RecordStatus {
        self.status
    }

    /// Returns the number of dispatch tries so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the most recent attempt timestamp.
    #[must_use]
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    /// Returns the delivery timestamp.
    #[must_use]
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    /// Returns the dead-letter timestamp.
    #[must_use]
    pub fn dead_letter_at(&self) -> Option<DateTime<Utc>> {
        self.dead_letter_at
    }

    /// Returns the diagnostic of the most recent attempt.
    #[must_use]
    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }

    /// Starts one dispatch attempt.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = Some(now);
    }

    /// Applies one dispatch outcome and returns the resulting status.
    ///
    /// A failure moves the record to dead-letter once `attempts` reached
    /// `max_attempts`; otherwise it stays queued for the next flush.
    pub fn complete_attempt(
        &mut self,
        delivered: bool,
        diagnostic: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> RecordStatus {
        self.last_result = Some(truncate_chars(diagnostic, LAST_RESULT_MAX_CHARS));

        if delivered {
            self.status = RecordStatus::Sent;
            self.sent_at = Some(now);
        } else if self.attempts >= max_attempts.max(1) {
            self.status = RecordStatus::DeadLetter;
            self.dead_letter_at = Some(now);
        } else {
            self.status = RecordStatus::Queued;
        }

        self.status
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use serde_json::json;

    use super::{IntegrationRecord, NewIntegrationRecord, RecordStatus, Transport};

    fn new_record() -> IntegrationRecord {
        match IntegrationRecord::new(
            NewIntegrationRecord {
                kind: "procurement.draft".to_owned(),
                source: "ui".to_owned(),
                payload: json!({"title": "Paper A4"}),
                transport: Transport::TargetWebhook,
            },
            Utc::now(),
        ) {
            Ok(record) => record,
            Err(error) => panic!("record should be valid: {error}"),
        }
    }

    #[test]
    fn record_rejects_short_kind() {
        let result = IntegrationRecord::new(
            NewIntegrationRecord {
                kind: "ab".to_owned(),
                source: "ui".to_owned(),
                payload: json!({}),
                transport: Transport::TargetWebhook,
            },
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn failed_attempts_dead_letter_at_max() {
        let mut record = new_record();

        record.begin_attempt(Utc::now());
        let status = record.complete_attempt(false, "http=503", 2, Utc::now());
        assert_eq!(status, RecordStatus::Queued);
        assert!(record.dead_letter_at().is_none());

        record.begin_attempt(Utc::now());
        let status = record.complete_attempt(false, "http=503", 2, Utc::now());
        assert_eq!(status, RecordStatus::DeadLetter);
        assert_eq!(record.attempts(), 2);
        assert!(record.dead_letter_at().is_some());
    }

    #[test]
    fn successful_attempt_marks_sent() {
        let mut record = new_record();
        record.begin_attempt(Utc::now());
        let status = record.complete_attempt(true, "http=200", 5, Utc::now());

        assert_eq!(status, RecordStatus::Sent);
        assert!(record.sent_at().is_some());
        assert_eq!(record.last_result(), Some("http=200"));
    }

    #[test]
    fn transport_serializes_with_mode_tag() {
        let transport = Transport::endpoint("https://erp.example.test/sync", "t", BTreeMap::new());
        let Ok(transport) = transport else {
            panic!("endpoint transport should be valid");
        };

        let value = serde_json::to_value(&transport).unwrap_or_default();
        assert_eq!(value["mode"], "endpoint");
        assert_eq!(value["url"], "https://erp.example.test/sync");
    }

    #[test]
    fn transport_rejects_unknown_mode_and_bad_urls() {
        assert!(Transport::from_value(json!({"mode": "carrier_pigeon"})).is_err());
        assert!(Transport::from_value(json!({"mode": "endpoint", "url": "ftp://x"})).is_err());
        assert!(
            Transport::from_value(json!({"mode": "target_webhook"}))
                .is_ok_and(|transport| transport == Transport::TargetWebhook)
        );
    }
}
