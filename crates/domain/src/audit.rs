use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use procura_core::truncate_chars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const AUDIT_NOTE_MAX_CHARS: usize = 400;

/// `prev_hash` of the first chain entry.
pub const CHAIN_GENESIS_HASH: &str = "genesis";

/// Diagnostic audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Strictly increasing sequence assigned by storage.
    pub sequence_id: i64,
    /// Entry timestamp.
    pub at: DateTime<Utc>,
    /// Stable action name such as `queue.flush_item`.
    pub action: String,
    /// Outcome label such as `ok`, `sent`, `dead_letter`.
    pub status: String,
    /// Related record identifier.
    pub record_id: Option<String>,
    /// Free-text note.
    pub note: String,
    /// Structured context captured with the entry.
    pub payload_snapshot: Value,
}

/// Audit entry before storage assigns a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    /// Stable action name.
    pub action: String,
    /// Outcome label.
    pub status: String,
    /// Related record identifier.
    pub record_id: Option<String>,
    /// Free-text note, at most 400 characters.
    pub note: String,
    /// Structured context.
    pub payload_snapshot: Value,
}

impl NewAuditEntry {
    /// Creates an entry with empty note and payload.
    #[must_use]
    pub fn new(action: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: status.into(),
            record_id: None,
            note: String::new(),
            payload_snapshot: Value::Object(serde_json::Map::new()),
        }
    }

    /// Attaches a record identifier.
    #[must_use]
    pub fn with_record_id(mut self, record_id: impl ToString) -> Self {
        self.record_id = Some(record_id.to_string());
        self
    }

    /// Attaches a note truncated to the storage limit.
    #[must_use]
    pub fn with_note(mut self, note: impl AsRef<str>) -> Self {
        self.note = truncate_chars(note.as_ref(), AUDIT_NOTE_MAX_CHARS);
        self
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload_snapshot = payload;
        self
    }

    /// Converts into a stored entry.
    #[must_use]
    pub fn into_entry(self, sequence_id: i64, at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            sequence_id,
            at,
            action: self.action,
            status: self.status,
            record_id: self.record_id,
            note: self.note,
            payload_snapshot: self.payload_snapshot,
        }
    }
}

/// One entry of the hash-linked audit ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Strictly increasing sequence assigned by storage.
    pub sequence_id: i64,
    /// Entry timestamp, microsecond precision.
    pub at: DateTime<Utc>,
    /// Stable action name.
    pub action: String,
    /// Summarized payload.
    pub payload_snapshot: Value,
    /// Hash of the preceding entry or [`CHAIN_GENESIS_HASH`].
    pub prev_hash: String,
    /// SHA-256 over `at | action | canonical(payload) | prev_hash`.
    pub hash: String,
}

impl ChainEntry {
    /// Builds an entry linked to `prev_hash`.
    #[must_use]
    pub fn link(
        sequence_id: i64,
        at: DateTime<Utc>,
        action: impl Into<String>,
        payload_snapshot: Value,
        prev_hash: impl Into<String>,
    ) -> Self {
        let at = normalize_chain_timestamp(at);
        let action = action.into();
        let prev_hash = prev_hash.into();
        let hash = chain_hash(at, action.as_str(), &payload_snapshot, prev_hash.as_str());

        Self {
            sequence_id,
            at,
            action,
            payload_snapshot,
            prev_hash,
            hash,
        }
    }

    /// Recomputes the hash from the entry content and its stored `prev_hash`.
    #[must_use]
    pub fn recompute_hash(&self) -> String {
        chain_hash(
            self.at,
            self.action.as_str(),
            &self.payload_snapshot,
            self.prev_hash.as_str(),
        )
    }
}

/// Result of recomputing the ledger from genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    /// True when every entry reproduces its stored hash and link.
    pub valid: bool,
    /// Number of entries inspected.
    pub entries_checked: usize,
    /// First entry whose link or hash does not reproduce.
    pub first_invalid_sequence: Option<i64>,
    /// Number of entries that do not reproduce.
    pub invalid_entries: usize,
}

/// Truncates a timestamp to the precision stored by every backend.
#[must_use]
pub fn normalize_chain_timestamp(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Computes one chain hash as lowercase hex SHA-256.
#[must_use]
pub fn chain_hash(at: DateTime<Utc>, action: &str, payload: &Value, prev_hash: &str) -> String {
    let at = normalize_chain_timestamp(at).to_rfc3339_opts(SecondsFormat::Micros, true);
    let base = format!("{at}|{action}|{}|{prev_hash}", canonical_json(payload));

    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes lowercase hex SHA-256 over the canonical JSON form.
#[must_use]
pub fn content_digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

/// Serializes JSON with recursively sorted object keys and no whitespace.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut output = String::new();
    write_canonical(value, &mut output);
    output
}

fn write_canonical(value: &Value, output: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            output.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    output.push(',');
                }
                output.push_str(Value::String(key.clone()).to_string().as_str());
                output.push(':');
                if let Some(item) = map.get(key) {
                    write_canonical(item, output);
                }
            }
            output.push('}');
        }
        Value::Array(items) => {
            output.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    output.push(',');
                }
                write_canonical(item, output);
            }
            output.push(']');
        }
        scalar => output.push_str(scalar.to_string().as_str()),
    }
}

/// Recomputes every hash from genesis in ascending sequence order.
///
/// Each entry is checked against the recomputed hash of its predecessor, so
/// a modified entry invalidates itself and every entry after it.
#[must_use]
pub fn verify_chain(entries: &[ChainEntry]) -> ChainVerification {
    let mut expected_prev = CHAIN_GENESIS_HASH.to_owned();
    let mut first_invalid_sequence = None;
    let mut invalid_entries = 0;

    for entry in entries {
        let recomputed = chain_hash(
            entry.at,
            entry.action.as_str(),
            &entry.payload_snapshot,
            expected_prev.as_str(),
        );

        if entry.prev_hash != expected_prev || entry.hash != recomputed {
            invalid_entries += 1;
            first_invalid_sequence.get_or_insert(entry.sequence_id);
        }

        expected_prev = recomputed;
    }

    ChainVerification {
        valid: invalid_entries == 0,
        entries_checked: entries.len(),
        first_invalid_sequence,
        invalid_entries,
    }
}
