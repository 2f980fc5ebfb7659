use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procura_core::AppResult;
use procura_domain::{AuditEntry, ChainEntry, NewAuditEntry};
use serde_json::Value;

/// Port for the append-only diagnostic audit log.
#[async_trait]
pub trait IntegrationAuditRepository: Send + Sync {
    /// Appends one entry and returns it with its assigned sequence.
    async fn append_entry(&self, entry: NewAuditEntry) -> AppResult<AuditEntry>;

    /// Lists the latest entries in descending sequence order.
    async fn list_recent_entries(&self, limit: usize) -> AppResult<Vec<AuditEntry>>;
}

/// Port for the hash-linked audit ledger.
#[async_trait]
pub trait AuditChainRepository: Send + Sync {
    /// Appends one entry linked to the current chain head.
    ///
    /// Reading the head and writing the new entry happen atomically.
    async fn append_link(
        &self,
        at: DateTime<Utc>,
        action: &str,
        payload_snapshot: Value,
    ) -> AppResult<ChainEntry>;

    /// Lists the full chain in ascending sequence order.
    async fn list_chain(&self) -> AppResult<Vec<ChainEntry>>;
}
