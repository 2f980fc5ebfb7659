use std::sync::Arc;

use chrono::{DateTime, Utc};
use procura_core::AppResult;
use procura_domain::{ChainEntry, ChainVerification, verify_chain};
use serde_json::Value;
use tracing::{info, warn};

use crate::integration_ports::AuditChainRepository;

/// Service over the hash-linked audit ledger.
#[derive(Clone)]
pub struct AuditChainService {
    repository: Arc<dyn AuditChainRepository>,
}

impl AuditChainService {
    /// Creates an audit chain service.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditChainRepository>) -> Self {
        Self { repository }
    }

    /// Appends one entry linked to the current head.
    pub async fn append(
        &self,
        at: DateTime<Utc>,
        action: &str,
        payload_snapshot: Value,
    ) -> AppResult<ChainEntry> {
        let entry = self
            .repository
            .append_link(at, action, payload_snapshot)
            .await?;

        info!(
            sequence_id = entry.sequence_id,
            action = %entry.action,
            "appended immutable audit entry"
        );
        Ok(entry)
    }

    /// Lists the chain in ascending sequence order.
    pub async fn list(&self) -> AppResult<Vec<ChainEntry>> {
        self.repository.list_chain().await
    }

    /// Recomputes every hash from genesis.
    pub async fn verify(&self) -> AppResult<ChainVerification> {
        let entries = self.repository.list_chain().await?;
        let verification = verify_chain(&entries);

        if !verification.valid {
            warn!(
                entries_checked = verification.entries_checked,
                first_invalid_sequence = ?verification.first_invalid_sequence,
                "immutable audit chain failed verification"
            );
        }

        Ok(verification)
    }
}
