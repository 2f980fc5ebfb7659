//! Process-local adapters used when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procura_application::{
    AuditChainRepository, IdempotencyRepository, IntegrationAuditRepository, IntegrationStore,
};
use procura_core::AppResult;
use procura_domain::{
    AuditEntry, CHAIN_GENESIS_HASH, ChainEntry, IntegrationStoreState, NewAuditEntry,
};
use serde_json::Value;
use tokio::sync::Mutex;

/// Integration store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryIntegrationStore {
    state: Mutex<IntegrationStoreState>,
}

impl InMemoryIntegrationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrationStore for InMemoryIntegrationStore {
    async fn load(&self) -> AppResult<IntegrationStoreState> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &IntegrationStoreState) -> AppResult<()> {
        *self.state.lock().await = state.clone();
        Ok(())
    }
}

/// Audit log held in memory.
#[derive(Debug, Default)]
pub struct InMemoryIntegrationAuditRepository {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryIntegrationAuditRepository {
    /// Creates an empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrationAuditRepository for InMemoryIntegrationAuditRepository {
    async fn append_entry(&self, entry: NewAuditEntry) -> AppResult<AuditEntry> {
        let mut entries = self.entries.lock().await;
        let sequence_id = next_sequence(entries.last().map(|entry| entry.sequence_id));
        let entry = entry.into_entry(sequence_id, Utc::now());
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_recent_entries(&self, limit: usize) -> AppResult<Vec<AuditEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Hash-linked ledger held in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditChainRepository {
    entries: Mutex<Vec<ChainEntry>>,
}

impl InMemoryAuditChainRepository {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditChainRepository for InMemoryAuditChainRepository {
    async fn append_link(
        &self,
        at: DateTime<Utc>,
        action: &str,
        payload_snapshot: Value,
    ) -> AppResult<ChainEntry> {
        let mut entries = self.entries.lock().await;
        let (sequence_id, prev_hash) = match entries.last() {
            Some(head) => (next_sequence(Some(head.sequence_id)), head.hash.clone()),
            None => (next_sequence(None), CHAIN_GENESIS_HASH.to_owned()),
        };

        let entry = ChainEntry::link(sequence_id, at, action, payload_snapshot, prev_hash);
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_chain(&self) -> AppResult<Vec<ChainEntry>> {
        Ok(self.entries.lock().await.clone())
    }
}

/// Idempotency responses held in memory, first write wins.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyRepository {
    responses: Mutex<HashMap<String, Value>>,
}

impl InMemoryIdempotencyRepository {
    /// Creates an empty response cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyRepository for InMemoryIdempotencyRepository {
    async fn find_response(&self, key: &str) -> AppResult<Option<Value>> {
        Ok(self.responses.lock().await.get(key).cloned())
    }

    async fn store_response(&self, key: &str, response: &Value) -> AppResult<()> {
        self.responses
            .lock()
            .await
            .entry(key.to_owned())
            .or_insert_with(|| response.clone());
        Ok(())
    }
}

fn next_sequence(last: Option<i64>) -> i64 {
    last.map_or(1, |sequence_id| sequence_id.saturating_add(1))
}
