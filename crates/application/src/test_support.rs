use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procura_core::{AppError, AppResult};
use procura_domain::{
    AuditEntry, CHAIN_GENESIS_HASH, ChainEntry, IntegrationRecord, IntegrationStoreState,
    NewAuditEntry, RecordId,
};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::integration_ports::{
    AuditChainRepository, DispatchOutcome, EndpointCall, EndpointResponse, IdempotencyRepository,
    IntegrationAuditRepository, IntegrationDispatcher, IntegrationStore,
};
use crate::{AuditRecorder, IdempotencyService, IntegrationConfig, IntegrationQueueService};

#[derive(Default)]
pub(crate) struct FakeIntegrationStore {
    state: Mutex<IntegrationStoreState>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl FakeIntegrationStore {
    pub(crate) async fn snapshot(&self) -> IntegrationStoreState {
        self.state.lock().await.clone()
    }

    pub(crate) fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IntegrationStore for FakeIntegrationStore {
    async fn load(&self) -> AppResult<IntegrationStoreState> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &IntegrationStoreState) -> AppResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AppError::Internal("disk full".to_owned()));
        }

        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().await = state.clone();
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeIdempotencyRepository {
    responses: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl IdempotencyRepository for FakeIdempotencyRepository {
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

pub(crate) struct FailingIdempotencyRepository;

#[async_trait]
impl IdempotencyRepository for FailingIdempotencyRepository {
    async fn find_response(&self, _key: &str) -> AppResult<Option<Value>> {
        Err(AppError::Internal("idempotency store offline".to_owned()))
    }

    async fn store_response(&self, _key: &str, _response: &Value) -> AppResult<()> {
        Err(AppError::Internal("idempotency store offline".to_owned()))
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditRepository {
    entries: Mutex<Vec<AuditEntry>>,
    fail_writes: AtomicBool,
}

impl FakeAuditRepository {
    pub(crate) fn failing() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(true),
        }
    }

    pub(crate) async fn actions(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|entry| (entry.action.clone(), entry.status.clone()))
            .collect()
    }
}

#[async_trait]
impl IntegrationAuditRepository for FakeAuditRepository {
    async fn append_entry(&self, entry: NewAuditEntry) -> AppResult<AuditEntry> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("audit table locked".to_owned()));
        }

        let mut entries = self.entries.lock().await;
        let sequence_id = i64::try_from(entries.len()).unwrap_or(i64::MAX) + 1;
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

#[derive(Default)]
pub(crate) struct FakeAuditChainRepository {
    entries: Mutex<Vec<ChainEntry>>,
    fail_appends: AtomicBool,
}

impl FakeAuditChainRepository {
    pub(crate) fn failing() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            fail_appends: AtomicBool::new(true),
        }
    }

    pub(crate) async fn tamper(&self, sequence_id: i64, payload_snapshot: Value) {
        if let Some(entry) = self
            .entries
            .lock()
            .await
            .iter_mut()
            .find(|entry| entry.sequence_id == sequence_id)
        {
            entry.payload_snapshot = payload_snapshot;
        }
    }

    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl AuditChainRepository for FakeAuditChainRepository {
    async fn append_link(
        &self,
        at: DateTime<Utc>,
        action: &str,
        payload_snapshot: Value,
    ) -> AppResult<ChainEntry> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(AppError::Internal("chain table locked".to_owned()));
        }

        let mut entries = self.entries.lock().await;
        let prev_hash = entries
            .last()
            .map(|entry| entry.hash.clone())
            .unwrap_or_else(|| CHAIN_GENESIS_HASH.to_owned());
        let sequence_id = i64::try_from(entries.len()).unwrap_or(i64::MAX) + 1;
        let entry = ChainEntry::link(sequence_id, at, action, payload_snapshot, prev_hash);
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_chain(&self) -> AppResult<Vec<ChainEntry>> {
        Ok(self.entries.lock().await.clone())
    }
}

/// Dispatcher returning scripted outcomes.
pub(crate) struct FakeDispatcher {
    target_configured: bool,
    deliver: bool,
    endpoint_statuses: HashMap<String, u16>,
    delay: Option<Duration>,
    dispatched: Mutex<Vec<RecordId>>,
    calls: Mutex<Vec<EndpointCall>>,
}

impl FakeDispatcher {
    /// No target webhook; every record fails.
    pub(crate) fn without_target() -> Self {
        Self::new(false, false)
    }

    /// Target configured but unreachable.
    pub(crate) fn unreachable() -> Self {
        Self::new(true, false)
    }

    /// Target configured and accepting every delivery.
    pub(crate) fn delivering() -> Self {
        Self::new(true, true)
    }

    fn new(target_configured: bool, deliver: bool) -> Self {
        Self {
            target_configured,
            deliver,
            endpoint_statuses: HashMap::new(),
            delay: None,
            dispatched: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers direct calls whose URL starts with `prefix` with `status`.
    pub(crate) fn with_endpoint_status(mut self, prefix: &str, status: u16) -> Self {
        self.endpoint_statuses.insert(prefix.to_owned(), status);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) async fn dispatched(&self) -> Vec<RecordId> {
        self.dispatched.lock().await.clone()
    }

    pub(crate) async fn calls(&self) -> Vec<EndpointCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl IntegrationDispatcher for FakeDispatcher {
    async fn dispatch_record(&self, record: &IntegrationRecord) -> DispatchOutcome {
        self.dispatched.lock().await.push(record.id());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if !self.target_configured {
            return DispatchOutcome::failed("target_webhook_not_configured");
        }

        if self.deliver {
            DispatchOutcome::delivered("http=200")
        } else {
            DispatchOutcome::failed("connection refused")
        }
    }

    async fn call_endpoint(&self, call: EndpointCall) -> EndpointResponse {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let status = self
            .endpoint_statuses
            .iter()
            .find(|(prefix, _)| call.url.starts_with(prefix.as_str()))
            .map(|(_, status)| *status)
            .unwrap_or(200);
        self.calls.lock().await.push(call);

        EndpointResponse {
            ok: (200..300).contains(&status),
            status,
            body: json!({"status": status}),
        }
    }

    fn target_configured(&self) -> bool {
        self.target_configured
    }
}

/// Wired queue service with handles to its fakes.
pub(crate) struct QueueHarness {
    pub(crate) service: IntegrationQueueService,
    pub(crate) store: Arc<FakeIntegrationStore>,
    pub(crate) dispatcher: Arc<FakeDispatcher>,
    pub(crate) audit: Arc<FakeAuditRepository>,
}

impl QueueHarness {
    pub(crate) fn new(dispatcher: FakeDispatcher, max_attempts: u32) -> Self {
        Self::with_audit(dispatcher, max_attempts, FakeAuditRepository::default())
    }

    pub(crate) fn with_audit(
        dispatcher: FakeDispatcher,
        max_attempts: u32,
        audit: FakeAuditRepository,
    ) -> Self {
        let store = Arc::new(FakeIntegrationStore::default());
        let dispatcher = Arc::new(dispatcher);
        let audit = Arc::new(audit);
        let service = IntegrationQueueService::new(
            IntegrationConfig::default().with_max_attempts(max_attempts),
            store.clone(),
            dispatcher.clone(),
            AuditRecorder::new(audit.clone()),
            IdempotencyService::new(Arc::new(FakeIdempotencyRepository::default())),
        );

        Self {
            service,
            store,
            dispatcher,
            audit,
        }
    }
}
