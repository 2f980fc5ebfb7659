use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use procura_core::{AppError, AppResult};
use procura_domain::{
    AuditEntry, EnterpriseStatusSnapshot, IntegrationRecord, IntegrationStoreState,
    NewAuditEntry, NewIntegrationRecord, RecordId, RecordStatus, Transport,
};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audit_recorder::AuditRecorder;
use crate::config::IntegrationConfig;
use crate::idempotency_service::{IdempotencyScope, IdempotencyService};
use crate::integration_ports::{
    FlushResult, FlushWindowCounts, HealthSnapshot, HealthStatus, IntegrationDispatcher,
    IntegrationStore, QueueOverview, SubmissionReceipt, SubmitEventInput,
};

mod enqueue;
mod flush;
mod inspection;
mod submission;

/// Durable at-least-once delivery queue with retry and dead-lettering.
///
/// Every load-mutate-save of the store happens under `store_lock`. The set
/// it guards holds ids of records currently being dispatched, so a flush
/// never claims a record another flush has in flight. Dispatch itself runs
/// without the lock.
#[derive(Clone)]
pub struct IntegrationQueueService {
    config: IntegrationConfig,
    store: Arc<dyn IntegrationStore>,
    dispatcher: Arc<dyn IntegrationDispatcher>,
    audit: AuditRecorder,
    idempotency: IdempotencyService,
    store_lock: Arc<Mutex<HashSet<RecordId>>>,
}

impl IntegrationQueueService {
    /// Creates an integration queue service.
    #[must_use]
    pub fn new(
        config: IntegrationConfig,
        store: Arc<dyn IntegrationStore>,
        dispatcher: Arc<dyn IntegrationDispatcher>,
        audit: AuditRecorder,
        idempotency: IdempotencyService,
    ) -> Self {
        Self {
            config,
            store,
            dispatcher,
            audit,
            idempotency,
            store_lock: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns the service configuration.
    #[must_use]
    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    pub(crate) fn dispatcher(&self) -> &Arc<dyn IntegrationDispatcher> {
        &self.dispatcher
    }

    pub(crate) fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub(crate) fn idempotency(&self) -> &IdempotencyService {
        &self.idempotency
    }
}

#[cfg(test)]
mod tests;
