use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use procura_core::AppResult;
use procura_domain::{AuditEntry, NewAuditEntry};
use tracing::warn;

use crate::integration_ports::IntegrationAuditRepository;

const AUDIT_READ_MAX_LIMIT: usize = 1_000;

/// Fire-and-forget writer over the diagnostic audit log.
///
/// Write failures never reach the caller. They are logged and counted so
/// health reporting can expose them.
#[derive(Clone)]
pub struct AuditRecorder {
    repository: Arc<dyn IntegrationAuditRepository>,
    write_failures: Arc<AtomicU64>,
}

impl AuditRecorder {
    /// Creates an audit recorder.
    #[must_use]
    pub fn new(repository: Arc<dyn IntegrationAuditRepository>) -> Self {
        Self {
            repository,
            write_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Appends one entry, logging and counting failures.
    pub async fn record(&self, entry: NewAuditEntry) {
        let action = entry.action.clone();
        if let Err(error) = self.repository.append_entry(entry).await {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(action = %action, error = %error, "audit write failed");
        }
    }

    /// Returns the number of failed writes since construction.
    #[must_use]
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Lists the latest entries, newest first. `limit` is clamped to 1..=1000.
    pub async fn read_recent(&self, limit: usize) -> AppResult<Vec<AuditEntry>> {
        self.repository
            .list_recent_entries(limit.clamp(1, AUDIT_READ_MAX_LIMIT))
            .await
    }
}
