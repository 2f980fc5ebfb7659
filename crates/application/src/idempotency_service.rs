use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use procura_core::{AppError, AppResult};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::integration_ports::IdempotencyRepository;

const IDEMPOTENCY_KEY_MAX_LENGTH: usize = 180;

/// Namespace separating keys of different request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyScope {
    /// Generic event submission.
    Event,
    /// Procurement draft submission.
    Draft,
    /// Enterprise autopilot run.
    Autopilot,
}

impl IdempotencyScope {
    /// Returns stable key prefix.
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Draft => "draft",
            Self::Autopilot => "autopilot",
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix())
    }
}

type KeyLocks = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Exclusive hold on one idempotency key.
///
/// The per-key entry is dropped from the lock table once no other
/// submission holds or waits for it.
pub struct SubmissionGuard {
    locks: KeyLocks,
    storage_key: String,
    _held: OwnedMutexGuard<()>,
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table plus the one held by this guard.
        if locks
            .get(self.storage_key.as_str())
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(self.storage_key.as_str());
        }
    }
}

/// Best-effort replay cache over the idempotency port.
#[derive(Clone)]
pub struct IdempotencyService {
    repository: Arc<dyn IdempotencyRepository>,
    key_locks: KeyLocks,
}

impl IdempotencyService {
    /// Creates an idempotency service.
    #[must_use]
    pub fn new(repository: Arc<dyn IdempotencyRepository>) -> Self {
        Self {
            repository,
            key_locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Trims a caller-supplied key. Blank keys disable replay protection.
    pub fn normalize_key(key: Option<&str>) -> AppResult<Option<String>> {
        let Some(key) = key.map(str::trim).filter(|key| !key.is_empty()) else {
            return Ok(None);
        };

        if key.chars().count() > IDEMPOTENCY_KEY_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "idempotency key must be at most {IDEMPOTENCY_KEY_MAX_LENGTH} characters"
            )));
        }

        Ok(Some(key.to_owned()))
    }

    /// Serializes submissions sharing one key so concurrent duplicates
    /// create one record. Different keys proceed independently.
    pub async fn lock_key(&self, scope: IdempotencyScope, key: &str) -> SubmissionGuard {
        let storage_key = scope.storage_key(key);
        let key_lock = {
            let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(storage_key.clone()).or_default())
        };

        SubmissionGuard {
            locks: Arc::clone(&self.key_locks),
            storage_key,
            _held: key_lock.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the cached response. Lookup failures read as a miss.
    pub async fn get(&self, scope: IdempotencyScope, key: &str) -> Option<Value> {
        let storage_key = scope.storage_key(key);
        match self.repository.find_response(storage_key.as_str()).await {
            Ok(response) => response,
            Err(error) => {
                warn!(key = %storage_key, error = %error, "idempotency lookup failed");
                None
            }
        }
    }

    /// Caches one response. Failures forfeit replay protection only.
    pub async fn put(&self, scope: IdempotencyScope, key: &str, response: &Value) {
        let storage_key = scope.storage_key(key);
        if let Err(error) = self
            .repository
            .store_response(storage_key.as_str(), response)
            .await
        {
            warn!(key = %storage_key, error = %error, "idempotency write failed");
        }
    }
}
