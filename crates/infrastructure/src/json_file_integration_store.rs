use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use procura_application::IntegrationStore;
use procura_core::{AppError, AppResult};
use procura_domain::IntegrationStoreState;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Integration store persisted as one pretty-printed JSON document.
///
/// Saves go through a sibling temp file that is synced and renamed over the
/// document, so readers never observe a partial write.
#[derive(Debug, Clone)]
pub struct JsonFileIntegrationStore {
    path: PathBuf,
}

impl JsonFileIntegrationStore {
    /// Creates a store for the document at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "integration_store.json".to_owned());
        self.path.with_file_name(format!("{file_name}.{suffix}"))
    }

    async fn quarantine_corrupt_document(&self) {
        let quarantine = self.sibling_path(&format!("corrupt-{}", Utc::now().timestamp()));
        if let Err(error) = tokio::fs::rename(&self.path, &quarantine).await {
            warn!(
                path = %self.path.display(),
                error = %error,
                "failed to move corrupt integration store aside"
            );
        } else {
            warn!(
                path = %self.path.display(),
                quarantine = %quarantine.display(),
                "moved corrupt integration store aside"
            );
        }
    }
}

#[async_trait]
impl IntegrationStore for JsonFileIntegrationStore {
    async fn load(&self) -> AppResult<IntegrationStoreState> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Ok(IntegrationStoreState::default());
            }
            Err(error) => {
                return Err(AppError::Internal(format!(
                    "failed to read integration store '{}': {error}",
                    self.path.display()
                )));
            }
        };

        match serde_json::from_slice::<IntegrationStoreState>(&bytes) {
            Ok(state) => Ok(state),
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    error = %error,
                    "integration store is unreadable, starting from empty state"
                );
                self.quarantine_corrupt_document().await;
                Ok(IntegrationStoreState::default())
            }
        }
    }

    async fn save(&self, state: &IntegrationStoreState) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                AppError::Internal(format!(
                    "failed to create integration store directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }

        let bytes = serde_json::to_vec_pretty(state).map_err(|error| {
            AppError::Internal(format!("failed to serialize integration store: {error}"))
        })?;

        let temp_path = self.sibling_path(&format!("{}.tmp", uuid::Uuid::new_v4()));
        let written = write_synced(temp_path.as_path(), &bytes).await;
        if let Err(error) = written {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(AppError::Internal(format!(
                "failed to write integration store temp file '{}': {error}",
                temp_path.display()
            )));
        }

        if let Err(error) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(AppError::Internal(format!(
                "failed to replace integration store '{}': {error}",
                self.path.display()
            )));
        }

        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}
