use async_trait::async_trait;
use procura_core::AppResult;
use procura_domain::IntegrationStoreState;

/// Port for the persisted integration document.
///
/// A missing or unreadable document loads as empty state. `save` replaces
/// the document atomically; a concurrent `load` sees either the previous or
/// the new document, never a partial write.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Loads the current document.
    async fn load(&self) -> AppResult<IntegrationStoreState>;

    /// Replaces the current document.
    async fn save(&self, state: &IntegrationStoreState) -> AppResult<()>;
}
