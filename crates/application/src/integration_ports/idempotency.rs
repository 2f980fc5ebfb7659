use async_trait::async_trait;
use procura_core::AppResult;
use serde_json::Value;

/// Port for replayable responses keyed by idempotency key.
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Returns the stored response for one key.
    async fn find_response(&self, key: &str) -> AppResult<Option<Value>>;

    /// Stores one response. The first stored response for a key wins.
    async fn store_response(&self, key: &str, response: &Value) -> AppResult<()>;
}
