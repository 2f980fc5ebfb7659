//! Redis-backed idempotency responses.

use async_trait::async_trait;
use procura_application::IdempotencyRepository;
use procura_core::{AppError, AppResult};
use redis::AsyncCommands;
use serde_json::Value;

/// Redis implementation of the idempotency port.
///
/// Responses are written with `SET NX EX`, so the first response per key
/// wins until it expires.
#[derive(Clone)]
pub struct RedisIdempotencyRepository {
    client: redis::Client,
    key_prefix: String,
    ttl_seconds: u64,
}

impl RedisIdempotencyRepository {
    /// Creates a repository with a configured Redis client, key prefix and ttl.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>, ttl_seconds: u32) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            ttl_seconds: u64::from(ttl_seconds.max(1)),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl IdempotencyRepository for RedisIdempotencyRepository {
    async fn find_response(&self, key: &str) -> AppResult<Option<Value>> {
        let mut connection = self.connection().await?;
        let encoded: Option<String> = connection.get(self.key_for(key)).await.map_err(|error| {
            AppError::Internal(format!("failed to read idempotency key '{key}': {error}"))
        })?;

        encoded
            .map(|encoded| {
                serde_json::from_str(encoded.as_str()).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid idempotency response stored for '{key}': {error}"
                    ))
                })
            })
            .transpose()
    }

    async fn store_response(&self, key: &str, response: &Value) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let _: Option<String> = redis::cmd("SET")
            .arg(self.key_for(key))
            .arg(response.to_string())
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to store idempotency key '{key}': {error}"))
            })?;

        Ok(())
    }
}
