use async_trait::async_trait;
use procura_application::IdempotencyRepository;
use procura_core::{AppError, AppResult};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;

/// PostgreSQL-backed idempotency responses.
///
/// The first stored response per key wins. Responses older than the
/// configured ttl read as missing.
#[derive(Clone)]
pub struct PostgresIdempotencyRepository {
    pool: PgPool,
    ttl_seconds: i64,
}

impl PostgresIdempotencyRepository {
    /// Creates a repository with the provided pool and response ttl.
    #[must_use]
    pub fn new(pool: PgPool, ttl_seconds: u32) -> Self {
        Self {
            pool,
            ttl_seconds: i64::from(ttl_seconds.max(1)),
        }
    }
}

#[async_trait]
impl IdempotencyRepository for PostgresIdempotencyRepository {
    async fn find_response(&self, key: &str) -> AppResult<Option<Value>> {
        let response = sqlx::query_scalar::<_, Json<Value>>(
            r#"
            SELECT response
            FROM idempotency_keys
            WHERE key = $1
                AND created_at > now() - make_interval(secs => $2)
            "#,
        )
        .bind(key)
        .bind(self.ttl_seconds as f64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to read idempotency key '{key}': {error}"))
        })?;

        Ok(response.map(|response| response.0))
    }

    async fn store_response(&self, key: &str, response: &Value) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, created_at, response)
            VALUES ($1, now(), $2)
            ON CONFLICT (key) DO UPDATE
            SET created_at = EXCLUDED.created_at,
                response = EXCLUDED.response
            WHERE idempotency_keys.created_at <= now() - make_interval(secs => $3)
            "#,
        )
        .bind(key)
        .bind(Json(response))
        .bind(self.ttl_seconds as f64)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to store idempotency key '{key}': {error}"))
        })?;

        Ok(())
    }
}
