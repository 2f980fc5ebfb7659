use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procura_application::AuditChainRepository;
use procura_core::{AppError, AppResult};
use procura_domain::{CHAIN_GENESIS_HASH, ChainEntry, canonical_json};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed hash-linked audit ledger.
///
/// The payload is stored in canonical JSON text so verification recomputes
/// hashes over exactly the bytes that were hashed on append.
#[derive(Clone)]
pub struct PostgresAuditChainRepository {
    pool: PgPool,
}

impl PostgresAuditChainRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ChainEntryRow {
    sequence_id: i64,
    at: DateTime<Utc>,
    action: String,
    payload_json: String,
    prev_hash: String,
    hash: String,
}

impl TryFrom<ChainEntryRow> for ChainEntry {
    type Error = AppError;

    fn try_from(row: ChainEntryRow) -> Result<Self, Self::Error> {
        let payload_snapshot = serde_json::from_str(row.payload_json.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "immutable audit entry {} has unreadable payload: {error}",
                row.sequence_id
            ))
        })?;

        Ok(Self {
            sequence_id: row.sequence_id,
            at: row.at,
            action: row.action,
            payload_snapshot,
            prev_hash: row.prev_hash,
            hash: row.hash,
        })
    }
}

#[async_trait]
impl AuditChainRepository for PostgresAuditChainRepository {
    async fn append_link(
        &self,
        at: DateTime<Utc>,
        action: &str,
        payload_snapshot: Value,
    ) -> AppResult<ChainEntry> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start immutable audit transaction: {error}"))
        })?;

        sqlx::query("LOCK TABLE immutable_audit_chain IN EXCLUSIVE MODE")
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to lock immutable audit chain: {error}"))
            })?;

        let prev_hash = sqlx::query_scalar::<_, String>(
            "SELECT hash FROM immutable_audit_chain ORDER BY sequence_id DESC LIMIT 1",
        )
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to read immutable audit chain head: {error}"))
        })?
        .unwrap_or_else(|| CHAIN_GENESIS_HASH.to_owned());

        let linked = ChainEntry::link(0, at, action, payload_snapshot, prev_hash);

        let sequence_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO immutable_audit_chain (at, action, payload_json, prev_hash, hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING sequence_id
            "#,
        )
        .bind(linked.at)
        .bind(linked.action.as_str())
        .bind(canonical_json(&linked.payload_snapshot))
        .bind(linked.prev_hash.as_str())
        .bind(linked.hash.as_str())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to append immutable audit entry: {error}"))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit immutable audit entry: {error}"))
        })?;

        Ok(ChainEntry {
            sequence_id,
            ..linked
        })
    }

    async fn list_chain(&self) -> AppResult<Vec<ChainEntry>> {
        let rows = sqlx::query_as::<_, ChainEntryRow>(
            r#"
            SELECT sequence_id, at, action, payload_json, prev_hash, hash
            FROM immutable_audit_chain
            ORDER BY sequence_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list immutable audit chain: {error}"))
        })?;

        rows.into_iter().map(ChainEntry::try_from).collect()
    }
}
