use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procura_application::IntegrationAuditRepository;
use procura_core::{AppError, AppResult};
use procura_domain::{AuditEntry, NewAuditEntry};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed diagnostic audit log.
#[derive(Clone)]
pub struct PostgresIntegrationAuditRepository {
    pool: PgPool,
}

impl PostgresIntegrationAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditEntryRow {
    sequence_id: i64,
    at: DateTime<Utc>,
    action: String,
    status: String,
    record_id: Option<String>,
    note: String,
    payload_snapshot: Json<Value>,
}

impl From<AuditEntryRow> for AuditEntry {
    fn from(row: AuditEntryRow) -> Self {
        Self {
            sequence_id: row.sequence_id,
            at: row.at,
            action: row.action,
            status: row.status,
            record_id: row.record_id,
            note: row.note,
            payload_snapshot: row.payload_snapshot.0,
        }
    }
}

#[async_trait]
impl IntegrationAuditRepository for PostgresIntegrationAuditRepository {
    async fn append_entry(&self, entry: NewAuditEntry) -> AppResult<AuditEntry> {
        let row = sqlx::query_as::<_, AuditEntryRow>(
            r#"
            INSERT INTO integration_audit_entries (
                at,
                action,
                status,
                record_id,
                note,
                payload_snapshot
            )
            VALUES (now(), $1, $2, $3, $4, $5)
            RETURNING sequence_id, at, action, status, record_id, note, payload_snapshot
            "#,
        )
        .bind(entry.action.as_str())
        .bind(entry.status.as_str())
        .bind(entry.record_id.as_deref())
        .bind(entry.note.as_str())
        .bind(Json(&entry.payload_snapshot))
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to append integration audit entry '{}': {error}",
                entry.action
            ))
        })?;

        Ok(row.into())
    }

    async fn list_recent_entries(&self, limit: usize) -> AppResult<Vec<AuditEntry>> {
        let capped_limit = i64::try_from(limit.clamp(1, 1_000)).unwrap_or(1_000);
        let rows = sqlx::query_as::<_, AuditEntryRow>(
            r#"
            SELECT sequence_id, at, action, status, record_id, note, payload_snapshot
            FROM integration_audit_entries
            ORDER BY sequence_id DESC
            LIMIT $1
            "#,
        )
        .bind(capped_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list integration audit entries: {error}"))
        })?;

        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}
