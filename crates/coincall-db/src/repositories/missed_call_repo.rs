//! Missed call repository implementation

use coincall_core::{
    models::{CallType, MissedCall, MissedReason},
    traits::{MissedCallRepository, Pagination},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of MissedCallRepository
pub struct PgMissedCallRepository {
    pool: PgPool,
}

impl PgMissedCallRepository {
    /// Create a new missed call repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MISSED_COLUMNS: &str = r#"
    id, call_id, caller_user_id, receiver_user_id, call_type,
    initiated_at, missed_reason, notification_sent, viewed, created_at
"#;

#[async_trait]
impl MissedCallRepository for PgMissedCallRepository {
    #[instrument(skip(self, missed), fields(call_id = %missed.call_id, reason = %missed.missed_reason))]
    async fn create(&self, missed: &MissedCall) -> AppResult<MissedCall> {
        debug!("Recording missed call");

        // A retried failure report for the same call keeps the first record
        let query = format!(
            r#"
            INSERT INTO missed_calls (
                id, call_id, caller_user_id, receiver_user_id, call_type,
                initiated_at, missed_reason, notification_sent, viewed, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (call_id) DO UPDATE SET call_id = EXCLUDED.call_id
            RETURNING {}
            "#,
            MISSED_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, MissedCallRow>(&query)
            .bind(missed.id)
            .bind(&missed.call_id)
            .bind(missed.caller_user_id)
            .bind(missed.receiver_user_id)
            .bind(missed.call_type.to_string())
            .bind(missed.initiated_at)
            .bind(missed.missed_reason.as_str())
            .bind(missed.notification_sent)
            .bind(missed.viewed)
            .bind(missed.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error recording missed call: {}", e);
                AppError::Database(format!("Failed to record missed call: {}", e))
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn list_for_receiver(
        &self,
        receiver_user_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<(Vec<MissedCall>, i64)> {
        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM missed_calls WHERE receiver_user_id = $1")
                .bind(receiver_user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error counting missed calls: {}", e);
                    AppError::Database(format!("Failed to count missed calls: {}", e))
                })?;

        let query = format!(
            r#"
            SELECT {}
            FROM missed_calls
            WHERE receiver_user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            MISSED_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, MissedCallRow>(&query)
            .bind(receiver_user_id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing missed calls: {}", e);
                AppError::Database(format!("Failed to fetch missed calls: {}", e))
            })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }

    #[instrument(skip(self))]
    async fn mark_viewed(
        &self,
        call_id: &str,
        receiver_user_id: Uuid,
    ) -> AppResult<Option<MissedCall>> {
        let query = format!(
            r#"
            UPDATE missed_calls
            SET viewed = TRUE
            WHERE call_id = $1 AND receiver_user_id = $2
            RETURNING {}
            "#,
            MISSED_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, MissedCallRow>(&query)
            .bind(call_id)
            .bind(receiver_user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error marking missed call {} viewed: {}", call_id, e);
                AppError::Database(format!("Failed to update missed call: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn mark_notification_sent(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE missed_calls SET notification_sent = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error flagging missed call {}: {}", id, e);
                AppError::Database(format!("Failed to update missed call: {}", e))
            })?;

        Ok(())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct MissedCallRow {
    id: Uuid,
    call_id: String,
    caller_user_id: Uuid,
    receiver_user_id: Uuid,
    call_type: String,
    initiated_at: DateTime<Utc>,
    missed_reason: String,
    notification_sent: bool,
    viewed: bool,
    created_at: DateTime<Utc>,
}

impl From<MissedCallRow> for MissedCall {
    fn from(row: MissedCallRow) -> Self {
        Self {
            id: row.id,
            call_id: row.call_id,
            caller_user_id: row.caller_user_id,
            receiver_user_id: row.receiver_user_id,
            call_type: CallType::from_str(&row.call_type).unwrap_or(CallType::Audio),
            initiated_at: row.initiated_at,
            missed_reason: MissedReason::from_str(&row.missed_reason)
                .unwrap_or(MissedReason::NoAnswer),
            notification_sent: row.notification_sent,
            viewed: row.viewed,
            created_at: row.created_at,
        }
    }
}
