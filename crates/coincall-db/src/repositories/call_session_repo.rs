//! Call session repository implementation
//!
//! Status changes are conditional updates guarded on the current status.
//! Settlement runs in a single transaction that locks the session row and both
//! wallets, so concurrent `end` requests apply payment at most once.

use super::wallet_repo::{apply_delta_locked, ensure_wallet, WalletRow, WALLET_COLUMNS};
use coincall_core::{
    models::{
        end_reason, CallSession, CallStatus, CallType, MissedReason, SettleAttempt, Wallet,
    },
    traits::{CallHistoryFilter, CallSessionRepository, Pagination, SettlementPlanner},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of CallSessionRepository
pub struct PgCallSessionRepository {
    pool: PgPool,
}

impl PgCallSessionRepository {
    /// Create a new call session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse call status from string
    fn parse_status(s: &str) -> CallStatus {
        CallStatus::from_str(s).unwrap_or(CallStatus::Failed)
    }

    /// Parse call type from string
    fn parse_call_type(s: &str) -> CallType {
        CallType::from_str(s).unwrap_or(CallType::Audio)
    }

    fn update_error(call_id: &str, e: sqlx::Error) -> AppError {
        error!("Database error updating call session {}: {}", call_id, e);
        AppError::Database(format!("Failed to update call session: {}", e))
    }
}

const SESSION_COLUMNS: &str = r#"
    id, call_id, caller_user_id, receiver_user_id, call_type,
    coins_per_minute, commission_percent, pricing_version,
    status, start_time, connected_at, end_time,
    max_allowed_minutes, duration_minutes,
    coins_deducted, coins_to_receiver, admin_commission,
    payment_processed, end_reason, missed_reason,
    created_at, updated_at
"#;

#[async_trait]
impl CallSessionRepository for PgCallSessionRepository {
    #[instrument(skip(self, session), fields(call_id = %session.call_id))]
    async fn create(&self, session: &CallSession) -> AppResult<CallSession> {
        debug!("Creating call session");

        let query = format!(
            r#"
            INSERT INTO call_sessions (
                id, call_id, caller_user_id, receiver_user_id, call_type,
                coins_per_minute, commission_percent, pricing_version,
                status, start_time, max_allowed_minutes,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(session.id)
            .bind(&session.call_id)
            .bind(session.caller_user_id)
            .bind(session.receiver_user_id)
            .bind(session.call_type.to_string())
            .bind(session.coins_per_minute)
            .bind(session.commission_percent)
            .bind(session.pricing_version)
            .bind(session.status.to_string())
            .bind(session.start_time)
            .bind(session.max_allowed_minutes)
            .bind(session.created_at)
            .bind(session.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating call session: {}", e);
                if e.to_string().contains("unique constraint") {
                    AppError::Conflict(format!("Call {} already exists", session.call_id))
                } else {
                    AppError::Database(format!("Failed to create call session: {}", e))
                }
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CallSession>> {
        debug!("Finding call session: {}", call_id);

        let query = format!(
            "SELECT {} FROM call_sessions WHERE call_id = $1",
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call session {}: {}", call_id, e);
                AppError::Database(format!("Failed to find call session: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn mark_connected(
        &self,
        call_id: &str,
        connected_at: DateTime<Utc>,
    ) -> AppResult<Option<CallSession>> {
        let query = format!(
            r#"
            UPDATE call_sessions
            SET status = 'connected',
                connected_at = $2,
                updated_at = NOW()
            WHERE call_id = $1 AND status = 'initiated'
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(call_id)
            .bind(connected_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::update_error(call_id, e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn mark_ended(
        &self,
        call_id: &str,
        end_time: DateTime<Utc>,
        duration_minutes: i64,
        end_reason: Option<&str>,
    ) -> AppResult<Option<CallSession>> {
        let query = format!(
            r#"
            UPDATE call_sessions
            SET status = 'ended',
                end_time = $2,
                duration_minutes = $3,
                end_reason = COALESCE($4, end_reason),
                updated_at = NOW()
            WHERE call_id = $1
              AND status IN ('initiated', 'connected')
              AND payment_processed = FALSE
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(call_id)
            .bind(end_time)
            .bind(duration_minutes)
            .bind(end_reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::update_error(call_id, e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn mark_failed(
        &self,
        call_id: &str,
        reason: MissedReason,
        end_time: DateTime<Utc>,
    ) -> AppResult<Option<CallSession>> {
        let query = format!(
            r#"
            UPDATE call_sessions
            SET status = 'failed',
                missed_reason = $2,
                end_reason = $3,
                end_time = $4,
                updated_at = NOW()
            WHERE call_id = $1
              AND status = 'initiated'
              AND payment_processed = FALSE
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(call_id)
            .bind(reason.as_str())
            .bind(end_reason::MISSED)
            .bind(end_time)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::update_error(call_id, e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn mark_payment_failed(
        &self,
        call_id: &str,
        duration_minutes: i64,
    ) -> AppResult<Option<CallSession>> {
        warn!("Marking call {} as payment failed", call_id);

        let query = format!(
            r#"
            UPDATE call_sessions
            SET status = 'failed',
                end_reason = $2,
                duration_minutes = $3,
                end_time = COALESCE(end_time, NOW()),
                updated_at = NOW()
            WHERE call_id = $1 AND payment_processed = FALSE
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(call_id)
            .bind(end_reason::PAYMENT_FAILED)
            .bind(duration_minutes)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::update_error(call_id, e))?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, planner))]
    async fn settle_once(
        &self,
        call_id: &str,
        planner: &dyn SettlementPlanner,
    ) -> AppResult<SettleAttempt> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Lock session row
        let query = format!(
            "SELECT {} FROM call_sessions WHERE call_id = $1 FOR UPDATE",
            SESSION_COLUMNS
        );

        let session: CallSession = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(call_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to lock call session {}: {}", call_id, e);
                AppError::Database(format!("Failed to lock call session: {}", e))
            })?
            .ok_or_else(|| AppError::CallSessionNotFound(call_id.to_string()))?
            .into();

        if session.payment_processed {
            debug!("Call {} already settled", call_id);
            return Ok(SettleAttempt::AlreadySettled(session));
        }

        if session.missed_reason.is_some() {
            debug!("Call {} was missed, nothing to settle", call_id);
            return Ok(SettleAttempt::NotSettleable(session));
        }

        ensure_wallet(&mut tx, session.receiver_user_id).await?;

        // Lock both wallets in a stable order
        let query = format!(
            "SELECT {} FROM wallets WHERE user_id = ANY($1) ORDER BY user_id FOR UPDATE",
            WALLET_COLUMNS
        );

        let wallets: Vec<Wallet> = sqlx::query_as::<sqlx::Postgres, WalletRow>(&query)
            .bind(vec![session.caller_user_id, session.receiver_user_id])
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to lock wallets for call {}: {}", call_id, e);
                AppError::Database(format!("Failed to lock wallets: {}", e))
            })?
            .into_iter()
            .map(Into::into)
            .collect();

        let caller_wallet = wallets
            .iter()
            .find(|w| w.user_id == session.caller_user_id)
            .cloned()
            .ok_or_else(|| AppError::WalletNotFound(session.caller_user_id.to_string()))?;

        let receiver_wallet = wallets
            .iter()
            .find(|w| w.user_id == session.receiver_user_id)
            .cloned()
            .ok_or_else(|| AppError::WalletNotFound(session.receiver_user_id.to_string()))?;

        let plan = planner.plan(&session, caller_wallet.coin_balance);
        if plan.is_partial() {
            warn!(
                "Call {} short by {} coins, deducting remaining balance",
                call_id,
                plan.coins_required - plan.coins_deducted
            );
        }

        if plan.coins_deducted > 0 {
            let entry = planner.payment_entry(&session, &plan);
            apply_delta_locked(&mut tx, &caller_wallet, -plan.coins_deducted, Some(&entry))
                .await?;
        }

        if plan.monetized && plan.coins_to_receiver > 0 {
            let entry = planner.earning_entry(&session, &plan);
            apply_delta_locked(&mut tx, &receiver_wallet, plan.coins_to_receiver, Some(&entry))
                .await?;
        }

        let query = format!(
            r#"
            UPDATE call_sessions
            SET status = 'ended',
                payment_processed = TRUE,
                end_time = $2,
                duration_minutes = $3,
                coins_deducted = $4,
                coins_to_receiver = $5,
                admin_commission = $6,
                end_reason = CASE
                    WHEN end_reason IS NULL OR end_reason = $8 THEN $7
                    ELSE end_reason
                END,
                updated_at = NOW()
            WHERE call_id = $1 AND payment_processed = FALSE
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let settled: CallSession = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(call_id)
            .bind(plan.ended_at)
            .bind(plan.duration_minutes)
            .bind(plan.coins_deducted)
            .bind(plan.coins_to_receiver)
            .bind(plan.admin_commission)
            .bind(planner.end_reason())
            .bind(end_reason::PAYMENT_FAILED)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to finalize call session {}: {}", call_id, e);
                AppError::Database(format!("Failed to finalize call session: {}", e))
            })?
            .ok_or_else(|| AppError::Transaction(format!("Settlement claim lost for {}", call_id)))?
            .into();

        tx.commit().await.map_err(|e| {
            error!("Failed to commit settlement: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Settled call {}: {} min, deducted {}, receiver {}, commission {}",
            call_id,
            settled.duration_minutes,
            settled.coins_deducted,
            settled.coins_to_receiver,
            settled.admin_commission
        );

        Ok(SettleAttempt::Settled(settled))
    }

    #[instrument(skip(self, filter))]
    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &CallHistoryFilter,
        pagination: &Pagination,
    ) -> AppResult<(Vec<CallSession>, i64)> {
        let call_type = filter.call_type.map(|t| t.to_string());
        let status = filter.status.map(|s| s.to_string());

        let where_clause = r#"
            WHERE (caller_user_id = $1 OR receiver_user_id = $1)
              AND ($2::text IS NULL OR call_type = $2)
              AND ($3::text IS NULL OR status = $3)
        "#;

        let total: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM call_sessions {}",
            where_clause
        ))
        .bind(user_id)
        .bind(&call_type)
        .bind(&status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting call sessions: {}", e);
            AppError::Database(format!("Failed to count call sessions: {}", e))
        })?;

        let query = format!(
            "SELECT {} FROM call_sessions {} ORDER BY created_at DESC LIMIT $4 OFFSET $5",
            SESSION_COLUMNS, where_clause
        );

        let rows = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(user_id)
            .bind(&call_type)
            .bind(&status)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing call sessions: {}", e);
                AppError::Database(format!("Failed to fetch call sessions: {}", e))
            })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }

    #[instrument(skip(self))]
    async fn list_active_for_user(&self, user_id: Uuid) -> AppResult<Vec<CallSession>> {
        let query = format!(
            r#"
            SELECT {}
            FROM call_sessions
            WHERE (caller_user_id = $1 OR receiver_user_id = $1)
              AND status IN ('initiated', 'connected')
            ORDER BY start_time DESC
            "#,
            SESSION_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing active calls: {}", e);
                AppError::Database(format!("Failed to fetch active calls: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    call_id: String,
    caller_user_id: Uuid,
    receiver_user_id: Uuid,
    call_type: String,
    coins_per_minute: i64,
    commission_percent: Decimal,
    pricing_version: i64,
    status: String,
    start_time: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    max_allowed_minutes: i64,
    duration_minutes: i64,
    coins_deducted: i64,
    coins_to_receiver: i64,
    admin_commission: i64,
    payment_processed: bool,
    end_reason: Option<String>,
    missed_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for CallSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            call_id: row.call_id,
            caller_user_id: row.caller_user_id,
            receiver_user_id: row.receiver_user_id,
            call_type: PgCallSessionRepository::parse_call_type(&row.call_type),
            coins_per_minute: row.coins_per_minute,
            commission_percent: row.commission_percent,
            pricing_version: row.pricing_version,
            status: PgCallSessionRepository::parse_status(&row.status),
            start_time: row.start_time,
            connected_at: row.connected_at,
            end_time: row.end_time,
            max_allowed_minutes: row.max_allowed_minutes,
            duration_minutes: row.duration_minutes,
            coins_deducted: row.coins_deducted,
            coins_to_receiver: row.coins_to_receiver,
            admin_commission: row.admin_commission,
            payment_processed: row.payment_processed,
            end_reason: row.end_reason,
            missed_reason: row.missed_reason.as_deref().and_then(MissedReason::from_str),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
