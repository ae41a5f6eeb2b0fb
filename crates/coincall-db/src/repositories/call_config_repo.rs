//! Call pricing configuration repository implementation
//!
//! The configuration is a single row (`id = 1`). Updates lock the row, merge
//! the partial update and bump `version` in one statement.

use coincall_core::{
    models::{CallConfig, CallConfigUpdate},
    traits::CallConfigRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of CallConfigRepository
pub struct PgCallConfigRepository {
    pool: PgPool,
}

impl PgCallConfigRepository {
    /// Create a new call config repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CONFIG_COLUMNS: &str = r#"
    video_rate_standard, video_rate_gstar,
    audio_rate_standard, audio_rate_gstar,
    message_cost,
    admin_commission_percent, gstar_commission_percent, gicon_commission_percent,
    coin_to_currency_ratio,
    version, updated_by, updated_at
"#;

#[async_trait]
impl CallConfigRepository for PgCallConfigRepository {
    #[instrument(skip(self))]
    async fn load(&self) -> AppResult<Option<CallConfig>> {
        let query = format!("SELECT {} FROM call_config WHERE id = 1", CONFIG_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, CallConfigRow>(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error loading call config: {}", e);
                AppError::Database(format!("Failed to load call config: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, update))]
    async fn update(
        &self,
        update: &CallConfigUpdate,
        updated_by: Option<Uuid>,
    ) -> AppResult<CallConfig> {
        let query = format!(
            r#"
            UPDATE call_config
            SET video_rate_standard = COALESCE($1, video_rate_standard),
                video_rate_gstar = COALESCE($2, video_rate_gstar),
                audio_rate_standard = COALESCE($3, audio_rate_standard),
                audio_rate_gstar = COALESCE($4, audio_rate_gstar),
                message_cost = COALESCE($5, message_cost),
                admin_commission_percent = COALESCE($6, admin_commission_percent),
                gstar_commission_percent = COALESCE($7, gstar_commission_percent),
                gicon_commission_percent = COALESCE($8, gicon_commission_percent),
                coin_to_currency_ratio = COALESCE($9, coin_to_currency_ratio),
                version = version + 1,
                updated_by = $10,
                updated_at = NOW()
            WHERE id = 1
            RETURNING {}
            "#,
            CONFIG_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallConfigRow>(&query)
            .bind(update.video_rate_standard)
            .bind(update.video_rate_gstar)
            .bind(update.audio_rate_standard)
            .bind(update.audio_rate_gstar)
            .bind(update.message_cost)
            .bind(update.admin_commission_percent)
            .bind(update.gstar_commission_percent)
            .bind(update.gicon_commission_percent)
            .bind(update.coin_to_currency_ratio)
            .bind(updated_by)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating call config: {}", e);
                AppError::Database(format!("Failed to update call config: {}", e))
            })?
            .ok_or(AppError::ConfigurationMissing)?;

        let config: CallConfig = row.into();
        info!("Call config updated to version {}", config.version);

        Ok(config)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallConfigRow {
    video_rate_standard: i64,
    video_rate_gstar: i64,
    audio_rate_standard: i64,
    audio_rate_gstar: i64,
    message_cost: i64,
    admin_commission_percent: Decimal,
    gstar_commission_percent: Decimal,
    gicon_commission_percent: Decimal,
    coin_to_currency_ratio: Decimal,
    version: i64,
    updated_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
}

impl From<CallConfigRow> for CallConfig {
    fn from(row: CallConfigRow) -> Self {
        Self {
            video_rate_standard: row.video_rate_standard,
            video_rate_gstar: row.video_rate_gstar,
            audio_rate_standard: row.audio_rate_standard,
            audio_rate_gstar: row.audio_rate_gstar,
            message_cost: row.message_cost,
            admin_commission_percent: row.admin_commission_percent,
            gstar_commission_percent: row.gstar_commission_percent,
            gicon_commission_percent: row.gicon_commission_percent,
            coin_to_currency_ratio: row.coin_to_currency_ratio,
            version: row.version,
            updated_by: row.updated_by,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_update_bumps_version() {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/coincall".to_string());
        let pool = crate::create_pool(&url, Some(2)).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();

        let repo = PgCallConfigRepository::new(pool);
        let before = repo.load().await.unwrap().expect("seeded config");

        let update = CallConfigUpdate {
            gstar_commission_percent: Some(dec!(18)),
            ..Default::default()
        };
        let after = repo.update(&update, None).await.unwrap();

        assert_eq!(after.version, before.version + 1);
        assert_eq!(after.gstar_commission_percent, dec!(18));
        assert_eq!(after.video_rate_standard, before.video_rate_standard);
    }
}
