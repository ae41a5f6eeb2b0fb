//! Pricing configuration DTOs

use chrono::{DateTime, Utc};
use coincall_core::models::{CallConfig, CallConfigUpdate};
use coincall_core::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Current pricing snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallConfigResponse {
    pub video_rate_standard: i64,
    pub video_rate_gstar: i64,
    pub audio_rate_standard: i64,
    pub audio_rate_gstar: i64,
    pub message_cost: i64,
    pub admin_commission_percent: Decimal,
    pub gstar_commission_percent: Decimal,
    pub gicon_commission_percent: Decimal,
    pub coin_to_currency_ratio: Decimal,
    pub version: i64,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl From<CallConfig> for CallConfigResponse {
    fn from(c: CallConfig) -> Self {
        Self {
            video_rate_standard: c.video_rate_standard,
            video_rate_gstar: c.video_rate_gstar,
            audio_rate_standard: c.audio_rate_standard,
            audio_rate_gstar: c.audio_rate_gstar,
            message_cost: c.message_cost,
            admin_commission_percent: c.admin_commission_percent,
            gstar_commission_percent: c.gstar_commission_percent,
            gicon_commission_percent: c.gicon_commission_percent,
            coin_to_currency_ratio: c.coin_to_currency_ratio,
            version: c.version,
            updated_by: c.updated_by,
            updated_at: c.updated_at,
        }
    }
}

/// Partial pricing update
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCallConfigRequest {
    #[validate(range(min = 1))]
    pub video_rate_standard: Option<i64>,

    #[validate(range(min = 1))]
    pub video_rate_gstar: Option<i64>,

    #[validate(range(min = 1))]
    pub audio_rate_standard: Option<i64>,

    #[validate(range(min = 1))]
    pub audio_rate_gstar: Option<i64>,

    #[validate(range(min = 1))]
    pub message_cost: Option<i64>,

    pub admin_commission_percent: Option<Decimal>,
    pub gstar_commission_percent: Option<Decimal>,
    pub gicon_commission_percent: Option<Decimal>,
    pub coin_to_currency_ratio: Option<Decimal>,
}

fn check_percent(name: &str, value: Option<Decimal>) -> AppResult<()> {
    match value {
        Some(v) if v < Decimal::ZERO || v > Decimal::ONE_HUNDRED => Err(AppError::Validation(
            format!("{} must be between 0 and 100", name),
        )),
        _ => Ok(()),
    }
}

impl UpdateCallConfigRequest {
    /// Validate and convert to a repository update
    ///
    /// Decimal fields are checked here since `validator` ranges only cover
    /// primitive numbers.
    pub fn to_update(&self) -> AppResult<CallConfigUpdate> {
        self.validate()?;

        check_percent("adminCommissionPercent", self.admin_commission_percent)?;
        check_percent("gstarCommissionPercent", self.gstar_commission_percent)?;
        check_percent("giconCommissionPercent", self.gicon_commission_percent)?;

        if matches!(self.coin_to_currency_ratio, Some(r) if r <= Decimal::ZERO) {
            return Err(AppError::Validation(
                "coinToCurrencyRatio must be positive".to_string(),
            ));
        }

        let update = CallConfigUpdate {
            video_rate_standard: self.video_rate_standard,
            video_rate_gstar: self.video_rate_gstar,
            audio_rate_standard: self.audio_rate_standard,
            audio_rate_gstar: self.audio_rate_gstar,
            message_cost: self.message_cost,
            admin_commission_percent: self.admin_commission_percent,
            gstar_commission_percent: self.gstar_commission_percent,
            gicon_commission_percent: self.gicon_commission_percent,
            coin_to_currency_ratio: self.coin_to_currency_ratio,
        };

        if update.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        Ok(update)
    }
}
