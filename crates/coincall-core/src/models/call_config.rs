//! Call pricing configuration
//!
//! A single record holding per-minute rates and commission percentages.
//! Every admin update bumps `version` so cached snapshots can be told apart.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pricing snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallConfig {
    /// Video rate for standard receivers (coins per minute)
    pub video_rate_standard: i64,

    /// Video rate for gstar receivers (coins per minute)
    pub video_rate_gstar: i64,

    pub audio_rate_standard: i64,

    pub audio_rate_gstar: i64,

    /// Flat cost of a message session
    pub message_cost: i64,

    /// Commission for standard receivers (percent)
    pub admin_commission_percent: Decimal,

    pub gstar_commission_percent: Decimal,

    pub gicon_commission_percent: Decimal,

    /// Currency value of one coin
    pub coin_to_currency_ratio: Decimal,

    /// Bumped on every update
    pub version: i64,

    pub updated_by: Option<Uuid>,

    pub updated_at: DateTime<Utc>,
}

/// Partial admin update; absent fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallConfigUpdate {
    pub video_rate_standard: Option<i64>,
    pub video_rate_gstar: Option<i64>,
    pub audio_rate_standard: Option<i64>,
    pub audio_rate_gstar: Option<i64>,
    pub message_cost: Option<i64>,
    pub admin_commission_percent: Option<Decimal>,
    pub gstar_commission_percent: Option<Decimal>,
    pub gicon_commission_percent: Option<Decimal>,
    pub coin_to_currency_ratio: Option<Decimal>,
}

impl CallConfigUpdate {
    pub fn is_empty(&self) -> bool {
        *self == CallConfigUpdate::default()
    }
}

impl CallConfig {
    /// Apply an update and bump the version
    pub fn apply(&self, update: &CallConfigUpdate, updated_by: Option<Uuid>) -> CallConfig {
        CallConfig {
            video_rate_standard: update.video_rate_standard.unwrap_or(self.video_rate_standard),
            video_rate_gstar: update.video_rate_gstar.unwrap_or(self.video_rate_gstar),
            audio_rate_standard: update.audio_rate_standard.unwrap_or(self.audio_rate_standard),
            audio_rate_gstar: update.audio_rate_gstar.unwrap_or(self.audio_rate_gstar),
            message_cost: update.message_cost.unwrap_or(self.message_cost),
            admin_commission_percent: update
                .admin_commission_percent
                .unwrap_or(self.admin_commission_percent),
            gstar_commission_percent: update
                .gstar_commission_percent
                .unwrap_or(self.gstar_commission_percent),
            gicon_commission_percent: update
                .gicon_commission_percent
                .unwrap_or(self.gicon_commission_percent),
            coin_to_currency_ratio: update
                .coin_to_currency_ratio
                .unwrap_or(self.coin_to_currency_ratio),
            version: self.version + 1,
            updated_by,
            updated_at: Utc::now(),
        }
    }
}

/// Pricing resolved for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPricing {
    pub coins_per_minute: i64,
    pub commission_percent: Decimal,
    /// Version of the snapshot the pricing came from
    pub config_version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> CallConfig {
        CallConfig {
            video_rate_standard: 100,
            video_rate_gstar: 150,
            audio_rate_standard: 60,
            audio_rate_gstar: 90,
            message_cost: 10,
            admin_commission_percent: dec!(20),
            gstar_commission_percent: dec!(15),
            gicon_commission_percent: dec!(10),
            coin_to_currency_ratio: dec!(0.01),
            version: 4,
            updated_by: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_bumps_version_and_keeps_untouched_fields() {
        let admin = Uuid::new_v4();
        let update = CallConfigUpdate {
            video_rate_gstar: Some(200),
            gicon_commission_percent: Some(dec!(12.5)),
            ..Default::default()
        };

        let next = config().apply(&update, Some(admin));
        assert_eq!(next.version, 5);
        assert_eq!(next.video_rate_gstar, 200);
        assert_eq!(next.video_rate_standard, 100);
        assert_eq!(next.gicon_commission_percent, dec!(12.5));
        assert_eq!(next.updated_by, Some(admin));
    }

    #[test]
    fn test_empty_update() {
        assert!(CallConfigUpdate::default().is_empty());
        let update = CallConfigUpdate {
            message_cost: Some(5),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
