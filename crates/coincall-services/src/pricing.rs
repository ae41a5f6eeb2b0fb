//! Pricing resolution
//!
//! `PricingResolver` is a pure function over a `CallConfig` snapshot.
//! `CallConfigProvider` supplies that snapshot from PostgreSQL with an
//! optional Redis cache in front of it.

use coincall_core::{
    models::{CallConfig, CallConfigUpdate, CallType, ResolvedPricing, UserTier},
    traits::{CallConfigRepository, CallConfigSource, PricingCache},
    AppError, AppResult,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::constants::MESSAGE_BILLED_MINUTES;

/// Pricing rules
pub struct PricingResolver;

impl PricingResolver {
    /// Resolve rate and commission for a call to a receiver of `tier`
    ///
    /// Video and audio use the gstar rate only for gstar receivers. Message
    /// sessions cost the flat message price. Commission follows the
    /// receiver tier, with the admin percentage for everyone else.
    pub fn resolve(config: &CallConfig, call_type: CallType, tier: UserTier) -> ResolvedPricing {
        let coins_per_minute = match (call_type, tier) {
            (CallType::Video, UserTier::Gstar) => config.video_rate_gstar,
            (CallType::Video, _) => config.video_rate_standard,
            (CallType::Audio, UserTier::Gstar) => config.audio_rate_gstar,
            (CallType::Audio, _) => config.audio_rate_standard,
            (CallType::Message, _) => config.message_cost,
        };

        let commission_percent = match tier {
            UserTier::Gstar => config.gstar_commission_percent,
            UserTier::Gicon => config.gicon_commission_percent,
            UserTier::Standard => config.admin_commission_percent,
        };

        ResolvedPricing {
            coins_per_minute,
            commission_percent,
            config_version: config.version,
        }
    }

    /// Minutes the caller can afford at start time
    pub fn max_allowed_minutes(call_type: CallType, balance: i64, coins_per_minute: i64) -> i64 {
        if !call_type.is_timed() {
            return MESSAGE_BILLED_MINUTES;
        }
        if coins_per_minute <= 0 {
            return 0;
        }
        balance.max(0) / coins_per_minute
    }
}

/// Pricing snapshot provider with a shared cache in front of PostgreSQL
///
/// Cache errors are logged and fall through to the database; pricing never
/// fails because Redis is unavailable.
pub struct CallConfigProvider<R: CallConfigRepository> {
    repo: Arc<R>,
    cache: Option<Arc<dyn PricingCache>>,
    ttl_secs: u64,
}

impl<R: CallConfigRepository> CallConfigProvider<R> {
    /// Create a new provider; pass `None` to read straight from the database
    pub fn new(repo: Arc<R>, cache: Option<Arc<dyn PricingCache>>, ttl_secs: u64) -> Self {
        Self {
            repo,
            cache,
            ttl_secs,
        }
    }

    async fn get_from_cache(&self) -> Option<CallConfig> {
        let cache = self.cache.as_ref()?;

        match cache.load().await {
            Ok(config) => config,
            Err(e) => {
                warn!("Call config cache error: {}", e);
                None
            }
        }
    }

    async fn store_in_cache(&self, config: &CallConfig) {
        let Some(cache) = &self.cache else {
            return;
        };

        match cache.store(config, self.ttl_secs).await {
            Ok(true) => debug!("Cached call config version {}", config.version),
            Ok(false) => debug!(
                "Newer call config already cached, skipped version {}",
                config.version
            ),
            Err(e) => warn!("Failed to cache call config version {}: {}", config.version, e),
        }
    }
}

#[async_trait]
impl<R: CallConfigRepository> CallConfigSource for CallConfigProvider<R> {
    #[instrument(skip(self))]
    async fn current(&self) -> AppResult<CallConfig> {
        if let Some(config) = self.get_from_cache().await {
            return Ok(config);
        }

        let config = self
            .repo
            .load()
            .await?
            .ok_or(AppError::ConfigurationMissing)?;

        self.store_in_cache(&config).await;

        Ok(config)
    }

    #[instrument(skip(self, update))]
    async fn update(
        &self,
        update: &CallConfigUpdate,
        updated_by: Option<Uuid>,
    ) -> AppResult<CallConfig> {
        if update.is_empty() {
            return Err(AppError::Validation(
                "Update must change at least one field".to_string(),
            ));
        }

        let config = self.repo.update(update, updated_by).await?;

        // Overwrite rather than delete so readers never see a gap; the
        // version guard keeps slower readers from restoring the old row
        self.store_in_cache(&config).await;

        info!(
            version = config.version,
            updated_by = ?updated_by,
            "Call pricing updated"
        );

        Ok(config)
    }
}
