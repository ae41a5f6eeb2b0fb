//! Redis caching layer for CoinCall
//!
//! Holds the pricing configuration snapshot so the call endpoints do not hit
//! PostgreSQL for every pricing decision.
//!
//! The snapshot lives in a hash with two fields, `version` and `payload`
//! (JSON). Writes go through a Lua script that compares versions atomically
//! on the server, so an older snapshot never replaces a newer one.
//!
//! # Example
//!
//! ```no_run
//! use coincall_cache::RedisPricingCache;
//! use coincall_core::traits::PricingCache;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = RedisPricingCache::new("redis://127.0.0.1:6379").await?;
//!
//!     if let Some(config) = cache.load().await? {
//!         println!("pricing version {}", config.version);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod keys;

use async_trait::async_trait;
use coincall_core::error::AppError;
use coincall_core::models::CallConfig;
use coincall_core::traits::PricingCache;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError, Script};
use tracing::{debug, error, warn};

/// Write the snapshot unless the cached version is newer.
///
/// KEYS[1] snapshot hash; ARGV[1] version, ARGV[2] payload, ARGV[3] ttl secs.
/// Returns 1 when written, 0 when a newer version was kept.
const STORE_SNAPSHOT_LUA: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if current and tonumber(current) > tonumber(ARGV[1]) then
    return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[1], 'payload', ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[3])
return 1
"#;

/// Redis-backed pricing snapshot cache
#[derive(Clone)]
pub struct RedisPricingCache {
    manager: ConnectionManager,
    key: String,
    store_script: Script,
}

impl RedisPricingCache {
    /// Connect to Redis
    ///
    /// # Errors
    ///
    /// Returns `AppError::CacheConnection` if the URL is invalid or the
    /// connection fails
    pub async fn new(url: &str) -> Result<Self, AppError> {
        debug!("Connecting to Redis at {}", url);

        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::CacheConnection(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            AppError::CacheConnection(format!("Connection failed: {}", e))
        })?;

        debug!("Redis connection established successfully");
        Ok(Self {
            manager,
            key: keys::call_config_key(),
            store_script: Script::new(STORE_SNAPSHOT_LUA),
        })
    }

    /// Ping the Redis server to check connectivity
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;
        Ok(())
    }

    fn map_redis_error(err: RedisError) -> AppError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                AppError::CacheConnection(format!("I/O error: {}", err))
            }
            redis::ErrorKind::TypeError => {
                warn!("Redis type error: {}", err);
                AppError::Cache(format!("Type mismatch: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                AppError::Cache(err.to_string())
            }
        }
    }
}

#[async_trait]
impl PricingCache for RedisPricingCache {
    async fn load(&self) -> Result<Option<CallConfig>, AppError> {
        let mut conn = self.manager.clone();

        let payload: Option<String> = conn
            .hget(&self.key, keys::PAYLOAD_FIELD)
            .await
            .map_err(Self::map_redis_error)?;

        match payload {
            Some(json) => {
                let config = serde_json::from_str::<CallConfig>(&json).map_err(|e| {
                    error!("Failed to deserialize pricing snapshot: {}", e);
                    AppError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                debug!("Pricing cache HIT (version {})", config.version);
                Ok(Some(config))
            }
            None => {
                debug!("Pricing cache MISS");
                Ok(None)
            }
        }
    }

    async fn store(&self, config: &CallConfig, ttl_secs: u64) -> Result<bool, AppError> {
        let payload = serde_json::to_string(config).map_err(|e| {
            error!("Failed to serialize pricing snapshot: {}", e);
            AppError::Serialization(format!("Serialization failed: {}", e))
        })?;

        let mut conn = self.manager.clone();
        let written: i32 = self
            .store_script
            .key(&self.key)
            .arg(config.version)
            .arg(payload)
            .arg(ttl_secs.max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_redis_error)?;

        if written == 1 {
            debug!("Cached pricing version {} (TTL {}s)", config.version, ttl_secs);
        } else {
            debug!(
                "Kept newer cached pricing over version {}",
                config.version
            );
        }

        Ok(written == 1)
    }
}
