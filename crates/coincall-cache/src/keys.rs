//! Cache key constants for CoinCall
//!
//! # Key Patterns
//!
//! - `call_config:v{schema}:current` - pricing snapshot hash with
//!   `version` and `payload` fields
//!
//! # Example
//!
//! ```
//! use coincall_cache::keys;
//!
//! assert_eq!(keys::call_config_key(), "call_config:v2:current");
//! ```

/// Prefix for the pricing snapshot
pub const CALL_CONFIG_PREFIX: &str = "call_config";

/// Layout version of the cached snapshot; bump when the stored shape changes
pub const CALL_CONFIG_SCHEMA: u32 = 2;

/// Hash field holding the JSON snapshot
pub const PAYLOAD_FIELD: &str = "payload";

/// Build the cache key for the current pricing snapshot
pub fn call_config_key() -> String {
    format!("{}:v{}:current", CALL_CONFIG_PREFIX, CALL_CONFIG_SCHEMA)
}
