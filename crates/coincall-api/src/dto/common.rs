//! Common DTOs used across the API

use coincall_core::traits::{PaginatedResponse, Pagination};
use coincall_core::{AppError, AppResult};
use coincall_core::models::CallType;
use coincall_services::constants::DEFAULT_PAGE_SIZE;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Standard success envelope
///
/// The payload's fields are flattened next to `success`, so `T` must
/// serialize as a map.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true`; failures are rendered by `AppError`
    pub success: bool,

    /// Response payload
    #[serde(flatten)]
    pub data: T,

    /// Response message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    /// Create a success response with data and message
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: Some(message.into()),
        }
    }
}

/// Pagination query parameters
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaginationParams {
    /// Page number (1-indexed)
    #[serde(default = "default_page", deserialize_with = "deserialize_number_from_string")]
    #[validate(range(min = 1))]
    pub page: i64,

    /// Items per page
    #[serde(
        default = "default_limit",
        alias = "per_page",
        deserialize_with = "deserialize_number_from_string"
    )]
    #[validate(range(min = 1, max = 100))]
    pub limit: i64,
}

/// Deserialize a number from either a string or a number
fn deserialize_number_from_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct I64OrStringVisitor;

    impl<'de> Visitor<'de> for I64OrStringVisitor {
        type Value = i64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer or a string containing an integer")
        }

        fn visit_i64<E>(self, value: i64) -> Result<i64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<i64, E>
        where
            E: de::Error,
        {
            i64::try_from(value).map_err(de::Error::custom)
        }

        fn visit_str<E>(self, value: &str) -> Result<i64, E>
        where
            E: de::Error,
        {
            value.trim().parse::<i64>().map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_any(I64OrStringVisitor)
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PaginationParams {
    /// Validated repository pagination
    pub fn to_pagination(&self) -> AppResult<Pagination> {
        self.validate()?;
        Ok(Pagination::new(self.page, self.limit))
    }

    /// Create paginated response
    pub fn paginate<T>(pagination: &Pagination, data: Vec<T>, total: i64) -> PaginatedResponse<T> {
        PaginatedResponse::new(data, total, pagination)
    }
}

/// Parse a `callType` value
pub fn parse_call_type(raw: &str) -> AppResult<CallType> {
    CallType::from_str(raw.trim())
        .ok_or_else(|| AppError::InvalidInput(format!("Invalid call type: {}", raw)))
}
