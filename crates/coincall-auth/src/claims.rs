//! JWT Claims structure
//!
//! Defines the claims structure used in JWT tokens for authentication.

use chrono::{Duration, Utc};
use coincall_core::error::AppError;
use coincall_core::models::UserRole;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT Claims
///
/// Standard claims used in JWT tokens for user authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (user UUID)
    pub sub: String,

    /// User role
    #[serde(default)]
    pub role: UserRole,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create new claims for a user; expiration is filled in by `JwtService`
    ///
    /// # Examples
    ///
    /// ```
    /// use coincall_auth::Claims;
    /// use coincall_core::models::UserRole;
    /// use uuid::Uuid;
    ///
    /// let id = Uuid::new_v4();
    /// let claims = Claims::new(id, UserRole::User);
    /// assert_eq!(claims.user_id().unwrap(), id);
    /// ```
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self {
            sub: user_id.to_string(),
            role,
            iat: Utc::now().timestamp(),
            exp: 0,
        }
    }

    /// Create new claims with custom expiration duration
    pub fn with_expiration(user_id: Uuid, role: UserRole, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::seconds(expires_in_secs);

        Self {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }

    /// Parse the subject as a user id
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::InvalidToken("Subject is not a user id".to_string()))
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.exp < Utc::now().timestamp()
    }

    /// Check if the user has admin privileges
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
