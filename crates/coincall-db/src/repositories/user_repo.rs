//! User repository implementation
//!
//! Read-only access to the user attributes calling and billing depend on.

use coincall_core::{
    models::{Gender, User, UserRole, UserStatus, UserTier},
    traits::UserRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of UserRepository
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse user role from string
    fn parse_role(s: &str) -> UserRole {
        UserRole::from_str(s).unwrap_or(UserRole::User)
    }

    /// Parse gender from string
    fn parse_gender(s: &str) -> Gender {
        Gender::from_str(s).unwrap_or(Gender::Other)
    }

    /// Parse status from string; unknown values are treated as blocked
    fn parse_status(s: &str) -> UserStatus {
        UserStatus::from_str(s).unwrap_or(UserStatus::Blocked)
    }
}

const USER_COLUMNS: &str = r#"
    id, phone, display_name, avatar_url,
    gender, tier, role, status,
    is_online, do_not_disturb,
    created_at, updated_at
"#;

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        debug!("Finding user by id: {}", id);

        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        let result = sqlx::query_as::<sqlx::Postgres, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding user {}: {}", id, e);
                AppError::Database(format!("Failed to find user: {}", e))
            })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_many(&self, ids: &[Uuid]) -> AppResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!("SELECT {} FROM users WHERE id = ANY($1)", USER_COLUMNS);

        let rows = sqlx::query_as::<sqlx::Postgres, UserRow>(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error loading users: {}", e);
                AppError::Database(format!("Failed to load users: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    phone: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    gender: String,
    tier: String,
    role: String,
    status: String,
    is_online: bool,
    do_not_disturb: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            phone: row.phone,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            gender: PgUserRepository::parse_gender(&row.gender),
            tier: UserTier::from_str(&row.tier),
            role: PgUserRepository::parse_role(&row.role),
            status: PgUserRepository::parse_status(&row.status),
            is_online: row.is_online,
            do_not_disturb: row.do_not_disturb,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role() {
        assert_eq!(PgUserRepository::parse_role("admin"), UserRole::Admin);
        assert_eq!(PgUserRepository::parse_role("user"), UserRole::User);
        assert_eq!(PgUserRepository::parse_role("invalid"), UserRole::User);
    }

    #[test]
    fn test_unknown_status_is_blocked() {
        assert_eq!(PgUserRepository::parse_status("active"), UserStatus::Active);
        assert_eq!(PgUserRepository::parse_status("suspended"), UserStatus::Blocked);
    }

    #[test]
    fn test_row_conversion() {
        let row = UserRow {
            id: Uuid::new_v4(),
            phone: "+15550001111".into(),
            display_name: Some("Ana".into()),
            avatar_url: None,
            gender: "female".into(),
            tier: "gstar".into(),
            role: "user".into(),
            status: "active".into(),
            is_online: true,
            do_not_disturb: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let user: User = row.into();
        assert_eq!(user.gender, Gender::Female);
        assert_eq!(user.tier, UserTier::Gstar);
        assert!(user.is_online);
    }
}
