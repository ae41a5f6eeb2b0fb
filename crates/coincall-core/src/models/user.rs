//! User model
//!
//! The subset of an app user that calling and billing depend on: identity,
//! monetization attributes (gender, tier) and reachability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User role enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular app user
    #[default]
    User,
    /// Platform administrator
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl UserRole {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(UserRole::User),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }

    /// Check if role has admin privileges
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// Gender as declared in the user profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
            Gender::Other => write!(f, "other"),
        }
    }
}

impl Gender {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// Receiver tier, drives per-minute pricing and commission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    #[default]
    Standard,
    Gstar,
    Gicon,
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserTier::Standard => write!(f, "standard"),
            UserTier::Gstar => write!(f, "gstar"),
            UserTier::Gicon => write!(f, "gicon"),
        }
    }
}

impl UserTier {
    /// Parse from string; unknown or empty values fall back to standard
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gstar" => UserTier::Gstar,
            "gicon" => UserTier::Gicon,
            _ => UserTier::Standard,
        }
    }
}

/// Account moderation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Blocked,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl UserStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(UserStatus::Active),
            "blocked" => Some(UserStatus::Blocked),
            _ => None,
        }
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,

    /// Verified phone number (login identity)
    pub phone: String,

    /// Public display name
    pub display_name: Option<String>,

    /// Profile picture URL
    pub avatar_url: Option<String>,

    pub gender: Gender,

    pub tier: UserTier,

    pub role: UserRole,

    pub status: UserStatus,

    /// Presence flag maintained by the realtime layer
    pub is_online: bool,

    /// Do-not-disturb toggle
    pub do_not_disturb: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Check whether the account is blocked by moderation
    pub fn is_blocked(&self) -> bool {
        self.status == UserStatus::Blocked
    }

    /// Name shown to the other party, falling back to the phone number
    pub fn public_name(&self) -> String {
        self.display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.phone.clone())
    }

    /// Public-safe summary of this user
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            display_name: self.public_name(),
            avatar_url: self.avatar_url.clone(),
            gender: self.gender,
            tier: self.tier,
            is_online: self.is_online,
        }
    }
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            phone: String::new(),
            display_name: None,
            avatar_url: None,
            gender: Gender::Other,
            tier: UserTier::Standard,
            role: UserRole::User,
            status: UserStatus::Active,
            is_online: false,
            do_not_disturb: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// Counterpart information attached to call records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub gender: Gender,
    pub tier: UserTier,
    pub is_online: bool,
}
