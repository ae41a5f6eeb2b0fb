//! Call session models
//!
//! A call session is created when a call starts and is never deleted. It
//! freezes the pricing resolved at start time and carries the settlement
//! amounts once payment has been processed.

use super::call_config::ResolvedPricing;
use super::missed_call::MissedReason;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Video,
    Audio,
    /// Flat-priced message session billed as a single unit
    Message,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::Video => write!(f, "video"),
            CallType::Audio => write!(f, "audio"),
            CallType::Message => write!(f, "message"),
        }
    }
}

impl CallType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "video" => Some(CallType::Video),
            "audio" => Some(CallType::Audio),
            "message" => Some(CallType::Message),
            _ => None,
        }
    }

    /// Billed per elapsed minute rather than as a flat unit
    pub fn is_timed(&self) -> bool {
        !matches!(self, CallType::Message)
    }
}

/// Call session lifecycle status
///
/// `initiated -> connected -> ended`, with `failed` reachable from
/// `initiated` or `connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Initiated,
    Connected,
    Ended,
    Failed,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Initiated => write!(f, "initiated"),
            CallStatus::Connected => write!(f, "connected"),
            CallStatus::Ended => write!(f, "ended"),
            CallStatus::Failed => write!(f, "failed"),
        }
    }
}

impl CallStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "initiated" => Some(CallStatus::Initiated),
            "connected" => Some(CallStatus::Connected),
            "ended" => Some(CallStatus::Ended),
            "failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }

    /// Session still counts as an ongoing call
    pub fn is_active(&self) -> bool {
        matches!(self, CallStatus::Initiated | CallStatus::Connected)
    }
}

/// End reasons recorded by the server
pub mod end_reason {
    pub const COMPLETED: &str = "completed";
    pub const TIME_EXPIRED: &str = "time_expired";
    pub const PAYMENT_FAILED: &str = "payment_failed";
    pub const CONNECTION_FAILED: &str = "connection_failed";
    pub const MISSED: &str = "missed";
}

/// One call attempt between two users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallSession {
    pub id: Uuid,

    /// Caller-visible correlation key
    pub call_id: String,

    pub caller_user_id: Uuid,

    pub receiver_user_id: Uuid,

    pub call_type: CallType,

    /// Rate frozen at start time
    pub coins_per_minute: i64,

    /// Commission percentage frozen at start time
    pub commission_percent: Decimal,

    /// CallConfig version the pricing was resolved from
    pub pricing_version: i64,

    pub status: CallStatus,

    /// Authoritative server-assigned start
    pub start_time: DateTime<Utc>,

    pub connected_at: Option<DateTime<Utc>>,

    pub end_time: Option<DateTime<Utc>>,

    /// Ceiling computed from the caller's balance at start
    pub max_allowed_minutes: i64,

    pub duration_minutes: i64,

    pub coins_deducted: i64,

    pub coins_to_receiver: i64,

    pub admin_commission: i64,

    /// Settlement idempotency flag
    pub payment_processed: bool,

    pub end_reason: Option<String>,

    pub missed_reason: Option<MissedReason>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl CallSession {
    /// New `initiated` session starting now
    pub fn initiate(
        call_id: String,
        caller_user_id: Uuid,
        receiver_user_id: Uuid,
        call_type: CallType,
        pricing: &ResolvedPricing,
        max_allowed_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            call_id,
            caller_user_id,
            receiver_user_id,
            call_type,
            coins_per_minute: pricing.coins_per_minute,
            commission_percent: pricing.commission_percent,
            pricing_version: pricing.config_version,
            status: CallStatus::Initiated,
            start_time: now,
            connected_at: None,
            end_time: None,
            max_allowed_minutes,
            duration_minutes: 0,
            coins_deducted: 0,
            coins_to_receiver: 0,
            admin_commission: 0,
            payment_processed: false,
            end_reason: None,
            missed_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether a user is the caller or the receiver
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.caller_user_id == user_id || self.receiver_user_id == user_id
    }

    /// The other party from `user_id`'s point of view
    pub fn counterpart_of(&self, user_id: Uuid) -> Uuid {
        if self.caller_user_id == user_id {
            self.receiver_user_id
        } else {
            self.caller_user_id
        }
    }

    /// Seconds between start and `at`, never negative
    pub fn elapsed_seconds(&self, at: DateTime<Utc>) -> i64 {
        (at - self.start_time).num_seconds().max(0)
    }

    /// Whole elapsed minutes (floor) between start and `at`
    pub fn elapsed_minutes(&self, at: DateTime<Utc>) -> i64 {
        self.elapsed_seconds(at) / 60
    }

    /// Moment the bill is computed for: recorded end if any, otherwise `now`
    pub fn settlement_moment(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.end_time.unwrap_or(now)
    }

    /// Amounts stored by a completed settlement
    pub fn settlement(&self) -> SettlementSummary {
        SettlementSummary {
            duration_minutes: self.duration_minutes,
            coins_deducted: self.coins_deducted,
            coins_to_receiver: self.coins_to_receiver,
            admin_commission: self.admin_commission,
            payment_processed: self.payment_processed,
        }
    }
}

/// Computed amounts for settling one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettlementPlan {
    /// Billable minutes after cap and minimum
    pub duration_minutes: i64,

    /// Full price of the billable minutes
    pub coins_required: i64,

    /// What is actually taken from the caller (capped by balance)
    pub coins_deducted: i64,

    pub coins_to_receiver: i64,

    pub admin_commission: i64,

    /// Whether the receiver earns from this call
    pub monetized: bool,

    /// Moment the call is billed up to, stored as the session end
    pub ended_at: DateTime<Utc>,
}

impl SettlementPlan {
    /// Caller could not cover the full price
    pub fn is_partial(&self) -> bool {
        self.coins_deducted < self.coins_required
    }
}

/// Stored settlement amounts as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementSummary {
    pub duration_minutes: i64,
    pub coins_deducted: i64,
    pub coins_to_receiver: i64,
    pub admin_commission: i64,
    pub payment_processed: bool,
}

/// Outcome of a single settlement attempt
#[derive(Debug, Clone)]
pub enum SettleAttempt {
    /// This attempt applied the payment
    Settled(CallSession),
    /// Payment had already been applied; stored amounts are returned as-is
    AlreadySettled(CallSession),
    /// The session can never be billed (missed or declined call)
    NotSettleable(CallSession),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn pricing() -> ResolvedPricing {
        ResolvedPricing {
            coins_per_minute: 100,
            commission_percent: dec!(20),
            config_version: 3,
        }
    }

    #[test]
    fn test_initiate_freezes_pricing() {
        let caller = Uuid::new_v4();
        let receiver = Uuid::new_v4();
        let session =
            CallSession::initiate("call-1".into(), caller, receiver, CallType::Video, &pricing(), 10);

        assert_eq!(session.status, CallStatus::Initiated);
        assert_eq!(session.coins_per_minute, 100);
        assert_eq!(session.commission_percent, dec!(20));
        assert_eq!(session.pricing_version, 3);
        assert!(!session.payment_processed);
        assert!(session.is_participant(caller));
        assert!(session.is_participant(receiver));
        assert!(!session.is_participant(Uuid::new_v4()));
        assert_eq!(session.counterpart_of(caller), receiver);
        assert_eq!(session.counterpart_of(receiver), caller);
    }

    #[test]
    fn test_elapsed_is_clamped() {
        let session = CallSession::initiate(
            "call-2".into(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            CallType::Audio,
            &pricing(),
            5,
        );

        let before = session.start_time - Duration::seconds(30);
        assert_eq!(session.elapsed_seconds(before), 0);

        let later = session.start_time + Duration::seconds(150);
        assert_eq!(session.elapsed_seconds(later), 150);
        assert_eq!(session.elapsed_minutes(later), 2);
    }

    #[test]
    fn test_settlement_moment_prefers_recorded_end() {
        let mut session = CallSession::initiate(
            "call-3".into(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            CallType::Video,
            &pricing(),
            5,
        );
        let now = session.start_time + Duration::minutes(10);
        assert_eq!(session.settlement_moment(now), now);

        let ended = session.start_time + Duration::minutes(2);
        session.end_time = Some(ended);
        assert_eq!(session.settlement_moment(now), ended);
    }

    #[test]
    fn test_status_helpers() {
        assert!(CallStatus::Initiated.is_active());
        assert!(CallStatus::Connected.is_active());
        assert!(!CallStatus::Ended.is_active());
        assert_eq!(CallStatus::from_str("FAILED"), Some(CallStatus::Failed));
        assert_eq!(CallType::from_str("message"), Some(CallType::Message));
        assert!(!CallType::Message.is_timed());
        assert_eq!(CallType::from_str("fax"), None);
    }
}
