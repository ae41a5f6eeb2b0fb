//! Missed call records

use super::call_session::{CallSession, CallType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Why a call never connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedReason {
    NoAnswer,
    Declined,
    Busy,
    Offline,
    Timeout,
    /// Receiver account is not usable (blocked)
    Inactive,
    /// Receiver has do-not-disturb enabled
    Dnd,
}

impl fmt::Display for MissedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MissedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissedReason::NoAnswer => "no_answer",
            MissedReason::Declined => "declined",
            MissedReason::Busy => "busy",
            MissedReason::Offline => "offline",
            MissedReason::Timeout => "timeout",
            MissedReason::Inactive => "inactive",
            MissedReason::Dnd => "dnd",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "no_answer" => Some(MissedReason::NoAnswer),
            "declined" => Some(MissedReason::Declined),
            "busy" => Some(MissedReason::Busy),
            "offline" => Some(MissedReason::Offline),
            "timeout" => Some(MissedReason::Timeout),
            "inactive" => Some(MissedReason::Inactive),
            "dnd" => Some(MissedReason::Dnd),
            _ => None,
        }
    }
}

/// A call that never connected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissedCall {
    pub id: Uuid,
    pub call_id: String,
    pub caller_user_id: Uuid,
    pub receiver_user_id: Uuid,
    pub call_type: CallType,
    pub initiated_at: DateTime<Utc>,
    pub missed_reason: MissedReason,
    pub notification_sent: bool,
    pub viewed: bool,
    pub created_at: DateTime<Utc>,
}

impl MissedCall {
    pub fn new(
        call_id: String,
        caller_user_id: Uuid,
        receiver_user_id: Uuid,
        call_type: CallType,
        initiated_at: DateTime<Utc>,
        missed_reason: MissedReason,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            call_id,
            caller_user_id,
            receiver_user_id,
            call_type,
            initiated_at,
            missed_reason,
            notification_sent: false,
            viewed: false,
            created_at: Utc::now(),
        }
    }

    /// Missed call for an existing session
    pub fn for_session(session: &CallSession, reason: MissedReason) -> Self {
        Self::new(
            session.call_id.clone(),
            session.caller_user_id,
            session.receiver_user_id,
            session.call_type,
            session.start_time,
            reason,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_round_trip_names() {
        assert_eq!(MissedReason::from_str("no_answer"), Some(MissedReason::NoAnswer));
        assert_eq!(MissedReason::from_str("DND"), Some(MissedReason::Dnd));
        assert_eq!(MissedReason::Offline.to_string(), "offline");
        assert_eq!(MissedReason::from_str("asleep"), None);
    }

    #[test]
    fn test_new_missed_call_is_unread() {
        let missed = MissedCall::new(
            "call-1".into(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            CallType::Audio,
            Utc::now(),
            MissedReason::Offline,
        );
        assert!(!missed.viewed);
        assert!(!missed.notification_sent);
    }
}
