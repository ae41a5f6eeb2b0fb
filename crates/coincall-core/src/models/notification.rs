//! Outbound call events
//!
//! Events are handed to a `Notifier` after the triggering write has
//! committed. Delivery is best-effort.

use super::call_session::{CallSession, CallType};
use super::missed_call::{MissedCall, MissedReason};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEventKind {
    /// A new call is ringing
    Incoming,
    Connected,
    /// Call ended and was settled
    Ended,
    Missed,
}

impl fmt::Display for CallEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallEventKind::Incoming => write!(f, "incoming"),
            CallEventKind::Connected => write!(f, "connected"),
            CallEventKind::Ended => write!(f, "ended"),
            CallEventKind::Missed => write!(f, "missed"),
        }
    }
}

/// Notification payload for one call event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub kind: CallEventKind,
    pub call_id: String,
    pub call_type: CallType,
    pub caller_user_id: Uuid,
    pub receiver_user_id: Uuid,

    /// Users the event is addressed to
    pub recipients: Vec<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub coins_deducted: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub coins_to_receiver: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub missed_reason: Option<MissedReason>,

    pub occurred_at: DateTime<Utc>,
}

impl CallEvent {
    fn base(kind: CallEventKind, session: &CallSession, recipients: Vec<Uuid>) -> Self {
        Self {
            kind,
            call_id: session.call_id.clone(),
            call_type: session.call_type,
            caller_user_id: session.caller_user_id,
            receiver_user_id: session.receiver_user_id,
            recipients,
            duration_minutes: None,
            coins_deducted: None,
            coins_to_receiver: None,
            missed_reason: None,
            occurred_at: Utc::now(),
        }
    }

    /// Both parties
    pub fn incoming(session: &CallSession) -> Self {
        Self::base(
            CallEventKind::Incoming,
            session,
            vec![session.receiver_user_id, session.caller_user_id],
        )
    }

    /// Both parties
    pub fn connected(session: &CallSession) -> Self {
        Self::base(
            CallEventKind::Connected,
            session,
            vec![session.caller_user_id, session.receiver_user_id],
        )
    }

    /// Both parties, with final amounts
    pub fn ended(session: &CallSession) -> Self {
        let mut event = Self::base(
            CallEventKind::Ended,
            session,
            vec![session.caller_user_id, session.receiver_user_id],
        );
        event.duration_minutes = Some(session.duration_minutes);
        event.coins_deducted = Some(session.coins_deducted);
        event.coins_to_receiver = Some(session.coins_to_receiver);
        event
    }

    /// Receiver only
    pub fn missed(missed: &MissedCall) -> Self {
        Self {
            kind: CallEventKind::Missed,
            call_id: missed.call_id.clone(),
            call_type: missed.call_type,
            caller_user_id: missed.caller_user_id,
            receiver_user_id: missed.receiver_user_id,
            recipients: vec![missed.receiver_user_id],
            duration_minutes: None,
            coins_deducted: None,
            coins_to_receiver: None,
            missed_reason: Some(missed.missed_reason),
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missed_event_targets_receiver() {
        let receiver = Uuid::new_v4();
        let missed = MissedCall::new(
            "call-1".into(),
            Uuid::new_v4(),
            receiver,
            CallType::Video,
            Utc::now(),
            MissedReason::Dnd,
        );

        let event = CallEvent::missed(&missed);
        assert_eq!(event.kind, CallEventKind::Missed);
        assert_eq!(event.recipients, vec![receiver]);
        assert_eq!(event.missed_reason, Some(MissedReason::Dnd));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["missedReason"], "dnd");
        assert!(json.get("coinsDeducted").is_none());
    }
}
