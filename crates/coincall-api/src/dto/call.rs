//! Call DTOs
//!
//! Request and response types for the call endpoints. All bodies use
//! camelCase field names.

use super::common::parse_call_type;
use chrono::{DateTime, Utc};
use coincall_core::models::{
    CallSession, CallStatus, CallType, MissedCall, MissedReason, UserSummary,
};
use coincall_core::{AppError, AppResult};
use coincall_services::{CallRecord, EndOutcome, RequestedStatus, StatusUpdate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Body of `check-feasibility` and `start`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CallTargetRequest {
    /// User being called
    pub receiver_user_id: Uuid,

    /// video, audio or message
    #[validate(length(min = 1, max = 16, message = "callType is required"))]
    pub call_type: String,
}

impl CallTargetRequest {
    pub fn call_type(&self) -> AppResult<CallType> {
        parse_call_type(&self.call_type)
    }
}

/// Body of `check-time`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckTimeRequest {
    #[validate(length(min = 1, max = 64, message = "callId is required"))]
    pub call_id: String,
}

/// Body of `end`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EndCallRequest {
    #[validate(length(min = 1, max = 64, message = "callId is required"))]
    pub call_id: String,

    /// Accepted for compatibility; billing always uses server time
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

/// Body of the status update endpoints
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    /// connected, ended, failed or missed
    #[validate(length(min = 1, max = 16, message = "status is required"))]
    pub status: String,

    /// Required for failed and missed
    pub missed_reason: Option<String>,

    #[validate(length(max = 64))]
    pub end_reason: Option<String>,
}

impl UpdateStatusRequest {
    /// Convert to a service update, rejecting unknown values
    pub fn to_update(&self) -> AppResult<StatusUpdate> {
        let status = RequestedStatus::from_str(self.status.trim()).ok_or_else(|| {
            AppError::InvalidInput(format!("Invalid status: {}", self.status))
        })?;

        let missed_reason = self
            .missed_reason
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(|r| {
                MissedReason::from_str(r.trim())
                    .ok_or_else(|| AppError::InvalidInput(format!("Invalid missedReason: {}", r)))
            })
            .transpose()?;

        Ok(StatusUpdate {
            status,
            missed_reason,
            end_reason: self
                .end_reason
                .clone()
                .filter(|r| !r.trim().is_empty()),
        })
    }
}

/// Query filters for call history
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHistoryParams {
    pub call_type: Option<String>,
    pub status: Option<String>,
}

/// Call session as returned to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSessionDto {
    pub call_id: String,
    pub caller_user_id: Uuid,
    pub receiver_user_id: Uuid,
    pub call_type: CallType,
    pub coins_per_minute: i64,
    pub status: CallStatus,
    pub start_time: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub max_allowed_minutes: i64,
    pub duration_minutes: i64,
    pub coins_deducted: i64,
    pub coins_to_receiver: i64,
    pub admin_commission: i64,
    pub payment_processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missed_reason: Option<MissedReason>,
    pub created_at: DateTime<Utc>,
}

impl From<CallSession> for CallSessionDto {
    fn from(s: CallSession) -> Self {
        Self {
            call_id: s.call_id,
            caller_user_id: s.caller_user_id,
            receiver_user_id: s.receiver_user_id,
            call_type: s.call_type,
            coins_per_minute: s.coins_per_minute,
            status: s.status,
            start_time: s.start_time,
            connected_at: s.connected_at,
            end_time: s.end_time,
            max_allowed_minutes: s.max_allowed_minutes,
            duration_minutes: s.duration_minutes,
            coins_deducted: s.coins_deducted,
            coins_to_receiver: s.coins_to_receiver,
            admin_commission: s.admin_commission,
            payment_processed: s.payment_processed,
            end_reason: s.end_reason,
            missed_reason: s.missed_reason,
            created_at: s.created_at,
        }
    }
}

/// Missed call as returned to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissedCallDto {
    pub call_id: String,
    pub caller_user_id: Uuid,
    pub receiver_user_id: Uuid,
    pub call_type: CallType,
    pub initiated_at: DateTime<Utc>,
    pub missed_reason: MissedReason,
    pub notification_sent: bool,
    pub viewed: bool,
}

impl From<MissedCall> for MissedCallDto {
    fn from(m: MissedCall) -> Self {
        Self {
            call_id: m.call_id,
            caller_user_id: m.caller_user_id,
            receiver_user_id: m.receiver_user_id,
            call_type: m.call_type,
            initiated_at: m.initiated_at,
            missed_reason: m.missed_reason,
            notification_sent: m.notification_sent,
            viewed: m.viewed,
        }
    }
}

/// Single missed call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissedCallResponse {
    pub missed_call: MissedCallDto,
}

/// Successful `start`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCallResponse {
    pub call_id: String,
    pub call_session: CallSessionDto,
}

impl From<CallSession> for StartCallResponse {
    fn from(session: CallSession) -> Self {
        Self {
            call_id: session.call_id.clone(),
            call_session: session.into(),
        }
    }
}

/// `start` against an unreachable receiver
///
/// Rendered as a normal 200 response with `success: false`; nothing was
/// billed and no session exists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverUnavailableResponse {
    pub success: bool,
    pub reason: &'static str,
    pub can_make_call: bool,
    pub message: String,
    pub missed_call: MissedCallDto,
}

impl From<MissedCall> for ReceiverUnavailableResponse {
    fn from(missed: MissedCall) -> Self {
        Self {
            success: false,
            reason: "receiver_unavailable",
            can_make_call: false,
            message: format!("Receiver is unavailable ({})", missed.missed_reason),
            missed_call: missed.into(),
        }
    }
}

/// Result of a status update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusResponse {
    pub call_session: CallSessionDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missed_call: Option<MissedCallDto>,
}

/// Settlement result of `end`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndCallResponse {
    pub call_id: String,
    pub duration_minutes: i64,
    pub coins_deducted: i64,
    pub coins_to_receiver: i64,
    pub admin_commission: i64,
    pub payment_processed: bool,
    pub call_ended: bool,
    pub already_settled: bool,
}

impl From<&EndOutcome> for EndCallResponse {
    fn from(outcome: &EndOutcome) -> Self {
        let summary = outcome.summary();
        Self {
            call_id: outcome.session.call_id.clone(),
            duration_minutes: summary.duration_minutes,
            coins_deducted: summary.coins_deducted,
            coins_to_receiver: summary.coins_to_receiver,
            admin_commission: summary.admin_commission,
            payment_processed: summary.payment_processed,
            call_ended: outcome.call_ended(),
            already_settled: outcome.already_settled,
        }
    }
}

/// A history entry from the requesting user's point of view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecordDto {
    #[serde(flatten)]
    pub session: CallSessionDto,
    pub is_outgoing: bool,
    pub other_user: Option<UserSummary>,
}

impl From<CallRecord> for CallRecordDto {
    fn from(record: CallRecord) -> Self {
        Self {
            session: record.session.into(),
            is_outgoing: record.is_outgoing,
            other_user: record.counterpart,
        }
    }
}

/// Sessions still in progress
#[derive(Debug, Clone, Serialize)]
pub struct ActiveCallsResponse {
    pub calls: Vec<CallRecordDto>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use coincall_core::models::ResolvedPricing;
    use rust_decimal_macros::dec;

    fn session() -> CallSession {
        CallSession::initiate(
            "call-1".into(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            CallType::Video,
            &ResolvedPricing {
                coins_per_minute: 100,
                commission_percent: dec!(20),
                config_version: 1,
            },
            10,
        )
    }

    #[test]
    fn test_call_target_request_validation() {
        let req = CallTargetRequest {
            receiver_user_id: Uuid::new_v4(),
            call_type: String::new(),
        };
        assert!(req.validate().is_err());

        let req = CallTargetRequest {
            receiver_user_id: Uuid::new_v4(),
            call_type: "video".to_string(),
        };
        assert!(req.validate().is_ok());
        assert_eq!(req.call_type().unwrap(), CallType::Video);
    }

    #[test]
    fn test_update_status_conversion() {
        let req = UpdateStatusRequest {
            status: "missed".to_string(),
            missed_reason: Some("no_answer".to_string()),
            end_reason: Some(" ".to_string()),
        };
        let update = req.to_update().unwrap();
        assert_eq!(update.status, RequestedStatus::Missed);
        assert_eq!(update.missed_reason, Some(MissedReason::NoAnswer));
        assert_eq!(update.end_reason, None);

        let req = UpdateStatusRequest {
            status: "paused".to_string(),
            missed_reason: None,
            end_reason: None,
        };
        assert!(matches!(req.to_update(), Err(AppError::InvalidInput(_))));

        let req = UpdateStatusRequest {
            status: "failed".to_string(),
            missed_reason: Some("asleep".to_string()),
            end_reason: None,
        };
        assert!(matches!(req.to_update(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_end_request_accepts_client_duration() {
        let req: EndCallRequest =
            serde_json::from_str(r#"{"callId":"call-1","durationMinutes":99}"#).unwrap();
        assert_eq!(req.call_id, "call-1");
        assert_eq!(req.duration_minutes, Some(99));
    }

    #[test]
    fn test_session_dto_is_camel_case() {
        let body = serde_json::to_value(StartCallResponse::from(session())).unwrap();
        assert_eq!(body["callId"], "call-1");
        assert_eq!(body["callSession"]["coinsPerMinute"], 100);
        assert_eq!(body["callSession"]["status"], "initiated");
        assert!(body["callSession"].get("endReason").is_none());
    }

    #[test]
    fn test_receiver_unavailable_shape() {
        let s = session();
        let missed = MissedCall::new(
            s.call_id.clone(),
            s.caller_user_id,
            s.receiver_user_id,
            CallType::Video,
            Utc::now(),
            MissedReason::Offline,
        );
        let body = serde_json::to_value(ReceiverUnavailableResponse::from(missed)).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["reason"], "receiver_unavailable");
        assert_eq!(body["canMakeCall"], false);
        assert_eq!(body["missedCall"]["missedReason"], "offline");
    }
}
