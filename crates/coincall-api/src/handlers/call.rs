//! Call handlers
//!
//! HTTP handlers for the call lifecycle: feasibility, start, time checks,
//! status reports, settlement and history. The authenticated user is always
//! the acting participant.

use crate::dto::call::{
    ActiveCallsResponse, CallHistoryParams, CallRecordDto, CallStatusResponse, CallTargetRequest,
    CheckTimeRequest, EndCallRequest, EndCallResponse, MissedCallDto, MissedCallResponse,
    ReceiverUnavailableResponse, StartCallResponse, UpdateStatusRequest,
};
use crate::dto::wallet::WalletTransactionDto;
use crate::dto::{parse_call_type, ApiResponse, PaginationParams};
use actix_web::{web, HttpResponse};
use coincall_auth::AuthenticatedUser;
use coincall_core::models::CallStatus;
use coincall_core::traits::CallHistoryFilter;
use coincall_core::AppError;
use coincall_services::{CallService, StartOutcome, StatusOutcome};
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Check whether a call could be started right now
///
/// POST /api/v1/call/check-feasibility
#[instrument(skip(service, user, req), fields(user_id = %user.user_id))]
pub async fn check_feasibility(
    service: web::Data<CallService>,
    user: AuthenticatedUser,
    req: web::Json<CallTargetRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Feasibility validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;
    let call_type = req.call_type()?;

    let feasibility = service
        .check_feasibility(user.user_id, req.receiver_user_id, call_type)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(feasibility)))
}

/// Start a call
///
/// POST /api/v1/call/start
#[instrument(skip(service, user, req), fields(user_id = %user.user_id))]
pub async fn start_call(
    service: web::Data<CallService>,
    user: AuthenticatedUser,
    req: web::Json<CallTargetRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Start call validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;
    let call_type = req.call_type()?;

    debug!(receiver = %req.receiver_user_id, call_type = %call_type, "Starting call");

    match service
        .start(user.user_id, req.receiver_user_id, call_type)
        .await?
    {
        StartOutcome::Started(session) => Ok(HttpResponse::Ok().json(ApiResponse::with_message(
            StartCallResponse::from(session),
            "Call started",
        ))),
        StartOutcome::ReceiverUnavailable(missed) => {
            Ok(HttpResponse::Ok().json(ReceiverUnavailableResponse::from(missed)))
        }
    }
}

/// Remaining minutes for a running call
///
/// POST /api/v1/call/check-time
#[instrument(skip(service, user, req), fields(user_id = %user.user_id))]
pub async fn check_time(
    service: web::Data<CallService>,
    user: AuthenticatedUser,
    req: web::Json<CheckTimeRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| AppError::Validation(e.to_string()))?;

    let check = service.check_time(user.user_id, &req.call_id).await?;

    if check.call_ended {
        info!(call_id = %check.call_id, "Call time exhausted");
        return Ok(HttpResponse::Ok().json(ApiResponse::with_message(
            check,
            "Call ended: time exhausted",
        )));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(check)))
}

/// Report a status change
///
/// PATCH /api/v1/call/{callId}/status
/// PATCH /api/v1/call/{callId}/update-status
#[instrument(skip(service, user, req), fields(user_id = %user.user_id))]
pub async fn update_status(
    service: web::Data<CallService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    req: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Status update validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let call_id = path.into_inner();
    let update = req.to_update()?;

    let response = match service.update_status(user.user_id, &call_id, update).await? {
        StatusOutcome::Session(session) => CallStatusResponse {
            call_session: session.into(),
            missed_call: None,
        },
        StatusOutcome::Missed {
            session,
            missed_call,
        } => CallStatusResponse {
            call_session: session.into(),
            missed_call: Some(missed_call.into()),
        },
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

/// End and settle a call
///
/// POST /api/v1/call/end
#[instrument(skip(service, user, req), fields(user_id = %user.user_id))]
pub async fn end_call(
    service: web::Data<CallService>,
    user: AuthenticatedUser,
    req: web::Json<EndCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| AppError::Validation(e.to_string()))?;

    if let Some(reported) = req.duration_minutes {
        debug!(
            call_id = %req.call_id,
            reported,
            "Ignoring client-reported duration"
        );
    }

    let outcome = service.end(user.user_id, &req.call_id).await?;
    let response = EndCallResponse::from(&outcome);

    let message = if outcome.already_settled {
        "Call already settled"
    } else {
        "Call ended and settled"
    };

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(response, message)))
}

/// Paginated call history
///
/// GET /api/v1/call/history
#[instrument(skip(service, user), fields(user_id = %user.user_id))]
pub async fn call_history(
    service: web::Data<CallService>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
    filters: web::Query<CallHistoryParams>,
) -> Result<HttpResponse, AppError> {
    let pagination = query.to_pagination()?;

    let call_type = filters
        .call_type
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(parse_call_type)
        .transpose()?;

    let status = filters
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            CallStatus::from_str(s.trim())
                .ok_or_else(|| AppError::InvalidInput(format!("Invalid status: {}", s)))
        })
        .transpose()?;

    let filter = CallHistoryFilter { call_type, status };
    let (records, total) = service.history(user.user_id, &filter, &pagination).await?;

    let data: Vec<CallRecordDto> = records.into_iter().map(Into::into).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginationParams::paginate(
        &pagination,
        data,
        total,
    ))))
}

/// Call payments and earnings
///
/// GET /api/v1/call/transactions
#[instrument(skip(service, user), fields(user_id = %user.user_id))]
pub async fn call_transactions(
    service: web::Data<CallService>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    let pagination = query.to_pagination()?;

    let (entries, total) = service.call_transactions(user.user_id, &pagination).await?;
    let data: Vec<WalletTransactionDto> = entries.into_iter().map(Into::into).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginationParams::paginate(
        &pagination,
        data,
        total,
    ))))
}

/// Sessions still initiated or connected
///
/// GET /api/v1/call/active
#[instrument(skip(service, user), fields(user_id = %user.user_id))]
pub async fn active_calls(
    service: web::Data<CallService>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let calls = service.active(user.user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(ActiveCallsResponse {
        calls: calls.into_iter().map(Into::into).collect(),
    })))
}

/// Missed calls addressed to the user
///
/// GET /api/v1/call/missed
#[instrument(skip(service, user), fields(user_id = %user.user_id))]
pub async fn missed_calls(
    service: web::Data<CallService>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    let pagination = query.to_pagination()?;

    let (missed, total) = service.missed_calls(user.user_id, &pagination).await?;
    let data: Vec<MissedCallDto> = missed.into_iter().map(Into::into).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginationParams::paginate(
        &pagination,
        data,
        total,
    ))))
}

/// Mark a missed call as viewed
///
/// PATCH /api/v1/call/missed/{callId}/viewed
#[instrument(skip(service, user), fields(user_id = %user.user_id))]
pub async fn mark_missed_viewed(
    service: web::Data<CallService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let missed = service
        .mark_missed_viewed(user.user_id, &path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(MissedCallResponse {
        missed_call: missed.into(),
    })))
}

/// Configure call routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/call")
            .route("/check-feasibility", web::post().to(check_feasibility))
            .route("/start", web::post().to(start_call))
            .route("/check-time", web::post().to(check_time))
            .route("/end", web::post().to(end_call))
            .route("/history", web::get().to(call_history))
            .route("/transactions", web::get().to(call_transactions))
            .route("/active", web::get().to(active_calls))
            .route("/missed", web::get().to(missed_calls))
            .route("/missed/{call_id}/viewed", web::patch().to(mark_missed_viewed))
            .route("/{call_id}/status", web::patch().to(update_status))
            .route("/{call_id}/update-status", web::patch().to(update_status)),
    );
}
