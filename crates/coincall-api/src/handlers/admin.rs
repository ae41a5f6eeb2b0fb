//! Admin handlers
//!
//! Pricing management and recharge confirmation. Every route requires the
//! admin role.

use crate::dto::config::{CallConfigResponse, UpdateCallConfigRequest};
use crate::dto::wallet::RechargeConfirmationResponse;
use crate::dto::ApiResponse;
use actix_web::{web, HttpResponse};
use coincall_auth::AdminUser;
use coincall_core::traits::CallConfigSource;
use coincall_core::AppError;
use coincall_services::WalletService;
use tracing::{info, instrument};

/// Current pricing snapshot
///
/// GET /api/v1/admin/call-config
#[instrument(skip(config, admin), fields(admin_id = %admin.user_id))]
pub async fn get_call_config(
    config: web::Data<dyn CallConfigSource>,
    admin: AdminUser,
) -> Result<HttpResponse, AppError> {
    let current = config.current().await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(CallConfigResponse::from(current))))
}

/// Update pricing; bumps the config version
///
/// PUT /api/v1/admin/call-config
#[instrument(skip(config, admin, req), fields(admin_id = %admin.user_id))]
pub async fn update_call_config(
    config: web::Data<dyn CallConfigSource>,
    admin: AdminUser,
    req: web::Json<UpdateCallConfigRequest>,
) -> Result<HttpResponse, AppError> {
    let update = req.to_update()?;

    let updated = config.update(&update, Some(admin.user_id)).await?;

    info!(version = updated.version, "Call pricing updated");

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        CallConfigResponse::from(updated),
        "Call configuration updated",
    )))
}

/// Confirm a paid recharge order; repeated confirmations do not re-credit
///
/// POST /api/v1/admin/wallet/recharge/{orderId}/confirm
#[instrument(skip(service, admin), fields(admin_id = %admin.user_id))]
pub async fn confirm_recharge(
    service: web::Data<WalletService>,
    admin: AdminUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let outcome = service.confirm_recharge(&order_id).await?;
    let response = RechargeConfirmationResponse::new(&order_id, &outcome);

    let message = if response.credited {
        "Recharge credited"
    } else {
        "Recharge already credited"
    };

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(response, message)))
}

/// Configure admin routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/call-config", web::get().to(get_call_config))
            .route("/call-config", web::put().to(update_call_config))
            .route(
                "/wallet/recharge/{order_id}/confirm",
                web::post().to(confirm_recharge),
            ),
    );
}
