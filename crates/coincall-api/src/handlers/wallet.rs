//! Wallet handlers
//!
//! HTTP handlers for the authenticated user's own wallet.

use crate::dto::wallet::{
    RechargeOrderRequest, RechargeOrderResponse, TransactionFilterParams, WalletResponse,
    WalletTransactionDto,
};
use crate::dto::{ApiResponse, PaginationParams};
use actix_web::{web, HttpResponse};
use coincall_auth::AuthenticatedUser;
use coincall_core::traits::TransactionFilter;
use coincall_core::AppError;
use coincall_services::WalletService;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Balance and totals, creating the wallet on first access
///
/// GET /api/v1/wallet
#[instrument(skip(service, user), fields(user_id = %user.user_id))]
pub async fn get_wallet(
    service: web::Data<WalletService>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let wallet = service.get_or_create(user.user_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(WalletResponse::from(wallet))))
}

/// Paginated ledger history
///
/// GET /api/v1/wallet/transactions
#[instrument(skip(service, user), fields(user_id = %user.user_id))]
pub async fn list_transactions(
    service: web::Data<WalletService>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
    filters: web::Query<TransactionFilterParams>,
) -> Result<HttpResponse, AppError> {
    let pagination = query.to_pagination()?;

    let filter = TransactionFilter {
        types: WalletService::parse_type_filter(filters.transaction_type.as_deref())?,
        call_id: filters.call_id.clone().filter(|c| !c.trim().is_empty()),
    };

    let (entries, total) = service
        .list_transactions(user.user_id, &filter, &pagination)
        .await?;
    let data: Vec<WalletTransactionDto> = entries.into_iter().map(Into::into).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginationParams::paginate(
        &pagination,
        data,
        total,
    ))))
}

/// Create a recharge order awaiting payment confirmation
///
/// POST /api/v1/wallet/recharge/orders
#[instrument(skip(service, user, req), fields(user_id = %user.user_id))]
pub async fn create_recharge_order(
    service: web::Data<WalletService>,
    user: AuthenticatedUser,
    req: web::Json<RechargeOrderRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Recharge order validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let pending = service.create_recharge_order(user.user_id, req.coins).await?;
    let response = RechargeOrderResponse::from_transaction(&pending);

    info!(order_id = %response.order_id, coins = response.coins, "Recharge order created");

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        response,
        "Recharge order created",
    )))
}

/// Configure wallet routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/wallet")
            .route("", web::get().to(get_wallet))
            .route("/transactions", web::get().to(list_transactions))
            .route("/recharge/orders", web::post().to(create_recharge_order)),
    );
}
