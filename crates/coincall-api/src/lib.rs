//! API layer for CoinCall
//!
//! HTTP handlers for the call lifecycle, wallets and pricing administration.
//!
//! Handlers expect the following application data:
//! - `web::Data<CallService>`
//! - `web::Data<WalletService>`
//! - `web::Data<dyn CallConfigSource>`
//! - `web::Data<Arc<JwtService>>` for the authentication extractors

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod dto;
pub mod handlers;

use actix_web::web;

// Re-export DTOs (common types)
pub use dto::{ApiResponse, PaginationParams};

// Re-export handler configuration functions
pub use handlers::{configure_admin, configure_calls, configure_health, configure_wallet};

/// Mount every route under `/api/v1`
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(configure_health)
            .configure(configure_calls)
            .configure(configure_wallet)
            .configure(configure_admin),
    );
}
