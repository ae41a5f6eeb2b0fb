//! Health check handler

use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness probe
///
/// GET /api/v1/health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "status": "healthy",
        "service": "coincall-backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Configure the health route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}
