//! CoinCall Backend Server
//!
//! Call session lifecycle, per-minute billing and wallet settlement for the
//! CoinCall mobile app.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use coincall_api::configure_routes;
use coincall_auth::JwtService;
use coincall_cache::RedisPricingCache;
use coincall_core::traits::{CallConfigSource, PricingCache};
use coincall_core::AppConfig;
use coincall_db::{
    create_pool, run_migrations, PgCallConfigRepository, PgCallSessionRepository,
    PgMissedCallRepository, PgUserRepository, PgWalletRepository,
};
use coincall_services::{
    notifier, BillingRules, CallConfigProvider, CallService, GenderDirectionPolicy, WalletService,
};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
///
/// `LOG_FORMAT=json` switches to JSON lines for log shippers.
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "coincall_backend={lvl},coincall_api={lvl},coincall_services={lvl},coincall_db={lvl},coincall_cache={lvl},coincall_auth={lvl},actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    let json = env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

/// Connect to Redis, running without a cache when it is unreachable
async fn connect_cache(config: &AppConfig) -> Option<(Arc<dyn PricingCache>, u64)> {
    let redis = config.redis.as_ref()?;

    let connected = match RedisPricingCache::new(&redis.url).await {
        Ok(cache) => cache.ping().await.map(|_| cache),
        Err(e) => Err(e),
    };

    match connected {
        Ok(cache) => {
            info!("Redis cache connected");
            Some((Arc::new(cache) as Arc<dyn PricingCache>, redis.config_ttl_secs))
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, pricing will be read from the database");
            None
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    info!("Starting CoinCall Backend v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("Failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .context("Failed to create database pool")?;

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
    }

    info!(
        "Database connection established with {} max connections",
        config.database.max_connections
    );

    // Pricing snapshot, cached in Redis when available
    let (cache, ttl_secs) = match connect_cache(&config).await {
        Some((cache, ttl)) => (Some(cache), ttl),
        None => (None, 0),
    };
    let pricing: Arc<dyn CallConfigSource> = Arc::new(CallConfigProvider::new(
        Arc::new(PgCallConfigRepository::new(pool.clone())),
        cache,
        ttl_secs,
    ));

    let wallets = Arc::new(PgWalletRepository::new(pool.clone()));
    let notifier = notifier::from_config(&config.notifications)
        .context("Failed to configure call notifications")?;

    let call_service = CallService::new(
        Arc::new(PgCallSessionRepository::new(pool.clone())),
        Arc::new(PgMissedCallRepository::new(pool.clone())),
        Arc::new(PgUserRepository::new(pool.clone())),
        wallets.clone(),
        pricing.clone(),
        notifier,
    )
    .with_monetization(Arc::new(GenderDirectionPolicy::from_config(&config.billing)))
    .with_rules(BillingRules::from(&config.billing));

    let call_service = web::Data::new(call_service);
    let wallet_service = web::Data::new(WalletService::new(wallets));
    let pricing = web::Data::from(pricing);

    let jwt_service = Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.jwt_expiration_secs,
    ));

    info!(
        "JWT service configured with {} second token expiration",
        config.auth.jwt_expiration_secs
    );

    let cors_origins = config
        .server
        .cors_origins
        .clone()
        .unwrap_or_else(|| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let bind_addr = config.server_addr();
    let workers = config.server.workers.max(1);

    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    HttpServer::new(move || {
        // Configure CORS - clone cors_origins for each worker
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origins: Vec<&str> = cors_origins_inner.split(',').collect();
                if let Ok(origin_str) = origin.to_str() {
                    origins.iter().any(|o| o.trim() == origin_str)
                } else {
                    false
                }
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            // Services
            .app_data(call_service.clone())
            .app_data(wallet_service.clone())
            .app_data(pricing.clone())
            // Auth
            .app_data(web::Data::new(jwt_service.clone()))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "success": false,
                        "error": error_message,
                        "code": "invalid_body",
                        "status": 400
                    })),
                )
                .into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "success": false,
                        "error": error_message,
                        "code": "invalid_query",
                        "status": 400
                    })),
                )
                .into()
            }))
            // Middleware
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            // Configure routes
            .configure(configure_routes)
            // Root redirect to health
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await
    .context("HTTP server error")
}
