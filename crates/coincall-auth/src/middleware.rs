//! Actix-web authentication extractors
//!
//! Provides extractors for authenticated users with role-based access control.

use crate::jwt::JwtService;
use crate::Claims;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use coincall_core::error::AppError;
use coincall_core::models::UserRole;
use futures::future::{ready, Ready};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Extract JWT token from request
///
/// Checks for token in the following order:
/// 1. Authorization header (Bearer token)
/// 2. Cookie named "token"
fn extract_token_from_request(req: &HttpRequest) -> Option<String> {
    if let Some(auth_header) = req.headers().get("Authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    req.cookie("token").map(|c| c.value().to_string())
}

/// Authenticated user extractor
///
/// Extracts and validates the bearer token; handlers receive the caller's
/// identity without touching headers.
///
/// ```no_run
/// use actix_web::HttpResponse;
/// use coincall_auth::AuthenticatedUser;
///
/// async fn whoami(user: AuthenticatedUser) -> HttpResponse {
///     HttpResponse::Ok().json(serde_json::json!({ "userId": user.user_id }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Id of the authenticated user
    pub user_id: Uuid,

    /// Role of the authenticated user
    pub role: UserRole,

    /// Full claims from the JWT token
    pub claims: Claims,
}

impl AuthenticatedUser {
    /// Check if user has admin privileges
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    fn authenticate(req: &HttpRequest) -> Result<Self, AppError> {
        let jwt_service = req
            .app_data::<web::Data<Arc<JwtService>>>()
            .map(|service| service.get_ref().clone())
            .ok_or_else(|| {
                warn!("JwtService not found in app data");
                AppError::Unauthorized("Authentication service not configured".to_string())
            })?;

        let token = extract_token_from_request(req).ok_or_else(|| {
            debug!("No authentication token found in request");
            AppError::Unauthorized("No authentication token provided".to_string())
        })?;

        let claims = jwt_service.validate_token(&token)?;
        let user_id = claims.user_id()?;

        debug!(
            user_id = %user_id,
            role = ?claims.role,
            "User authenticated successfully"
        );

        Ok(AuthenticatedUser {
            user_id,
            role: claims.role,
            claims,
        })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::authenticate(req).map_err(|e| {
            warn!(error = %e, "Authentication failed");
            e.into()
        }))
    }
}

/// Admin user extractor
///
/// Requires the admin role; other authenticated users get `403 Forbidden`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl std::ops::Deref for AdminUser {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for AdminUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let auth_user = match AuthenticatedUser::from_request(req, payload).into_inner() {
            Ok(user) => user,
            Err(e) => return ready(Err(e)),
        };

        if !auth_user.is_admin() {
            warn!(
                user_id = %auth_user.user_id,
                role = %auth_user.role,
                "User attempted admin access without privileges"
            );
            return ready(Err(AppError::Forbidden.into()));
        }

        debug!(user_id = %auth_user.user_id, "Admin access granted");

        ready(Ok(AdminUser(auth_user)))
    }
}
