//! CoinCall Authentication Library
//!
//! Bearer-token authentication for the calling API:
//!
//! - JWT token creation and validation
//! - Actix-web extractors for authenticated users and admins
//!
//! Tokens are issued by the account service; this crate only needs the shared
//! secret to validate them. The subject claim carries the user's UUID.

pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::{AdminUser, AuthenticatedUser};
