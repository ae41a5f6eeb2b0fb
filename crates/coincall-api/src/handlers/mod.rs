//! HTTP request handlers

pub mod admin;
pub mod call;
pub mod health;
pub mod wallet;

pub use admin::configure as configure_admin;
pub use call::configure as configure_calls;
pub use health::configure as configure_health;
pub use wallet::configure as configure_wallet;
