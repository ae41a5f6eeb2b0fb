//! Repository implementations
//!
//! This module contains concrete implementations of all repository traits
//! defined in coincall-core, using sqlx for PostgreSQL access.

pub mod call_config_repo;
pub mod call_session_repo;
pub mod missed_call_repo;
pub mod user_repo;
pub mod wallet_repo;

pub use call_config_repo::PgCallConfigRepository;
pub use call_session_repo::PgCallSessionRepository;
pub use missed_call_repo::PgMissedCallRepository;
pub use user_repo::PgUserRepository;
pub use wallet_repo::PgWalletRepository;
