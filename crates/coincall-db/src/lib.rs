//! CoinCall Database Layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for the CoinCall backend. It includes:
//!
//! - Connection pool management with sqlx
//! - Embedded schema migrations
//! - Repository implementations for users, wallets, call sessions, missed calls
//!   and the pricing configuration
//! - Row-locking transactions for ledger writes and call settlement

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use coincall_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
