//! CoinCall Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the CoinCall backend. It includes:
//!
//! - Domain models (Wallet, CallSession, MissedCall, CallConfig, etc.)
//! - Repository and collaborator traits
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
