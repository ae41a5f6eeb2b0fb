//! Data Transfer Objects (DTOs) for API requests and responses

pub mod call;
pub mod common;
pub mod config;
pub mod wallet;

pub use call::*;
pub use common::*;
pub use config::*;
pub use wallet::*;
