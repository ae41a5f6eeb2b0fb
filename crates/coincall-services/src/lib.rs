//! Business logic services for CoinCall
//!
//! This crate contains the services that drive a paid call from the first
//! feasibility check to its settlement.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service owns its collaborators behind `Arc<dyn Trait>`
//! - Services are shared across actix workers via `web::Data`
//! - All operations are instrumented with tracing
//! - Storage guarantees (row locks, conditional updates) live in the
//!   repositories; services decide what to ask for
//!
//! # Services
//!
//! - `CallService` - call session state machine and settlement entrypoint
//! - `WalletService` - wallet ledger reads, adjustments and recharge orders
//! - `CallConfigProvider` - pricing snapshot loading behind a versioned cache
//! - `PricingResolver` - pure pricing rules over a snapshot
//! - `CallBillingPlanner` - settlement math applied inside the settlement transaction
//! - `LogNotifier` / `WebhookNotifier` - fire-and-forget call events

pub mod call_session;
pub mod ledger;
pub mod monetization;
pub mod notifier;
pub mod pricing;
pub mod settlement;

pub use call_session::{
    CallRecord, CallService, EndOutcome, Feasibility, RequestedStatus, StartOutcome,
    StatusOutcome, StatusUpdate, TimeCheck,
};
pub use ledger::WalletService;
pub use monetization::{GenderDirectionPolicy, MonetizationPolicy};
pub use notifier::{dispatch, LogNotifier, WebhookNotifier};
pub use pricing::{CallConfigProvider, PricingResolver};
pub use settlement::{BillingRules, CallBillingPlanner};

/// Business logic constants
pub mod constants {
    /// Seconds in one billable minute
    pub const SECONDS_PER_MINUTE: i64 = 60;

    /// Ceiling on billable call time (6 hours)
    pub const DEFAULT_MAX_CALL_DURATION_SECS: i64 = 6 * 3600;

    /// Message sessions are billed as this many minutes
    pub const MESSAGE_BILLED_MINUTES: i64 = 1;

    /// Default page size for history endpoints
    pub const DEFAULT_PAGE_SIZE: i64 = 20;
}
