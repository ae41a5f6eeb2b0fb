//! Domain models for CoinCall
//!
//! This module contains all the core domain models used throughout the application.

pub mod call_config;
pub mod call_session;
pub mod missed_call;
pub mod notification;
pub mod user;
pub mod wallet;

pub use call_config::{CallConfig, CallConfigUpdate, ResolvedPricing};
pub use call_session::{
    end_reason, CallSession, CallStatus, CallType, SettleAttempt, SettlementPlan,
    SettlementSummary,
};
pub use missed_call::{MissedCall, MissedReason};
pub use notification::{CallEvent, CallEventKind};
pub use user::{Gender, User, UserRole, UserStatus, UserSummary, UserTier};
pub use wallet::{
    LedgerEntry, PendingCreditOutcome, TransactionStatus, TransactionType, Wallet,
    WalletTransaction,
};
