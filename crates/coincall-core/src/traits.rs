//! Common traits for repositories and services
//!
//! Defines abstractions for database access, caching, notification delivery
//! and settlement planning.

use crate::error::AppError;
use crate::models::{
    CallConfig, CallConfigUpdate, CallEvent, CallSession, CallStatus, CallType, LedgerEntry,
    MissedCall, MissedReason, PendingCreditOutcome, SettleAttempt, SettlementPlan,
    TransactionType, User, Wallet, WalletTransaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// User lookups needed by calling and billing
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find user by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Find several users at once (missing ids are skipped)
    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<User>, AppError>;
}

/// Filters for ledger history
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Restrict to these types; empty means all
    pub types: Vec<TransactionType>,
    pub call_id: Option<String>,
}

impl TransactionFilter {
    /// Call payments and earnings only
    pub fn call_entries() -> Self {
        Self {
            types: vec![TransactionType::CallPayment, TransactionType::CallEarning],
            call_id: None,
        }
    }
}

/// Wallet ledger storage
///
/// All balance changes are relative and floor at zero. When a ledger entry is
/// supplied, the balance write and the transaction insert commit together.
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Find wallet by owner
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>, AppError>;

    /// Return the user's wallet, creating an empty one if missing
    async fn get_or_create(&self, user_id: Uuid) -> Result<Wallet, AppError>;

    /// Apply `max(0, balance + delta)`; `WalletNotFound` if there is no wallet
    async fn adjust_balance(
        &self,
        user_id: Uuid,
        delta: i64,
        entry: Option<&LedgerEntry>,
    ) -> Result<Wallet, AppError>;

    /// Paginated ledger history, newest first
    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<WalletTransaction>, i64), AppError>;

    /// Record a pending credit awaiting gateway confirmation
    async fn create_pending_credit(
        &self,
        transaction: &WalletTransaction,
    ) -> Result<WalletTransaction, AppError>;

    /// Flip a pending credit to completed and credit the wallet, exactly once
    async fn complete_pending_credit(&self, order_id: &str)
        -> Result<PendingCreditOutcome, AppError>;
}

/// Filters for call history
#[derive(Debug, Clone, Default)]
pub struct CallHistoryFilter {
    pub call_type: Option<CallType>,
    pub status: Option<CallStatus>,
}

/// Computes settlement amounts inside the settlement transaction
///
/// Implementations must be pure: the same session and balance always give
/// the same plan.
pub trait SettlementPlanner: Send + Sync {
    /// Amounts to apply given the caller's locked balance
    fn plan(&self, session: &CallSession, caller_balance: i64) -> SettlementPlan;

    /// Ledger entry for the caller's debit
    fn payment_entry(&self, session: &CallSession, plan: &SettlementPlan) -> LedgerEntry;

    /// Ledger entry for the receiver's credit
    fn earning_entry(&self, session: &CallSession, plan: &SettlementPlan) -> LedgerEntry;

    /// End reason recorded on the settled session
    fn end_reason(&self) -> &str;
}

/// Call session storage
///
/// Status-changing methods are conditional updates; they return `None` when
/// the session was not in a state that allows the change.
#[async_trait]
pub trait CallSessionRepository: Send + Sync {
    /// Persist a new session
    async fn create(&self, session: &CallSession) -> Result<CallSession, AppError>;

    /// Find session by call ID
    async fn find_by_call_id(&self, call_id: &str) -> Result<Option<CallSession>, AppError>;

    /// `initiated -> connected`
    async fn mark_connected(
        &self,
        call_id: &str,
        connected_at: DateTime<Utc>,
    ) -> Result<Option<CallSession>, AppError>;

    /// Record a client-reported end without settling
    async fn mark_ended(
        &self,
        call_id: &str,
        end_time: DateTime<Utc>,
        duration_minutes: i64,
        end_reason: Option<&str>,
    ) -> Result<Option<CallSession>, AppError>;

    /// Unanswered (`initiated`) session -> `failed` as a missed call
    async fn mark_failed(
        &self,
        call_id: &str,
        reason: MissedReason,
        end_time: DateTime<Utc>,
    ) -> Result<Option<CallSession>, AppError>;

    /// Record a settlement failure, leaving `payment_processed` false
    async fn mark_payment_failed(
        &self,
        call_id: &str,
        duration_minutes: i64,
    ) -> Result<Option<CallSession>, AppError>;

    /// Claim and apply payment for a session at most once
    ///
    /// Locks the session and both wallets, asks `planner` for amounts against
    /// the caller's locked balance, writes ledger entries and marks the session
    /// `ended` with `payment_processed = true` in one transaction.
    async fn settle_once(
        &self,
        call_id: &str,
        planner: &dyn SettlementPlanner,
    ) -> Result<SettleAttempt, AppError>;

    /// Sessions where the user is caller or receiver, newest first
    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &CallHistoryFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<CallSession>, i64), AppError>;

    /// Sessions in `initiated`/`connected` involving the user
    async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<CallSession>, AppError>;
}

/// Missed call storage
#[async_trait]
pub trait MissedCallRepository: Send + Sync {
    async fn create(&self, missed: &MissedCall) -> Result<MissedCall, AppError>;

    /// Missed calls addressed to the user, newest first
    async fn list_for_receiver(
        &self,
        receiver_user_id: Uuid,
        pagination: &Pagination,
    ) -> Result<(Vec<MissedCall>, i64), AppError>;

    /// Mark viewed; `None` if the call is not in the receiver's inbox
    async fn mark_viewed(
        &self,
        call_id: &str,
        receiver_user_id: Uuid,
    ) -> Result<Option<MissedCall>, AppError>;

    async fn mark_notification_sent(&self, id: Uuid) -> Result<(), AppError>;
}

/// Pricing configuration storage
#[async_trait]
pub trait CallConfigRepository: Send + Sync {
    /// Load the current snapshot, if one was ever configured
    async fn load(&self) -> Result<Option<CallConfig>, AppError>;

    /// Apply an update and bump the version
    async fn update(
        &self,
        update: &CallConfigUpdate,
        updated_by: Option<Uuid>,
    ) -> Result<CallConfig, AppError>;
}

/// Source of the current pricing snapshot
#[async_trait]
pub trait CallConfigSource: Send + Sync {
    /// Current snapshot; `ConfigurationMissing` if none exists
    async fn current(&self) -> Result<CallConfig, AppError>;

    /// Persist an admin update and publish the new snapshot
    async fn update(
        &self,
        update: &CallConfigUpdate,
        updated_by: Option<Uuid>,
    ) -> Result<CallConfig, AppError>;
}

/// Outbound notification collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &CallEvent) -> Result<(), AppError>;
}

/// Shared cache for the pricing snapshot
///
/// Writes are versioned: a snapshot never replaces a newer one, so a reader
/// that loaded an old row cannot undo an admin update.
#[async_trait]
pub trait PricingCache: Send + Sync {
    /// Cached snapshot, if any
    async fn load(&self) -> Result<Option<CallConfig>, AppError>;

    /// Store `config` unless a newer version is cached; returns whether it was written
    async fn store(&self, config: &CallConfig, ttl_secs: u64) -> Result<bool, AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            limit: per_page,
            total_pages,
        }
    }
}
