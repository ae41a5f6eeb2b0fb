//! Wallet and ledger transaction models
//!
//! Every user owns a single coin wallet. Balance changes are always relative
//! and are recorded in an append-only transaction log.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Coin wallet
///
/// `coin_balance` is never negative; debits larger than the balance floor at
/// zero instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub user_id: Uuid,

    /// Spendable coins
    pub coin_balance: i64,

    /// Cumulative coins earned from calls and gifts
    pub total_earned: Decimal,

    /// Cumulative coins spent on calls and gifts
    pub total_spent: Decimal,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Empty wallet for a user
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            coin_balance: 0,
            total_earned: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance after applying `delta`, floored at zero
    #[inline]
    pub fn floored_balance(&self, delta: i64) -> i64 {
        self.coin_balance.saturating_add(delta).max(0)
    }

    /// Whole minutes this wallet can pay for at the given rate
    pub fn affordable_minutes(&self, coins_per_minute: i64) -> i64 {
        if coins_per_minute <= 0 {
            return 0;
        }
        self.coin_balance / coins_per_minute
    }
}

/// Ledger transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Coins added (recharge, manual credit)
    Credit,
    /// Coins removed (manual debit)
    Debit,
    GiftSent,
    GiftReceived,
    /// Caller side of a settled call
    CallPayment,
    /// Receiver side of a settled call
    CallEarning,
    /// Platform share retained from a settled call
    AdminCommission,
    Refund,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
            TransactionType::GiftSent => "gift_sent",
            TransactionType::GiftReceived => "gift_received",
            TransactionType::CallPayment => "call_payment",
            TransactionType::CallEarning => "call_earning",
            TransactionType::AdminCommission => "admin_commission",
            TransactionType::Refund => "refund",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "credit" => Some(TransactionType::Credit),
            "debit" => Some(TransactionType::Debit),
            "gift_sent" => Some(TransactionType::GiftSent),
            "gift_received" => Some(TransactionType::GiftReceived),
            "call_payment" => Some(TransactionType::CallPayment),
            "call_earning" => Some(TransactionType::CallEarning),
            "admin_commission" => Some(TransactionType::AdminCommission),
            "refund" => Some(TransactionType::Refund),
            _ => None,
        }
    }

    /// Counted in `total_earned`
    pub fn counts_as_earning(&self) -> bool {
        matches!(
            self,
            TransactionType::CallEarning | TransactionType::GiftReceived
        )
    }

    /// Counted in `total_spent`
    pub fn counts_as_spending(&self) -> bool {
        matches!(
            self,
            TransactionType::CallPayment | TransactionType::GiftSent | TransactionType::Debit
        )
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Awaiting external confirmation (payment gateway order)
    Pending,
    #[default]
    Completed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Completed => write!(f, "completed"),
        }
    }
}

impl TransactionStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            _ => None,
        }
    }
}

/// Append-only ledger record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletTransaction {
    pub id: Uuid,

    pub user_id: Uuid,

    /// Magnitude of the change, never negative
    pub amount: i64,

    pub transaction_type: TransactionType,

    pub description: String,

    pub status: TransactionStatus,

    /// External correlation key (payment-gateway order id)
    pub transaction_id: Option<String>,

    /// Call this entry settles, if any
    pub call_id: Option<String>,

    /// Wallet balance right after the entry was applied
    pub balance_after: Option<i64>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Completed record for an applied ledger entry
    pub fn completed(user_id: Uuid, amount: i64, entry: &LedgerEntry, balance_after: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount: amount.abs(),
            transaction_type: entry.transaction_type,
            description: entry.description.clone(),
            status: TransactionStatus::Completed,
            transaction_id: None,
            call_id: entry.call_id.clone(),
            balance_after: Some(balance_after),
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending credit awaiting gateway confirmation
    pub fn pending_credit(user_id: Uuid, amount: i64, order_id: &str, description: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount: amount.abs(),
            transaction_type: TransactionType::Credit,
            description: description.to_string(),
            status: TransactionStatus::Pending,
            transaction_id: Some(order_id.to_string()),
            call_id: None,
            balance_after: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }
}

/// Audit metadata attached to a balance adjustment
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub transaction_type: TransactionType,
    pub description: String,
    pub call_id: Option<String>,
}

impl LedgerEntry {
    pub fn new(transaction_type: TransactionType, description: impl Into<String>) -> Self {
        Self {
            transaction_type,
            description: description.into(),
            call_id: None,
        }
    }

    pub fn with_call(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}

/// Result of confirming a pending credit
#[derive(Debug, Clone)]
pub enum PendingCreditOutcome {
    /// The credit was applied by this call
    Completed {
        transaction: WalletTransaction,
        wallet: Wallet,
    },
    /// The credit had already been applied earlier
    AlreadyCompleted { transaction: WalletTransaction },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floored_balance() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.coin_balance = 150;

        assert_eq!(wallet.floored_balance(-100), 50);
        assert_eq!(wallet.floored_balance(-300), 0);
        assert_eq!(wallet.floored_balance(25), 175);
        assert_eq!(wallet.floored_balance(i64::MIN), 0);
    }

    #[test]
    fn test_affordable_minutes() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.coin_balance = 250;

        assert_eq!(wallet.affordable_minutes(100), 2);
        assert_eq!(wallet.affordable_minutes(0), 0);
    }

    #[test]
    fn test_transaction_type_counters() {
        assert!(TransactionType::CallEarning.counts_as_earning());
        assert!(TransactionType::CallPayment.counts_as_spending());
        assert!(!TransactionType::Credit.counts_as_earning());
        assert!(!TransactionType::Credit.counts_as_spending());
        assert_eq!(
            TransactionType::from_str("call_payment"),
            Some(TransactionType::CallPayment)
        );
    }

    #[test]
    fn test_completed_transaction_stores_magnitude() {
        let entry = LedgerEntry::new(TransactionType::CallPayment, "Video call").with_call("c-1");
        let tx = WalletTransaction::completed(Uuid::new_v4(), -300, &entry, 700);

        assert_eq!(tx.amount, 300);
        assert_eq!(tx.call_id.as_deref(), Some("c-1"));
        assert_eq!(tx.balance_after, Some(700));
        assert!(!tx.is_pending());
    }
}
