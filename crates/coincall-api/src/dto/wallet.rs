//! Wallet DTOs

use chrono::{DateTime, Utc};
use coincall_core::models::{
    PendingCreditOutcome, TransactionStatus, TransactionType, Wallet, WalletTransaction,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Wallet balance and totals
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub user_id: Uuid,
    pub coin_balance: i64,
    pub total_earned: Decimal,
    pub total_spent: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(w: Wallet) -> Self {
        Self {
            user_id: w.user_id,
            coin_balance: w.coin_balance,
            total_earned: w.total_earned,
            total_spent: w.total_spent,
            updated_at: w.updated_at,
        }
    }
}

/// Ledger entry as returned to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransactionDto {
    pub id: Uuid,
    pub amount: i64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub description: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<WalletTransaction> for WalletTransactionDto {
    fn from(t: WalletTransaction) -> Self {
        Self {
            id: t.id,
            amount: t.amount,
            transaction_type: t.transaction_type,
            description: t.description,
            status: t.status,
            transaction_id: t.transaction_id,
            call_id: t.call_id,
            balance_after: t.balance_after,
            created_at: t.created_at,
        }
    }
}

/// Ledger history filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilterParams {
    /// Comma separated transaction types
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,

    pub call_id: Option<String>,
}

/// New recharge order
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RechargeOrderRequest {
    #[validate(range(min = 1, max = 10000000, message = "coins must be between 1 and 10000000"))]
    pub coins: i64,
}

/// Created recharge order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RechargeOrderResponse {
    pub order_id: String,
    pub coins: i64,
    pub status: TransactionStatus,
}

impl RechargeOrderResponse {
    pub fn from_transaction(t: &WalletTransaction) -> Self {
        Self {
            order_id: t.transaction_id.clone().unwrap_or_default(),
            coins: t.amount,
            status: t.status,
        }
    }
}

/// Result of a recharge confirmation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RechargeConfirmationResponse {
    pub order_id: String,
    pub user_id: Uuid,
    pub coins: i64,
    /// False when the order had already been credited
    pub credited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin_balance: Option<i64>,
}

impl RechargeConfirmationResponse {
    pub fn new(order_id: &str, outcome: &PendingCreditOutcome) -> Self {
        match outcome {
            PendingCreditOutcome::Completed {
                transaction,
                wallet,
            } => Self {
                order_id: order_id.to_string(),
                user_id: transaction.user_id,
                coins: transaction.amount,
                credited: true,
                coin_balance: Some(wallet.coin_balance),
            },
            PendingCreditOutcome::AlreadyCompleted { transaction } => Self {
                order_id: order_id.to_string(),
                user_id: transaction.user_id,
                coins: transaction.amount,
                credited: false,
                coin_balance: None,
            },
        }
    }
}
