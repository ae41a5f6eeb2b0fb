//! Wallet ledger service
//!
//! Balance reads, relative adjustments and the recharge (pending credit)
//! flow. Atomicity of a balance write with its audit row is provided by the
//! repository.

use coincall_core::{
    models::{LedgerEntry, PendingCreditOutcome, TransactionType, Wallet, WalletTransaction},
    traits::{Pagination, TransactionFilter, WalletRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Wallet ledger service
pub struct WalletService {
    wallets: Arc<dyn WalletRepository>,
}

impl WalletService {
    pub fn new(wallets: Arc<dyn WalletRepository>) -> Self {
        Self { wallets }
    }

    /// The user's wallet, created empty on first access
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, user_id: Uuid) -> AppResult<Wallet> {
        self.wallets.get_or_create(user_id).await
    }

    /// Current committed balance
    #[instrument(skip(self))]
    pub async fn get_balance(&self, user_id: Uuid) -> AppResult<i64> {
        let wallet = self
            .wallets
            .find_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

        Ok(wallet.coin_balance)
    }

    /// Apply a relative change, floored at zero
    #[instrument(skip(self, entry))]
    pub async fn adjust_balance(
        &self,
        user_id: Uuid,
        delta: i64,
        entry: Option<&LedgerEntry>,
    ) -> AppResult<Wallet> {
        self.wallets.adjust_balance(user_id, delta, entry).await
    }

    /// Paginated ledger history
    #[instrument(skip(self, filter))]
    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
        pagination: &Pagination,
    ) -> AppResult<(Vec<WalletTransaction>, i64)> {
        self.wallets
            .list_transactions(user_id, filter, pagination)
            .await
    }

    /// Record a recharge awaiting gateway confirmation
    ///
    /// The returned transaction's `transaction_id` is the order id the
    /// gateway must echo back on confirmation.
    #[instrument(skip(self))]
    pub async fn create_recharge_order(
        &self,
        user_id: Uuid,
        coins: i64,
    ) -> AppResult<WalletTransaction> {
        if coins <= 0 {
            return Err(AppError::Validation(
                "Recharge amount must be positive".to_string(),
            ));
        }

        let order_id = format!("order_{}", Uuid::now_v7().simple());
        let pending = WalletTransaction::pending_credit(
            user_id,
            coins,
            &order_id,
            &format!("Coin recharge of {}", coins),
        );

        let created = self.wallets.create_pending_credit(&pending).await?;

        info!(
            user_id = %user_id,
            order_id = %order_id,
            coins,
            "Recharge order created"
        );

        Ok(created)
    }

    /// Credit a confirmed recharge exactly once
    #[instrument(skip(self))]
    pub async fn confirm_recharge(&self, order_id: &str) -> AppResult<PendingCreditOutcome> {
        let outcome = self.wallets.complete_pending_credit(order_id).await?;

        match &outcome {
            PendingCreditOutcome::Completed {
                transaction,
                wallet,
            } => {
                info!(
                    order_id = %order_id,
                    user_id = %transaction.user_id,
                    coins = transaction.amount,
                    balance = wallet.coin_balance,
                    "Recharge credited"
                );
            }
            PendingCreditOutcome::AlreadyCompleted { transaction } => {
                warn!(
                    order_id = %order_id,
                    user_id = %transaction.user_id,
                    "Recharge already credited, ignoring duplicate confirmation"
                );
            }
        }

        Ok(outcome)
    }

    /// Parse a comma separated `type` query value
    pub fn parse_type_filter(raw: Option<&str>) -> AppResult<Vec<TransactionType>> {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Ok(Vec::new());
        };

        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                TransactionType::from_str(s)
                    .ok_or_else(|| AppError::InvalidInput(format!("Unknown transaction type: {}", s)))
            })
            .collect()
    }
}
