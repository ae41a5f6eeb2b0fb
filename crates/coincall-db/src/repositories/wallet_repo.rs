//! Wallet repository implementation
//!
//! PostgreSQL-backed coin ledger. Every balance change locks the wallet row,
//! applies a relative delta floored at zero and appends the audit record in
//! the same transaction.

use coincall_core::{
    models::{
        LedgerEntry, PendingCreditOutcome, TransactionStatus, TransactionType, Wallet,
        WalletTransaction,
    },
    traits::{Pagination, TransactionFilter, WalletRepository},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of WalletRepository
pub struct PgWalletRepository {
    pool: PgPool,
}

impl PgWalletRepository {
    /// Create a new wallet repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) const WALLET_COLUMNS: &str =
    "user_id, coin_balance, total_earned, total_spent, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = r#"
    id, user_id, amount, transaction_type, description, status,
    transaction_id, call_id, balance_after, created_at, updated_at
"#;

/// Postgres error code for foreign key violations
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Postgres error code for unique violations
const UNIQUE_VIOLATION: &str = "23505";

pub(crate) fn db_error_code(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c.into_owned())
}

/// Insert an empty wallet unless one exists
pub(crate) async fn ensure_wallet(conn: &mut PgConnection, user_id: Uuid) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO wallets (user_id)
        VALUES ($1)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if db_error_code(&e).as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            AppError::UserNotFound(user_id.to_string())
        } else {
            error!("Failed to create wallet for {}: {}", user_id, e);
            AppError::Database(format!("Failed to create wallet: {}", e))
        }
    })?;

    Ok(())
}

/// Lock a wallet row for the rest of the transaction
pub(crate) async fn lock_wallet(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Wallet> {
    let query = format!(
        "SELECT {} FROM wallets WHERE user_id = $1 FOR UPDATE",
        WALLET_COLUMNS
    );

    let row = sqlx::query_as::<sqlx::Postgres, WalletRow>(&query)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            error!("Failed to lock wallet {}: {}", user_id, e);
            AppError::Database(format!("Failed to lock wallet: {}", e))
        })?
        .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

    Ok(row.into())
}

/// Apply a relative delta to a wallet that is already locked by `conn`
///
/// The balance floors at zero. Counters move by the amount actually applied.
/// Returns the updated wallet and the signed amount applied.
pub(crate) async fn apply_delta_locked(
    conn: &mut PgConnection,
    wallet: &Wallet,
    delta: i64,
    entry: Option<&LedgerEntry>,
) -> AppResult<(Wallet, i64)> {
    let new_balance = wallet.floored_balance(delta);
    let applied = new_balance - wallet.coin_balance;
    let magnitude = Decimal::from(applied.abs());

    let (earned, spent) = match entry.map(|e| e.transaction_type) {
        Some(t) if t.counts_as_earning() => (magnitude, Decimal::ZERO),
        Some(t) if t.counts_as_spending() => (Decimal::ZERO, magnitude),
        _ => (Decimal::ZERO, Decimal::ZERO),
    };

    let query = format!(
        r#"
        UPDATE wallets
        SET coin_balance = GREATEST(coin_balance + $2, 0),
            total_earned = total_earned + $3,
            total_spent = total_spent + $4,
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING {}
        "#,
        WALLET_COLUMNS
    );

    let updated: Wallet = sqlx::query_as::<sqlx::Postgres, WalletRow>(&query)
        .bind(wallet.user_id)
        .bind(delta)
        .bind(earned)
        .bind(spent)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            error!("Failed to update wallet {}: {}", wallet.user_id, e);
            AppError::Database(format!("Failed to update balance: {}", e))
        })?
        .into();

    if let Some(entry) = entry {
        let record =
            WalletTransaction::completed(wallet.user_id, applied, entry, updated.coin_balance);
        insert_transaction(conn, &record).await?;
    }

    if applied != delta {
        warn!(
            user_id = %wallet.user_id,
            requested = delta,
            applied,
            "Debit floored at zero balance"
        );
    }

    Ok((updated, applied))
}

pub(crate) async fn insert_transaction(
    conn: &mut PgConnection,
    record: &WalletTransaction,
) -> AppResult<WalletTransaction> {
    let query = format!(
        r#"
        INSERT INTO wallet_transactions (
            id, user_id, amount, transaction_type, description, status,
            transaction_id, call_id, balance_after, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    );

    let row = sqlx::query_as::<sqlx::Postgres, TransactionRow>(&query)
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.amount)
        .bind(record.transaction_type.as_str())
        .bind(&record.description)
        .bind(record.status.to_string())
        .bind(&record.transaction_id)
        .bind(&record.call_id)
        .bind(record.balance_after)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if db_error_code(&e).as_deref() == Some(UNIQUE_VIOLATION) {
                AppError::Conflict(format!(
                    "Transaction {} already exists",
                    record.transaction_id.as_deref().unwrap_or_default()
                ))
            } else {
                error!("Failed to insert ledger entry for {}: {}", record.user_id, e);
                AppError::Database(format!("Failed to record transaction: {}", e))
            }
        })?;

    Ok(row.into())
}

#[async_trait]
impl WalletRepository for PgWalletRepository {
    #[instrument(skip(self))]
    async fn find_by_user(&self, user_id: Uuid) -> AppResult<Option<Wallet>> {
        debug!("Finding wallet for user: {}", user_id);

        let query = format!("SELECT {} FROM wallets WHERE user_id = $1", WALLET_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, WalletRow>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding wallet {}: {}", user_id, e);
                AppError::Database(format!("Failed to find wallet: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn get_or_create(&self, user_id: Uuid) -> AppResult<Wallet> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!("Failed to acquire connection: {}", e);
            AppError::Pool(format!("Failed to acquire connection: {}", e))
        })?;

        ensure_wallet(&mut conn, user_id).await?;

        let query = format!("SELECT {} FROM wallets WHERE user_id = $1", WALLET_COLUMNS);

        let row = sqlx::query_as::<sqlx::Postgres, WalletRow>(&query)
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                error!("Database error loading wallet {}: {}", user_id, e);
                AppError::Database(format!("Failed to load wallet: {}", e))
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self, entry))]
    async fn adjust_balance(
        &self,
        user_id: Uuid,
        delta: i64,
        entry: Option<&LedgerEntry>,
    ) -> AppResult<Wallet> {
        debug!("Adjusting balance for {} by {}", user_id, delta);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let wallet = lock_wallet(&mut tx, user_id).await?;
        let (updated, applied) = apply_delta_locked(&mut tx, &wallet, delta, entry).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            "Wallet {} adjusted by {}: {} -> {}",
            user_id, applied, wallet.coin_balance, updated.coin_balance
        );

        Ok(updated)
    }

    #[instrument(skip(self, filter))]
    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
        pagination: &Pagination,
    ) -> AppResult<(Vec<WalletTransaction>, i64)> {
        let types: Option<Vec<String>> = if filter.types.is_empty() {
            None
        } else {
            Some(filter.types.iter().map(|t| t.as_str().to_string()).collect())
        };

        let where_clause = r#"
            WHERE user_id = $1
              AND ($2::text[] IS NULL OR transaction_type = ANY($2))
              AND ($3::text IS NULL OR call_id = $3)
        "#;

        let total: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM wallet_transactions {}",
            where_clause
        ))
        .bind(user_id)
        .bind(&types)
        .bind(&filter.call_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting transactions: {}", e);
            AppError::Database(format!("Failed to count transactions: {}", e))
        })?;

        let query = format!(
            "SELECT {} FROM wallet_transactions {} ORDER BY created_at DESC, id LIMIT $4 OFFSET $5",
            TRANSACTION_COLUMNS, where_clause
        );

        let rows = sqlx::query_as::<sqlx::Postgres, TransactionRow>(&query)
            .bind(user_id)
            .bind(&types)
            .bind(&filter.call_id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing transactions: {}", e);
                AppError::Database(format!("Failed to fetch transactions: {}", e))
            })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }

    #[instrument(skip(self, transaction), fields(user_id = %transaction.user_id))]
    async fn create_pending_credit(
        &self,
        transaction: &WalletTransaction,
    ) -> AppResult<WalletTransaction> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!("Failed to acquire connection: {}", e);
            AppError::Pool(format!("Failed to acquire connection: {}", e))
        })?;

        ensure_wallet(&mut conn, transaction.user_id).await?;
        let created = insert_transaction(&mut conn, transaction).await?;

        info!(
            "Pending credit {} of {} coins created for {}",
            created.transaction_id.as_deref().unwrap_or_default(),
            created.amount,
            created.user_id
        );

        Ok(created)
    }

    #[instrument(skip(self))]
    async fn complete_pending_credit(&self, order_id: &str) -> AppResult<PendingCreditOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let query = format!(
            r#"
            SELECT {}
            FROM wallet_transactions
            WHERE transaction_id = $1 AND transaction_type = 'credit'
            FOR UPDATE
            "#,
            TRANSACTION_COLUMNS
        );

        let pending: WalletTransaction = sqlx::query_as::<sqlx::Postgres, TransactionRow>(&query)
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to lock pending credit {}: {}", order_id, e);
                AppError::Database(format!("Failed to load order: {}", e))
            })?
            .ok_or_else(|| AppError::NotFound(format!("Recharge order {}", order_id)))?
            .into();

        if !pending.is_pending() {
            debug!("Recharge order {} already completed", order_id);
            return Ok(PendingCreditOutcome::AlreadyCompleted {
                transaction: pending,
            });
        }

        ensure_wallet(&mut tx, pending.user_id).await?;
        let wallet = lock_wallet(&mut tx, pending.user_id).await?;
        let (wallet, _) = apply_delta_locked(&mut tx, &wallet, pending.amount, None).await?;

        let query = format!(
            r#"
            UPDATE wallet_transactions
            SET status = 'completed',
                balance_after = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );

        let completed: WalletTransaction = sqlx::query_as::<sqlx::Postgres, TransactionRow>(&query)
            .bind(pending.id)
            .bind(wallet.coin_balance)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to complete order {}: {}", order_id, e);
                AppError::Database(format!("Failed to complete order: {}", e))
            })?
            .into();

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Recharge order {} credited {} coins to {}",
            order_id, completed.amount, completed.user_id
        );

        Ok(PendingCreditOutcome::Completed {
            transaction: completed,
            wallet,
        })
    }
}

/// Helper struct for mapping wallet rows
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct WalletRow {
    user_id: Uuid,
    coin_balance: i64,
    total_earned: Decimal,
    total_spent: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Self {
            user_id: row.user_id,
            coin_balance: row.coin_balance,
            total_earned: row.total_earned,
            total_spent: row.total_spent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Helper struct for mapping ledger rows
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    amount: i64,
    transaction_type: String,
    description: String,
    status: String,
    transaction_id: Option<String>,
    call_id: Option<String>,
    balance_after: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TransactionRow> for WalletTransaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            transaction_type: TransactionType::from_str(&row.transaction_type)
                .unwrap_or(TransactionType::Credit),
            description: row.description,
            status: TransactionStatus::from_str(&row.status).unwrap_or_default(),
            transaction_id: row.transaction_id,
            call_id: row.call_id,
            balance_after: row.balance_after,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_row_conversion() {
        let row = TransactionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: 300,
            transaction_type: "call_payment".into(),
            description: "Video call".into(),
            status: "completed".into(),
            transaction_id: None,
            call_id: Some("call-1".into()),
            balance_after: Some(700),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let tx: WalletTransaction = row.into();
        assert_eq!(tx.transaction_type, TransactionType::CallPayment);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.call_id.as_deref(), Some("call-1"));
    }

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/coincall".to_string());
        let pool = crate::create_pool(&url, Some(5)).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn seed_user(pool: &PgPool) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, phone) VALUES ($1, $2)")
            .bind(id)
            .bind(format!("+1{}", id.as_u128() % 10_000_000_000))
            .execute(pool)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_adjust_balance_floors_and_audits() {
        let pool = pool().await;
        let repo = PgWalletRepository::new(pool.clone());
        let user = seed_user(&pool).await;

        repo.get_or_create(user).await.unwrap();
        let credit = LedgerEntry::new(TransactionType::Credit, "Top up");
        let wallet = repo.adjust_balance(user, 100, Some(&credit)).await.unwrap();
        assert_eq!(wallet.coin_balance, 100);

        let debit = LedgerEntry::new(TransactionType::CallPayment, "Call").with_call("c-1");
        let wallet = repo.adjust_balance(user, -250, Some(&debit)).await.unwrap();
        assert_eq!(wallet.coin_balance, 0);
        assert_eq!(wallet.total_spent, Decimal::from(100));

        let (entries, total) = repo
            .list_transactions(user, &TransactionFilter::call_entries(), &Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(entries[0].amount, 100);
        assert_eq!(entries[0].balance_after, Some(0));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_pending_credit_completes_once() {
        let pool = pool().await;
        let repo = PgWalletRepository::new(pool.clone());
        let user = seed_user(&pool).await;
        let order = format!("order-{}", Uuid::new_v4());

        let pending = WalletTransaction::pending_credit(user, 500, &order, "Recharge");
        repo.create_pending_credit(&pending).await.unwrap();

        let first = repo.complete_pending_credit(&order).await.unwrap();
        assert!(matches!(first, PendingCreditOutcome::Completed { .. }));

        let second = repo.complete_pending_credit(&order).await.unwrap();
        assert!(matches!(second, PendingCreditOutcome::AlreadyCompleted { .. }));

        let wallet = repo.find_by_user(user).await.unwrap().unwrap();
        assert_eq!(wallet.coin_balance, 500);
    }
}
