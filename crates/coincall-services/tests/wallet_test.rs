//! Wallet ledger tests against in-memory repositories

mod common;

use common::MemoryStore;
use coincall_core::{
    models::{LedgerEntry, PendingCreditOutcome, TransactionStatus, TransactionType},
    traits::{Pagination, TransactionFilter},
    AppError,
};
use coincall_services::WalletService;
use std::sync::Arc;
use uuid::Uuid;

fn service() -> (Arc<MemoryStore>, WalletService) {
    let store = Arc::new(MemoryStore::default());
    let service = WalletService::new(store.clone());
    (store, service)
}

#[tokio::test]
async fn test_wallet_created_on_first_access() {
    let (_, service) = service();
    let user = Uuid::new_v4();

    assert!(matches!(
        service.get_balance(user).await,
        Err(AppError::WalletNotFound(_))
    ));

    let wallet = service.get_or_create(user).await.unwrap();
    assert_eq!(wallet.coin_balance, 0);
    assert_eq!(service.get_balance(user).await.unwrap(), 0);
}

#[tokio::test]
async fn test_adjust_balance_floors_at_zero() {
    let (store, service) = service();
    let user = Uuid::new_v4();
    store.set_balance(user, 50);

    let entry = LedgerEntry::new(TransactionType::Debit, "manual correction");
    let wallet = service
        .adjust_balance(user, -80, Some(&entry))
        .await
        .unwrap();
    assert_eq!(wallet.coin_balance, 0);

    let (entries, total) = service
        .list_transactions(user, &TransactionFilter::default(), &Pagination::new(1, 10))
        .await
        .unwrap();
    assert_eq!(total, 1);
    // Only the coins actually removed are recorded
    assert_eq!(entries[0].amount, 50);
    assert_eq!(entries[0].balance_after, Some(0));
}

#[tokio::test]
async fn test_recharge_confirmation_is_idempotent() {
    let (store, service) = service();
    let user = Uuid::new_v4();

    let order = service.create_recharge_order(user, 500).await.unwrap();
    assert_eq!(order.status, TransactionStatus::Pending);
    assert_eq!(store.balance(user), 0);

    let order_id = order.transaction_id.clone().unwrap();
    assert!(order_id.starts_with("order_"));

    match service.confirm_recharge(&order_id).await.unwrap() {
        PendingCreditOutcome::Completed { wallet, transaction } => {
            assert_eq!(wallet.coin_balance, 500);
            assert_eq!(transaction.status, TransactionStatus::Completed);
        }
        other => panic!("unexpected {:?}", other),
    }

    assert!(matches!(
        service.confirm_recharge(&order_id).await.unwrap(),
        PendingCreditOutcome::AlreadyCompleted { .. }
    ));
    assert_eq!(store.balance(user), 500);

    assert!(matches!(
        service.confirm_recharge("order_unknown").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_recharge_rejects_non_positive_amounts() {
    let (_, service) = service();

    assert!(matches!(
        service.create_recharge_order(Uuid::new_v4(), 0).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_transaction_type_filter() {
    let (store, service) = service();
    let user = Uuid::new_v4();
    store.set_balance(user, 1000);

    let payment = LedgerEntry::new(TransactionType::CallPayment, "call").with_call("call-1");
    let debit = LedgerEntry::new(TransactionType::Debit, "manual");
    service.adjust_balance(user, -100, Some(&payment)).await.unwrap();
    service.adjust_balance(user, -10, Some(&debit)).await.unwrap();

    let filter = TransactionFilter {
        types: WalletService::parse_type_filter(Some("call_payment,call_earning")).unwrap(),
        call_id: None,
    };
    let (entries, total) = service
        .list_transactions(user, &filter, &Pagination::new(1, 10))
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(entries[0].call_id.as_deref(), Some("call-1"));

    let (_, total) = service
        .list_transactions(user, &TransactionFilter::call_entries(), &Pagination::new(1, 10))
        .await
        .unwrap();
    assert_eq!(total, 1);

    let wallet = store.wallet(user).unwrap();
    assert_eq!(wallet.coin_balance, 890);
}
