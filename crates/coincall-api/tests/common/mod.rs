//! Test fixtures for handler tests
//!
//! `FixtureStore` keeps users, wallets, sessions and missed calls in memory.
//! Settlement is exercised by the service crate's tests; here it always
//! reports a database error.

#![allow(dead_code)]

use actix_web::web;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coincall_auth::JwtService;
use coincall_core::{
    models::{
        CallConfig, CallConfigUpdate, CallEvent, CallSession, Gender, LedgerEntry, MissedCall,
        MissedReason, PendingCreditOutcome, SettleAttempt, User, UserRole, UserStatus, UserTier,
        Wallet, WalletTransaction,
    },
    traits::{
        CallConfigSource, CallHistoryFilter, CallSessionRepository, MissedCallRepository,
        Notifier, Pagination, SettlementPlanner, TransactionFilter, UserRepository,
        WalletRepository,
    },
    AppError, AppResult,
};
use coincall_services::{CallService, WalletService};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const JWT_SECRET: &str = "handler-test-secret";

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    wallets: HashMap<Uuid, Wallet>,
    sessions: HashMap<String, CallSession>,
    missed: Vec<MissedCall>,
    config: Option<CallConfig>,
}

#[derive(Default)]
pub struct FixtureStore {
    state: Mutex<State>,
}

pub fn pricing() -> CallConfig {
    CallConfig {
        video_rate_standard: 100,
        video_rate_gstar: 150,
        audio_rate_standard: 60,
        audio_rate_gstar: 90,
        message_cost: 10,
        admin_commission_percent: dec!(20),
        gstar_commission_percent: dec!(15),
        gicon_commission_percent: dec!(10),
        coin_to_currency_ratio: dec!(0.01),
        version: 1,
        updated_by: None,
        updated_at: Utc::now(),
    }
}

impl FixtureStore {
    pub fn with_pricing() -> Self {
        let store = Self::default();
        store.state.lock().config = Some(pricing());
        store
    }

    pub fn add_user(&self, gender: Gender, online: bool, coins: i64) -> Uuid {
        let id = Uuid::new_v4();
        let mut state = self.state.lock();
        state.users.insert(
            id,
            User {
                id,
                phone: format!("+1555{}", &id.simple().to_string()[..7]),
                gender,
                tier: UserTier::Standard,
                status: UserStatus::Active,
                is_online: online,
                ..Default::default()
            },
        );
        let mut wallet = Wallet::new(id);
        wallet.coin_balance = coins;
        state.wallets.insert(id, wallet);
        id
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }
}

#[async_trait]
impl UserRepository for FixtureStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> AppResult<Vec<User>> {
        let state = self.state.lock();
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }
}

#[async_trait]
impl WalletRepository for FixtureStore {
    async fn find_by_user(&self, user_id: Uuid) -> AppResult<Option<Wallet>> {
        Ok(self.state.lock().wallets.get(&user_id).cloned())
    }

    async fn get_or_create(&self, user_id: Uuid) -> AppResult<Wallet> {
        Ok(self
            .state
            .lock()
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id))
            .clone())
    }

    async fn adjust_balance(
        &self,
        user_id: Uuid,
        delta: i64,
        _entry: Option<&LedgerEntry>,
    ) -> AppResult<Wallet> {
        let mut state = self.state.lock();
        let wallet = state
            .wallets
            .get_mut(&user_id)
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;
        wallet.coin_balance = wallet.floored_balance(delta);
        Ok(wallet.clone())
    }

    async fn list_transactions(
        &self,
        _user_id: Uuid,
        _filter: &TransactionFilter,
        _pagination: &Pagination,
    ) -> AppResult<(Vec<WalletTransaction>, i64)> {
        Ok((Vec::new(), 0))
    }

    async fn create_pending_credit(
        &self,
        transaction: &WalletTransaction,
    ) -> AppResult<WalletTransaction> {
        Ok(transaction.clone())
    }

    async fn complete_pending_credit(&self, order_id: &str) -> AppResult<PendingCreditOutcome> {
        Err(AppError::NotFound(format!("Order {}", order_id)))
    }
}

#[async_trait]
impl CallSessionRepository for FixtureStore {
    async fn create(&self, session: &CallSession) -> AppResult<CallSession> {
        self.state
            .lock()
            .sessions
            .insert(session.call_id.clone(), session.clone());
        Ok(session.clone())
    }

    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CallSession>> {
        Ok(self.state.lock().sessions.get(call_id).cloned())
    }

    async fn mark_connected(
        &self,
        _call_id: &str,
        _connected_at: DateTime<Utc>,
    ) -> AppResult<Option<CallSession>> {
        Ok(None)
    }

    async fn mark_ended(
        &self,
        _call_id: &str,
        _end_time: DateTime<Utc>,
        _duration_minutes: i64,
        _end_reason: Option<&str>,
    ) -> AppResult<Option<CallSession>> {
        Ok(None)
    }

    async fn mark_failed(
        &self,
        _call_id: &str,
        _reason: MissedReason,
        _end_time: DateTime<Utc>,
    ) -> AppResult<Option<CallSession>> {
        Ok(None)
    }

    async fn mark_payment_failed(
        &self,
        _call_id: &str,
        _duration_minutes: i64,
    ) -> AppResult<Option<CallSession>> {
        Ok(None)
    }

    async fn settle_once(
        &self,
        _call_id: &str,
        _planner: &dyn SettlementPlanner,
    ) -> AppResult<SettleAttempt> {
        Err(AppError::Database("settlement unavailable in fixtures".to_string()))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        _filter: &CallHistoryFilter,
        _pagination: &Pagination,
    ) -> AppResult<(Vec<CallSession>, i64)> {
        let sessions: Vec<CallSession> = self
            .state
            .lock()
            .sessions
            .values()
            .filter(|s| s.is_participant(user_id))
            .cloned()
            .collect();
        let total = sessions.len() as i64;
        Ok((sessions, total))
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> AppResult<Vec<CallSession>> {
        Ok(self
            .state
            .lock()
            .sessions
            .values()
            .filter(|s| s.is_participant(user_id) && s.status.is_active())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MissedCallRepository for FixtureStore {
    async fn create(&self, missed: &MissedCall) -> AppResult<MissedCall> {
        self.state.lock().missed.push(missed.clone());
        Ok(missed.clone())
    }

    async fn list_for_receiver(
        &self,
        receiver_user_id: Uuid,
        _pagination: &Pagination,
    ) -> AppResult<(Vec<MissedCall>, i64)> {
        let missed: Vec<MissedCall> = self
            .state
            .lock()
            .missed
            .iter()
            .filter(|m| m.receiver_user_id == receiver_user_id)
            .cloned()
            .collect();
        let total = missed.len() as i64;
        Ok((missed, total))
    }

    async fn mark_viewed(
        &self,
        _call_id: &str,
        _receiver_user_id: Uuid,
    ) -> AppResult<Option<MissedCall>> {
        Ok(None)
    }

    async fn mark_notification_sent(&self, _id: Uuid) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl CallConfigSource for FixtureStore {
    async fn current(&self) -> AppResult<CallConfig> {
        self.state
            .lock()
            .config
            .clone()
            .ok_or(AppError::ConfigurationMissing)
    }

    async fn update(
        &self,
        update: &CallConfigUpdate,
        updated_by: Option<Uuid>,
    ) -> AppResult<CallConfig> {
        let mut state = self.state.lock();
        let next = state
            .config
            .as_ref()
            .ok_or(AppError::ConfigurationMissing)?
            .apply(update, updated_by);
        state.config = Some(next.clone());
        Ok(next)
    }
}

pub struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _event: &CallEvent) -> AppResult<()> {
        Ok(())
    }
}

/// Application data shared by every test app
pub struct TestContext {
    pub store: Arc<FixtureStore>,
    pub jwt: Arc<JwtService>,
    pub calls: web::Data<CallService>,
    pub wallets: web::Data<WalletService>,
    pub pricing: web::Data<dyn CallConfigSource>,
}

impl TestContext {
    pub fn new(store: FixtureStore) -> Self {
        let store = Arc::new(store);
        let calls = CallService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(SilentNotifier),
        );
        let pricing: Arc<dyn CallConfigSource> = store.clone();

        Self {
            jwt: Arc::new(JwtService::new(JWT_SECRET, 3600)),
            calls: web::Data::new(calls),
            wallets: web::Data::new(WalletService::new(store.clone())),
            pricing: web::Data::from(pricing),
            store,
        }
    }

    pub fn bearer(&self, user_id: Uuid, role: UserRole) -> (String, String) {
        let token = self
            .jwt
            .create_token_for_user(user_id, role)
            .expect("token");
        ("Authorization".to_string(), format!("Bearer {}", token))
    }
}
