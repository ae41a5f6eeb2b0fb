//! In-memory collaborators for service tests
//!
//! One mutex guards the whole store, so every repository method is atomic
//! the way the PostgreSQL implementations are.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use coincall_core::{
    models::{
        end_reason, CallConfig, CallConfigUpdate, CallEvent, CallSession, CallStatus, Gender,
        LedgerEntry, MissedCall, MissedReason, PendingCreditOutcome, SettleAttempt, TransactionStatus,
        User, UserStatus, UserTier, Wallet, WalletTransaction,
    },
    traits::{
        CallConfigSource, CallHistoryFilter, CallSessionRepository, MissedCallRepository,
        Notifier, Pagination, SettlementPlanner, TransactionFilter, UserRepository,
        WalletRepository,
    },
    AppError, AppResult,
};
use coincall_services::{BillingRules, CallService, GenderDirectionPolicy};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<WalletTransaction>,
    sessions: HashMap<String, CallSession>,
    missed: Vec<MissedCall>,
    config: Option<CallConfig>,
}

/// Every repository the call service needs, backed by one mutex
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_next_settlement: AtomicBool,
}

pub fn default_config() -> CallConfig {
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

impl MemoryStore {
    pub fn with_config(config: Option<CallConfig>) -> Self {
        let store = Self::default();
        store.state.lock().config = config;
        store
    }

    pub fn insert_user(&self, user: User) {
        self.state.lock().users.insert(user.id, user);
    }

    pub fn update_user(&self, id: Uuid, f: impl FnOnce(&mut User)) {
        if let Some(user) = self.state.lock().users.get_mut(&id) {
            f(user);
        }
    }

    pub fn set_balance(&self, user_id: Uuid, coins: i64) {
        let mut state = self.state.lock();
        let wallet = state
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id));
        wallet.coin_balance = coins;
    }

    pub fn balance(&self, user_id: Uuid) -> i64 {
        self.state
            .lock()
            .wallets
            .get(&user_id)
            .map(|w| w.coin_balance)
            .unwrap_or(0)
    }

    pub fn wallet(&self, user_id: Uuid) -> Option<Wallet> {
        self.state.lock().wallets.get(&user_id).cloned()
    }

    pub fn session(&self, call_id: &str) -> Option<CallSession> {
        self.state.lock().sessions.get(call_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn missed_calls(&self) -> Vec<MissedCall> {
        self.state.lock().missed.clone()
    }

    pub fn transactions_for_call(&self, call_id: &str) -> Vec<WalletTransaction> {
        self.state
            .lock()
            .transactions
            .iter()
            .filter(|t| t.call_id.as_deref() == Some(call_id))
            .cloned()
            .collect()
    }

    /// Move the session's clock back as if `secs` had already passed
    pub fn backdate(&self, call_id: &str, secs: i64) {
        let mut state = self.state.lock();
        if let Some(session) = state.sessions.get_mut(call_id) {
            let shift = Duration::seconds(secs);
            session.start_time -= shift;
            session.connected_at = session.connected_at.map(|c| c - shift);
        }
    }

    pub fn fail_next_settlement(&self) {
        self.fail_next_settlement.store(true, Ordering::SeqCst);
    }

    fn apply_delta(
        state: &mut State,
        user_id: Uuid,
        delta: i64,
        entry: Option<&LedgerEntry>,
    ) -> AppResult<Wallet> {
        let wallet = state
            .wallets
            .get_mut(&user_id)
            .ok_or_else(|| AppError::WalletNotFound(user_id.to_string()))?;

        let new_balance = wallet.floored_balance(delta);
        let applied = new_balance - wallet.coin_balance;
        wallet.coin_balance = new_balance;
        wallet.updated_at = Utc::now();

        if let Some(entry) = entry {
            if entry.transaction_type.counts_as_earning() {
                wallet.total_earned += Decimal::from(applied.abs());
            }
            if entry.transaction_type.counts_as_spending() {
                wallet.total_spent += Decimal::from(applied.abs());
            }
        }

        let wallet = wallet.clone();
        if let Some(entry) = entry {
            state
                .transactions
                .push(WalletTransaction::completed(user_id, applied, entry, new_balance));
        }

        Ok(wallet)
    }
}

fn paginate<T: Clone>(items: &[T], pagination: &Pagination) -> Vec<T> {
    items
        .iter()
        .skip(pagination.offset() as usize)
        .take(pagination.limit() as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> AppResult<Vec<User>> {
        let state = self.state.lock();
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }
}

#[async_trait]
impl WalletRepository for MemoryStore {
    async fn find_by_user(&self, user_id: Uuid) -> AppResult<Option<Wallet>> {
        Ok(self.state.lock().wallets.get(&user_id).cloned())
    }

    async fn get_or_create(&self, user_id: Uuid) -> AppResult<Wallet> {
        let mut state = self.state.lock();
        Ok(state
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id))
            .clone())
    }

    async fn adjust_balance(
        &self,
        user_id: Uuid,
        delta: i64,
        entry: Option<&LedgerEntry>,
    ) -> AppResult<Wallet> {
        let mut state = self.state.lock();
        Self::apply_delta(&mut state, user_id, delta, entry)
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
        pagination: &Pagination,
    ) -> AppResult<(Vec<WalletTransaction>, i64)> {
        let state = self.state.lock();
        let mut matching: Vec<WalletTransaction> = state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .filter(|t| filter.types.is_empty() || filter.types.contains(&t.transaction_type))
            .filter(|t| filter.call_id.is_none() || t.call_id == filter.call_id)
            .cloned()
            .collect();
        matching.reverse();

        let total = matching.len() as i64;
        Ok((paginate(&matching, pagination), total))
    }

    async fn create_pending_credit(
        &self,
        transaction: &WalletTransaction,
    ) -> AppResult<WalletTransaction> {
        let mut state = self.state.lock();
        if state
            .transactions
            .iter()
            .any(|t| t.transaction_id.is_some() && t.transaction_id == transaction.transaction_id)
        {
            return Err(AppError::Conflict("Duplicate order id".to_string()));
        }

        state
            .wallets
            .entry(transaction.user_id)
            .or_insert_with(|| Wallet::new(transaction.user_id));
        state.transactions.push(transaction.clone());
        Ok(transaction.clone())
    }

    async fn complete_pending_credit(&self, order_id: &str) -> AppResult<PendingCreditOutcome> {
        let mut state = self.state.lock();
        let index = state
            .transactions
            .iter()
            .position(|t| t.transaction_id.as_deref() == Some(order_id))
            .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))?;

        let pending = state.transactions[index].clone();
        if !pending.is_pending() {
            return Ok(PendingCreditOutcome::AlreadyCompleted {
                transaction: pending,
            });
        }

        let wallet = Self::apply_delta(&mut state, pending.user_id, pending.amount, None)?;

        let tx = &mut state.transactions[index];
        tx.status = TransactionStatus::Completed;
        tx.balance_after = Some(wallet.coin_balance);
        tx.updated_at = Utc::now();

        Ok(PendingCreditOutcome::Completed {
            transaction: tx.clone(),
            wallet,
        })
    }
}

#[async_trait]
impl CallSessionRepository for MemoryStore {
    async fn create(&self, session: &CallSession) -> AppResult<CallSession> {
        let mut state = self.state.lock();
        if state.sessions.contains_key(&session.call_id) {
            return Err(AppError::Conflict(session.call_id.clone()));
        }
        state
            .sessions
            .insert(session.call_id.clone(), session.clone());
        Ok(session.clone())
    }

    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CallSession>> {
        Ok(self.state.lock().sessions.get(call_id).cloned())
    }

    async fn mark_connected(
        &self,
        call_id: &str,
        connected_at: DateTime<Utc>,
    ) -> AppResult<Option<CallSession>> {
        let mut state = self.state.lock();
        Ok(state.sessions.get_mut(call_id).and_then(|s| {
            if s.status != CallStatus::Initiated {
                return None;
            }
            s.status = CallStatus::Connected;
            s.connected_at = Some(connected_at);
            s.updated_at = Utc::now();
            Some(s.clone())
        }))
    }

    async fn mark_ended(
        &self,
        call_id: &str,
        end_time: DateTime<Utc>,
        duration_minutes: i64,
        reason: Option<&str>,
    ) -> AppResult<Option<CallSession>> {
        let mut state = self.state.lock();
        Ok(state.sessions.get_mut(call_id).and_then(|s| {
            if !s.status.is_active() || s.payment_processed {
                return None;
            }
            s.status = CallStatus::Ended;
            s.end_time = Some(end_time);
            s.duration_minutes = duration_minutes;
            if let Some(r) = reason {
                s.end_reason = Some(r.to_string());
            }
            s.updated_at = Utc::now();
            Some(s.clone())
        }))
    }

    async fn mark_failed(
        &self,
        call_id: &str,
        reason: MissedReason,
        end_time: DateTime<Utc>,
    ) -> AppResult<Option<CallSession>> {
        let mut state = self.state.lock();
        Ok(state.sessions.get_mut(call_id).and_then(|s| {
            if s.status != CallStatus::Initiated || s.payment_processed {
                return None;
            }
            s.status = CallStatus::Failed;
            s.missed_reason = Some(reason);
            s.end_reason = Some(end_reason::MISSED.to_string());
            s.end_time = Some(end_time);
            s.updated_at = Utc::now();
            Some(s.clone())
        }))
    }

    async fn mark_payment_failed(
        &self,
        call_id: &str,
        duration_minutes: i64,
    ) -> AppResult<Option<CallSession>> {
        let mut state = self.state.lock();
        Ok(state.sessions.get_mut(call_id).and_then(|s| {
            if s.payment_processed {
                return None;
            }
            s.status = CallStatus::Failed;
            s.end_reason = Some(end_reason::PAYMENT_FAILED.to_string());
            s.duration_minutes = duration_minutes;
            s.end_time = Some(s.end_time.unwrap_or_else(Utc::now));
            s.updated_at = Utc::now();
            Some(s.clone())
        }))
    }

    async fn settle_once(
        &self,
        call_id: &str,
        planner: &dyn SettlementPlanner,
    ) -> AppResult<SettleAttempt> {
        let mut state = self.state.lock();

        let session = state
            .sessions
            .get(call_id)
            .cloned()
            .ok_or_else(|| AppError::CallSessionNotFound(call_id.to_string()))?;

        if session.payment_processed {
            return Ok(SettleAttempt::AlreadySettled(session));
        }
        if session.missed_reason.is_some() {
            return Ok(SettleAttempt::NotSettleable(session));
        }
        if self.fail_next_settlement.swap(false, Ordering::SeqCst) {
            return Err(AppError::Database("connection reset".to_string()));
        }

        // Work on a copy so an error leaves the store untouched
        let mut draft = State {
            wallets: state.wallets.clone(),
            ..Default::default()
        };
        draft
            .wallets
            .entry(session.receiver_user_id)
            .or_insert_with(|| Wallet::new(session.receiver_user_id));

        let caller_balance = draft
            .wallets
            .get(&session.caller_user_id)
            .map(|w| w.coin_balance)
            .ok_or_else(|| AppError::WalletNotFound(session.caller_user_id.to_string()))?;

        let plan = planner.plan(&session, caller_balance);

        if plan.coins_deducted > 0 {
            let entry = planner.payment_entry(&session, &plan);
            Self::apply_delta(
                &mut draft,
                session.caller_user_id,
                -plan.coins_deducted,
                Some(&entry),
            )?;
        }
        if plan.monetized && plan.coins_to_receiver > 0 {
            let entry = planner.earning_entry(&session, &plan);
            Self::apply_delta(
                &mut draft,
                session.receiver_user_id,
                plan.coins_to_receiver,
                Some(&entry),
            )?;
        }

        state.wallets = draft.wallets;
        state.transactions.append(&mut draft.transactions);

        let settled = state
            .sessions
            .get_mut(call_id)
            .ok_or_else(|| AppError::CallSessionNotFound(call_id.to_string()))?;
        settled.status = CallStatus::Ended;
        settled.payment_processed = true;
        settled.end_time = Some(plan.ended_at);
        settled.duration_minutes = plan.duration_minutes;
        settled.coins_deducted = plan.coins_deducted;
        settled.coins_to_receiver = plan.coins_to_receiver;
        settled.admin_commission = plan.admin_commission;
        if settled.end_reason.is_none()
            || settled.end_reason.as_deref() == Some(end_reason::PAYMENT_FAILED)
        {
            settled.end_reason = Some(planner.end_reason().to_string());
        }
        settled.updated_at = Utc::now();

        Ok(SettleAttempt::Settled(settled.clone()))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &CallHistoryFilter,
        pagination: &Pagination,
    ) -> AppResult<(Vec<CallSession>, i64)> {
        let state = self.state.lock();
        let mut matching: Vec<CallSession> = state
            .sessions
            .values()
            .filter(|s| s.is_participant(user_id))
            .filter(|s| filter.call_type.map_or(true, |t| s.call_type == t))
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        Ok((paginate(&matching, pagination), total))
    }

    async fn list_active_for_user(&self, user_id: Uuid) -> AppResult<Vec<CallSession>> {
        let state = self.state.lock();
        Ok(state
            .sessions
            .values()
            .filter(|s| s.is_participant(user_id) && s.status.is_active())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MissedCallRepository for MemoryStore {
    async fn create(&self, missed: &MissedCall) -> AppResult<MissedCall> {
        let mut state = self.state.lock();
        if let Some(existing) = state.missed.iter().find(|m| m.call_id == missed.call_id) {
            return Ok(existing.clone());
        }
        state.missed.push(missed.clone());
        Ok(missed.clone())
    }

    async fn list_for_receiver(
        &self,
        receiver_user_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<(Vec<MissedCall>, i64)> {
        let state = self.state.lock();
        let mut matching: Vec<MissedCall> = state
            .missed
            .iter()
            .filter(|m| m.receiver_user_id == receiver_user_id)
            .cloned()
            .collect();
        matching.reverse();

        let total = matching.len() as i64;
        Ok((paginate(&matching, pagination), total))
    }

    async fn mark_viewed(
        &self,
        call_id: &str,
        receiver_user_id: Uuid,
    ) -> AppResult<Option<MissedCall>> {
        let mut state = self.state.lock();
        Ok(state
            .missed
            .iter_mut()
            .find(|m| m.call_id == call_id && m.receiver_user_id == receiver_user_id)
            .map(|m| {
                m.viewed = true;
                m.clone()
            }))
    }

    async fn mark_notification_sent(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock();
        if let Some(m) = state.missed.iter_mut().find(|m| m.id == id) {
            m.notification_sent = true;
        }
        Ok(())
    }
}

#[async_trait]
impl CallConfigSource for MemoryStore {
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

/// Collects every event instead of sending it
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<CallEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &CallEvent) -> AppResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: CallService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Some(default_config()))
    }

    pub fn with_config(config: Option<CallConfig>) -> Self {
        let store = Arc::new(MemoryStore::with_config(config));
        let notifier = Arc::new(RecordingNotifier::default());

        let service = CallService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            notifier.clone(),
        )
        .with_monetization(Arc::new(GenderDirectionPolicy::default()))
        .with_rules(BillingRules::default());

        Self {
            store,
            notifier,
            service,
        }
    }

    pub fn add_user(&self, gender: Gender, tier: UserTier) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            phone: format!("+1555{}", &Uuid::new_v4().simple().to_string()[..7]),
            gender,
            tier,
            is_online: true,
            status: UserStatus::Active,
            ..Default::default()
        };
        let id = user.id;
        self.store.insert_user(user);
        id
    }

    /// Paying caller with `coins` and an online earning receiver
    pub fn pair(&self, coins: i64) -> (Uuid, Uuid) {
        let caller = self.add_user(Gender::Male, UserTier::Standard);
        let receiver = self.add_user(Gender::Female, UserTier::Standard);
        self.store.set_balance(caller, coins);
        (caller, receiver)
    }
}

/// Let spawned notification tasks run
pub async fn drain_tasks() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
