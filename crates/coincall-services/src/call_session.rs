//! Call session service
//!
//! Drives one call from the feasibility check to settlement:
//! - Pre-check balance and receiver reachability before a session exists
//! - Track lifecycle transitions reported by either participant
//! - Recompute remaining time against the caller's live balance
//! - Settle exactly once, whoever asks first (end, check-time, retries)
//!
//! Every status change is a conditional update in the repository, so racing
//! requests resolve to a single winner without locks held here.

use chrono::Utc;
use coincall_core::{
    models::{
        end_reason, CallEvent, CallSession, CallStatus, CallType, MissedCall, MissedReason,
        SettleAttempt, SettlementSummary, User, UserSummary, WalletTransaction,
    },
    traits::{
        CallConfigSource, CallHistoryFilter, CallSessionRepository, MissedCallRepository,
        Notifier, Pagination, TransactionFilter, UserRepository, WalletRepository,
    },
    AppError, AppResult,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::constants::SECONDS_PER_MINUTE;
use crate::monetization::{GenderDirectionPolicy, MonetizationPolicy};
use crate::notifier::dispatch;
use crate::pricing::PricingResolver;
use crate::settlement::{ceil_minutes, BillingRules, CallBillingPlanner};

/// Result of a call feasibility check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feasibility {
    pub can_make_call: bool,
    pub caller_balance: i64,
    pub coins_per_minute: i64,
    pub max_duration_minutes: i64,
    pub receiver_available: bool,
    pub call_type: CallType,
}

/// Result of `start`
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// A billable session was created
    Started(CallSession),
    /// The receiver could not be reached; only a missed call was recorded
    ReceiverUnavailable(MissedCall),
}

/// Result of `check_time`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCheck {
    pub call_id: String,
    pub remaining_minutes: i64,
    pub max_allowed_minutes: i64,
    pub elapsed_minutes: i64,
    pub status: CallStatus,
    pub coins_per_minute: i64,
    /// The check ran out of time and settled the call
    pub call_ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementSummary>,
}

/// Status a participant may report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedStatus {
    Connected,
    Ended,
    Failed,
    Missed,
}

impl RequestedStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "connected" => Some(RequestedStatus::Connected),
            "ended" => Some(RequestedStatus::Ended),
            "failed" => Some(RequestedStatus::Failed),
            "missed" => Some(RequestedStatus::Missed),
            _ => None,
        }
    }
}

/// Client-reported status change
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: RequestedStatus,
    pub missed_reason: Option<MissedReason>,
    pub end_reason: Option<String>,
}

/// Result of `update_status`
#[derive(Debug, Clone)]
pub enum StatusOutcome {
    Session(CallSession),
    Missed {
        session: CallSession,
        missed_call: MissedCall,
    },
}

/// Result of `end`
#[derive(Debug, Clone)]
pub struct EndOutcome {
    pub session: CallSession,
    /// Payment had been applied by an earlier request
    pub already_settled: bool,
}

impl EndOutcome {
    pub fn summary(&self) -> SettlementSummary {
        self.session.settlement()
    }

    pub fn call_ended(&self) -> bool {
        self.session.status == CallStatus::Ended
    }
}

/// A session as seen by one participant
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub session: CallSession,
    pub is_outgoing: bool,
    pub counterpart: Option<UserSummary>,
}

/// Call session orchestration
pub struct CallService {
    sessions: Arc<dyn CallSessionRepository>,
    missed_calls: Arc<dyn MissedCallRepository>,
    users: Arc<dyn UserRepository>,
    wallets: Arc<dyn WalletRepository>,
    pricing: Arc<dyn CallConfigSource>,
    notifier: Arc<dyn Notifier>,
    monetization: Arc<dyn MonetizationPolicy>,
    rules: BillingRules,
}

impl CallService {
    /// Create a call service with the default monetization policy and billing rules
    pub fn new(
        sessions: Arc<dyn CallSessionRepository>,
        missed_calls: Arc<dyn MissedCallRepository>,
        users: Arc<dyn UserRepository>,
        wallets: Arc<dyn WalletRepository>,
        pricing: Arc<dyn CallConfigSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sessions,
            missed_calls,
            users,
            wallets,
            pricing,
            notifier,
            monetization: Arc::new(GenderDirectionPolicy::default()),
            rules: BillingRules::default(),
        }
    }

    pub fn with_monetization(mut self, policy: Arc<dyn MonetizationPolicy>) -> Self {
        self.monetization = policy;
        self
    }

    pub fn with_rules(mut self, rules: BillingRules) -> Self {
        self.rules = rules;
        self
    }

    async fn load_user(&self, user_id: Uuid) -> AppResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    async fn load_session_for(&self, user_id: Uuid, call_id: &str) -> AppResult<CallSession> {
        let session = self
            .sessions
            .find_by_call_id(call_id)
            .await?
            .ok_or_else(|| AppError::CallSessionNotFound(call_id.to_string()))?;

        if !session.is_participant(user_id) {
            warn!(
                call_id = %call_id,
                user_id = %user_id,
                "User is not a participant of the call"
            );
            return Err(AppError::NotParticipant(call_id.to_string()));
        }

        Ok(session)
    }

    fn ensure_distinct(caller_id: Uuid, receiver_id: Uuid) -> AppResult<()> {
        if caller_id == receiver_id {
            return Err(AppError::Validation("Cannot call yourself".to_string()));
        }
        Ok(())
    }

    /// Why the receiver cannot take a call right now, if anything
    fn unreachable_reason(receiver: &User) -> Option<MissedReason> {
        if receiver.is_blocked() {
            Some(MissedReason::Inactive)
        } else if !receiver.is_online {
            Some(MissedReason::Offline)
        } else if receiver.do_not_disturb {
            Some(MissedReason::Dnd)
        } else {
            None
        }
    }

    fn notify(&self, event: CallEvent) {
        dispatch(self.notifier.clone(), event);
    }

    /// Notify the receiver of a missed call and flag it once delivered
    fn notify_missed(&self, missed: &MissedCall) {
        let notifier = self.notifier.clone();
        let missed_calls = self.missed_calls.clone();
        let event = CallEvent::missed(missed);
        let id = missed.id;

        tokio::spawn(async move {
            match notifier.notify(&event).await {
                Ok(()) => {
                    if let Err(e) = missed_calls.mark_notification_sent(id).await {
                        warn!(call_id = %event.call_id, error = %e, "Failed to flag missed call notification");
                    }
                }
                Err(e) => {
                    warn!(call_id = %event.call_id, error = %e, "Missed call notification failed");
                }
            }
        });
    }

    /// Check whether the caller could start a call right now
    ///
    /// Never mutates anything except lazily creating the caller's wallet.
    #[instrument(skip(self))]
    pub async fn check_feasibility(
        &self,
        caller_id: Uuid,
        receiver_id: Uuid,
        call_type: CallType,
    ) -> AppResult<Feasibility> {
        Self::ensure_distinct(caller_id, receiver_id)?;

        let caller = self.load_user(caller_id).await?;
        let receiver = self.load_user(receiver_id).await?;

        let config = self.pricing.current().await?;
        let pricing = PricingResolver::resolve(&config, call_type, receiver.tier);

        let wallet = self.wallets.get_or_create(caller_id).await?;
        let receiver_available = Self::unreachable_reason(&receiver).is_none();
        let can_make_call = !caller.is_blocked()
            && receiver_available
            && wallet.coin_balance >= pricing.coins_per_minute;

        debug!(
            balance = wallet.coin_balance,
            coins_per_minute = pricing.coins_per_minute,
            receiver_available,
            "Feasibility computed"
        );

        Ok(Feasibility {
            can_make_call,
            caller_balance: wallet.coin_balance,
            coins_per_minute: pricing.coins_per_minute,
            max_duration_minutes: PricingResolver::max_allowed_minutes(
                call_type,
                wallet.coin_balance,
                pricing.coins_per_minute,
            ),
            receiver_available,
            call_type,
        })
    }

    /// Start a call
    ///
    /// # Errors
    ///
    /// - `Validation` when calling yourself
    /// - `AccountBlocked` for a blocked caller
    /// - `InsufficientBalance` when the caller cannot pay one unit
    /// - `ConfigurationMissing` when no pricing exists
    #[instrument(skip(self))]
    pub async fn start(
        &self,
        caller_id: Uuid,
        receiver_id: Uuid,
        call_type: CallType,
    ) -> AppResult<StartOutcome> {
        Self::ensure_distinct(caller_id, receiver_id)?;

        let caller = self.load_user(caller_id).await?;
        if caller.is_blocked() {
            return Err(AppError::AccountBlocked(caller_id.to_string()));
        }
        let receiver = self.load_user(receiver_id).await?;

        let config = self.pricing.current().await?;
        let pricing = PricingResolver::resolve(&config, call_type, receiver.tier);

        let wallet = self.wallets.get_or_create(caller_id).await?;
        if wallet.coin_balance < pricing.coins_per_minute {
            info!(
                caller = %caller_id,
                balance = wallet.coin_balance,
                required = pricing.coins_per_minute,
                "Call rejected for insufficient balance"
            );
            return Err(AppError::InsufficientBalance {
                required: pricing.coins_per_minute,
                available: wallet.coin_balance,
            });
        }

        let max_allowed = PricingResolver::max_allowed_minutes(
            call_type,
            wallet.coin_balance,
            pricing.coins_per_minute,
        );
        let call_id = Uuid::now_v7().to_string();

        if let Some(reason) = Self::unreachable_reason(&receiver) {
            let missed = MissedCall::new(
                call_id,
                caller_id,
                receiver_id,
                call_type,
                Utc::now(),
                reason,
            );
            let missed = self.missed_calls.create(&missed).await?;

            info!(
                call_id = %missed.call_id,
                reason = %reason,
                "Receiver unavailable, recorded missed call"
            );
            self.notify_missed(&missed);

            return Ok(StartOutcome::ReceiverUnavailable(missed));
        }

        let session = CallSession::initiate(
            call_id,
            caller_id,
            receiver_id,
            call_type,
            &pricing,
            max_allowed,
        );
        let session = self.sessions.create(&session).await?;

        info!(
            call_id = %session.call_id,
            call_type = %call_type,
            coins_per_minute = session.coins_per_minute,
            max_allowed_minutes = session.max_allowed_minutes,
            "Call started"
        );
        self.notify(CallEvent::incoming(&session));

        Ok(StartOutcome::Started(session))
    }

    /// Recompute remaining minutes; settles the call once time runs out
    #[instrument(skip(self))]
    pub async fn check_time(&self, user_id: Uuid, call_id: &str) -> AppResult<TimeCheck> {
        let session = self.load_session_for(user_id, call_id).await?;

        if !session.status.is_active() {
            return Err(AppError::CallAlreadyEnded(call_id.to_string()));
        }

        let now = Utc::now();
        let elapsed = session.elapsed_minutes(now);

        let affordable = self
            .wallets
            .find_by_user(session.caller_user_id)
            .await?
            .map(|w| w.affordable_minutes(session.coins_per_minute))
            .unwrap_or(0);
        let ceiling = self.rules.max_call_duration_secs / SECONDS_PER_MINUTE;

        let remaining = (affordable - elapsed)
            .min(session.max_allowed_minutes - elapsed)
            .min(ceiling - elapsed);

        if remaining > 0 {
            return Ok(TimeCheck {
                call_id: session.call_id.clone(),
                remaining_minutes: remaining,
                max_allowed_minutes: session.max_allowed_minutes,
                elapsed_minutes: elapsed,
                status: session.status,
                coins_per_minute: session.coins_per_minute,
                call_ended: false,
                settlement: None,
            });
        }

        info!(call_id = %call_id, elapsed, affordable, "Call time exhausted, settling");
        let outcome = self.settle(&session, end_reason::TIME_EXPIRED).await?;

        Ok(TimeCheck {
            call_id: outcome.session.call_id.clone(),
            remaining_minutes: 0,
            max_allowed_minutes: outcome.session.max_allowed_minutes,
            elapsed_minutes: elapsed,
            status: outcome.session.status,
            coins_per_minute: outcome.session.coins_per_minute,
            call_ended: outcome.call_ended(),
            settlement: Some(outcome.summary()),
        })
    }

    /// Apply a participant-reported status change
    #[instrument(skip(self, update), fields(status = ?update.status))]
    pub async fn update_status(
        &self,
        user_id: Uuid,
        call_id: &str,
        update: StatusUpdate,
    ) -> AppResult<StatusOutcome> {
        let session = self.load_session_for(user_id, call_id).await?;
        let now = Utc::now();

        match update.status {
            RequestedStatus::Connected => {
                if session.status == CallStatus::Connected {
                    return Ok(StatusOutcome::Session(session));
                }

                let connected = self
                    .sessions
                    .mark_connected(call_id, now)
                    .await?
                    .ok_or_else(|| {
                        AppError::InvalidTransition(format!(
                            "Cannot connect a call that is {}",
                            session.status
                        ))
                    })?;

                info!(call_id = %call_id, "Call connected");
                self.notify(CallEvent::connected(&connected));

                Ok(StatusOutcome::Session(connected))
            }
            RequestedStatus::Ended => {
                if session.status == CallStatus::Ended {
                    return Ok(StatusOutcome::Session(session));
                }

                let duration = session
                    .connected_at
                    .map(|connected_at| {
                        let secs = (now - connected_at)
                            .num_seconds()
                            .clamp(0, self.rules.max_call_duration_secs);
                        ceil_minutes(secs)
                    })
                    .unwrap_or(0);

                let ended = self
                    .sessions
                    .mark_ended(call_id, now, duration, update.end_reason.as_deref())
                    .await?
                    .ok_or_else(|| {
                        AppError::InvalidTransition(format!(
                            "Cannot end a call that is {}",
                            session.status
                        ))
                    })?;

                info!(call_id = %call_id, duration_minutes = duration, "Call end reported");
                Ok(StatusOutcome::Session(ended))
            }
            RequestedStatus::Failed if session.status != CallStatus::Initiated => {
                if session.payment_processed || session.missed_reason.is_some() {
                    return Ok(StatusOutcome::Session(session));
                }

                // The call was answered, so it is billed like any other end
                let reason = update
                    .end_reason
                    .as_deref()
                    .unwrap_or(end_reason::CONNECTION_FAILED);
                info!(call_id = %call_id, reason, "Connected call failed, settling");

                let outcome = self.settle(&session, reason).await?;
                Ok(StatusOutcome::Session(outcome.session))
            }
            RequestedStatus::Failed | RequestedStatus::Missed => {
                if session.status != CallStatus::Initiated {
                    return Err(AppError::InvalidTransition(format!(
                        "Cannot mark a call that is {} as missed",
                        session.status
                    )));
                }

                let reason = update
                    .missed_reason
                    .ok_or_else(|| AppError::MissingField("missedReason".to_string()))?;

                let failed = self
                    .sessions
                    .mark_failed(call_id, reason, now)
                    .await?
                    .ok_or_else(|| {
                        AppError::InvalidTransition(format!(
                            "Cannot fail a call that is {}",
                            session.status
                        ))
                    })?;

                let missed = self
                    .missed_calls
                    .create(&MissedCall::for_session(&failed, reason))
                    .await?;

                info!(call_id = %call_id, reason = %reason, "Call missed");
                self.notify_missed(&missed);

                Ok(StatusOutcome::Missed {
                    session: failed,
                    missed_call: missed,
                })
            }
        }
    }

    /// Settlement entrypoint
    ///
    /// Client-reported durations are never used. A call that was already
    /// paid returns its stored amounts.
    #[instrument(skip(self))]
    pub async fn end(&self, user_id: Uuid, call_id: &str) -> AppResult<EndOutcome> {
        let session = self.load_session_for(user_id, call_id).await?;

        if session.payment_processed {
            debug!(call_id = %call_id, "Call already settled, returning stored amounts");
            return Ok(EndOutcome {
                session,
                already_settled: true,
            });
        }

        if session.missed_reason.is_some() {
            return Err(AppError::CallNotSettleable(call_id.to_string()));
        }

        self.settle(&session, end_reason::COMPLETED).await
    }

    async fn is_monetized(&self, session: &CallSession) -> AppResult<bool> {
        let users = self
            .users
            .find_many(&[session.caller_user_id, session.receiver_user_id])
            .await?;

        let caller = users.iter().find(|u| u.id == session.caller_user_id);
        let receiver = users.iter().find(|u| u.id == session.receiver_user_id);

        Ok(match (caller, receiver) {
            (Some(c), Some(r)) => self.monetization.is_monetized(c, r),
            _ => false,
        })
    }

    async fn settle(&self, session: &CallSession, reason: &str) -> AppResult<EndOutcome> {
        let monetized = self.is_monetized(session).await?;
        let now = Utc::now();
        let planner = CallBillingPlanner::new(self.rules, monetized, now, reason);

        match self.sessions.settle_once(&session.call_id, &planner).await {
            Ok(SettleAttempt::Settled(settled)) => {
                self.notify(CallEvent::ended(&settled));
                Ok(EndOutcome {
                    session: settled,
                    already_settled: false,
                })
            }
            Ok(SettleAttempt::AlreadySettled(settled)) => Ok(EndOutcome {
                session: settled,
                already_settled: true,
            }),
            Ok(SettleAttempt::NotSettleable(_)) => {
                Err(AppError::CallNotSettleable(session.call_id.clone()))
            }
            Err(e @ AppError::CallSessionNotFound(_)) => Err(e),
            Err(e) => {
                error!(call_id = %session.call_id, error = %e, "Settlement failed");

                let elapsed = session.elapsed_seconds(session.settlement_moment(now));
                let duration = self.rules.billable_minutes(session.call_type, elapsed);

                if let Err(mark_err) = self
                    .sessions
                    .mark_payment_failed(&session.call_id, duration)
                    .await
                {
                    error!(
                        call_id = %session.call_id,
                        error = %mark_err,
                        "Failed to record settlement failure"
                    );
                }

                Err(AppError::SettlementFailed {
                    call_id: session.call_id.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn with_counterparts(
        &self,
        user_id: Uuid,
        sessions: Vec<CallSession>,
    ) -> AppResult<Vec<CallRecord>> {
        let mut ids: Vec<Uuid> = sessions.iter().map(|s| s.counterpart_of(user_id)).collect();
        ids.sort_unstable();
        ids.dedup();

        let users: HashMap<Uuid, UserSummary> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.users
                .find_many(&ids)
                .await?
                .into_iter()
                .map(|u| (u.id, u.summary()))
                .collect()
        };

        Ok(sessions
            .into_iter()
            .map(|session| {
                let counterpart = users.get(&session.counterpart_of(user_id)).cloned();
                CallRecord {
                    is_outgoing: session.caller_user_id == user_id,
                    counterpart,
                    session,
                }
            })
            .collect())
    }

    /// Paginated call history with counterpart info
    #[instrument(skip(self, filter))]
    pub async fn history(
        &self,
        user_id: Uuid,
        filter: &CallHistoryFilter,
        pagination: &Pagination,
    ) -> AppResult<(Vec<CallRecord>, i64)> {
        let (sessions, total) = self
            .sessions
            .list_for_user(user_id, filter, pagination)
            .await?;

        Ok((self.with_counterparts(user_id, sessions).await?, total))
    }

    /// Sessions still initiated or connected
    #[instrument(skip(self))]
    pub async fn active(&self, user_id: Uuid) -> AppResult<Vec<CallRecord>> {
        let sessions = self.sessions.list_active_for_user(user_id).await?;
        self.with_counterparts(user_id, sessions).await
    }

    /// Call payments and earnings of the user
    #[instrument(skip(self))]
    pub async fn call_transactions(
        &self,
        user_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<(Vec<WalletTransaction>, i64)> {
        self.wallets
            .list_transactions(user_id, &TransactionFilter::call_entries(), pagination)
            .await
    }

    /// Missed calls addressed to the user
    #[instrument(skip(self))]
    pub async fn missed_calls(
        &self,
        user_id: Uuid,
        pagination: &Pagination,
    ) -> AppResult<(Vec<MissedCall>, i64)> {
        self.missed_calls.list_for_receiver(user_id, pagination).await
    }

    /// Mark a missed call as seen by its receiver
    #[instrument(skip(self))]
    pub async fn mark_missed_viewed(&self, user_id: Uuid, call_id: &str) -> AppResult<MissedCall> {
        self.missed_calls
            .mark_viewed(call_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Missed call {}", call_id)))
    }
}
