//! Settlement math
//!
//! Pure computation of what a finished call costs and how the deducted coins
//! are split. The numbers are produced inside the settlement transaction by
//! `CallBillingPlanner`, against the caller's locked balance.

use chrono::{DateTime, Utc};
use coincall_core::{
    config::BillingConfig,
    models::{CallSession, CallType, LedgerEntry, SettlementPlan, TransactionType},
    traits::SettlementPlanner,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::constants::{DEFAULT_MAX_CALL_DURATION_SECS, MESSAGE_BILLED_MINUTES, SECONDS_PER_MINUTE};

/// Duration rules applied to every settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingRules {
    /// Elapsed time beyond this is never billed
    pub max_call_duration_secs: i64,

    /// Billed minutes for a message session
    pub message_minutes: i64,
}

impl Default for BillingRules {
    fn default() -> Self {
        Self {
            max_call_duration_secs: DEFAULT_MAX_CALL_DURATION_SECS,
            message_minutes: MESSAGE_BILLED_MINUTES,
        }
    }
}

impl From<&BillingConfig> for BillingRules {
    fn from(config: &BillingConfig) -> Self {
        Self {
            max_call_duration_secs: config.max_call_duration_secs.max(SECONDS_PER_MINUTE),
            message_minutes: config.message_minimum_minutes.max(1),
        }
    }
}

impl BillingRules {
    /// Billable minutes for `elapsed_secs` of wall-clock time
    ///
    /// Timed calls are capped then rounded up to whole minutes. Message
    /// sessions are always a single unit.
    pub fn billable_minutes(&self, call_type: CallType, elapsed_secs: i64) -> i64 {
        if !call_type.is_timed() {
            return self.message_minutes;
        }

        let capped = elapsed_secs.clamp(0, self.max_call_duration_secs);
        ceil_minutes(capped)
    }
}

/// Whole minutes, rounded up
pub fn ceil_minutes(seconds: i64) -> i64 {
    if seconds <= 0 {
        return 0;
    }
    (seconds + SECONDS_PER_MINUTE - 1) / SECONDS_PER_MINUTE
}

/// Split deducted coins into `(coins_to_receiver, admin_commission)`
///
/// Commission is floored so `receiver + commission == deducted` always holds.
pub fn split_commission(coins_deducted: i64, commission_percent: Decimal) -> (i64, i64) {
    if coins_deducted <= 0 {
        return (0, 0);
    }

    let percent = commission_percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
    let commission = (Decimal::from(coins_deducted) * percent / Decimal::ONE_HUNDRED)
        .floor()
        .to_i64()
        .unwrap_or(0)
        .clamp(0, coins_deducted);

    (coins_deducted - commission, commission)
}

/// Settlement planner for one `end`/`check-time` request
///
/// `monetized` and `now` are fixed before the transaction starts; only the
/// caller balance comes from the locked wallet row.
#[derive(Debug, Clone)]
pub struct CallBillingPlanner {
    rules: BillingRules,
    monetized: bool,
    now: DateTime<Utc>,
    end_reason: String,
}

impl CallBillingPlanner {
    pub fn new(rules: BillingRules, monetized: bool, now: DateTime<Utc>, end_reason: &str) -> Self {
        Self {
            rules,
            monetized,
            now,
            end_reason: end_reason.to_string(),
        }
    }
}

impl SettlementPlanner for CallBillingPlanner {
    fn plan(&self, session: &CallSession, caller_balance: i64) -> SettlementPlan {
        let ended_at = session.settlement_moment(self.now);
        let elapsed = session.elapsed_seconds(ended_at);

        let duration_minutes = self.rules.billable_minutes(session.call_type, elapsed);
        let coins_required = duration_minutes.saturating_mul(session.coins_per_minute.max(0));
        let coins_deducted = coins_required.min(caller_balance.max(0));

        let (coins_to_receiver, admin_commission) = if self.monetized {
            split_commission(coins_deducted, session.commission_percent)
        } else {
            (0, 0)
        };

        SettlementPlan {
            duration_minutes,
            coins_required,
            coins_deducted,
            coins_to_receiver,
            admin_commission,
            monetized: self.monetized,
            ended_at,
        }
    }

    fn payment_entry(&self, session: &CallSession, plan: &SettlementPlan) -> LedgerEntry {
        LedgerEntry::new(
            TransactionType::CallPayment,
            format!(
                "{} call payment: {} min at {} coins/min",
                session.call_type, plan.duration_minutes, session.coins_per_minute
            ),
        )
        .with_call(&session.call_id)
    }

    fn earning_entry(&self, session: &CallSession, plan: &SettlementPlan) -> LedgerEntry {
        LedgerEntry::new(
            TransactionType::CallEarning,
            format!(
                "{} call earning: {} min, {} coins commission",
                session.call_type, plan.duration_minutes, plan.admin_commission
            ),
        )
        .with_call(&session.call_id)
    }

    fn end_reason(&self) -> &str {
        &self.end_reason
    }
}
