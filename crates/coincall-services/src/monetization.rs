//! Monetization direction rules
//!
//! Decides whether a call between two users earns the receiver anything.
//! Settlement math only asks the policy; it never inspects user attributes.

use coincall_core::{
    config::BillingConfig,
    models::{Gender, User},
};

/// Whether the receiver earns from a call placed by the caller
pub trait MonetizationPolicy: Send + Sync {
    fn is_monetized(&self, caller: &User, receiver: &User) -> bool;
}

/// Calls are monetized only from the payer gender to the earner gender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenderDirectionPolicy {
    pub payer: Gender,
    pub earner: Gender,
}

impl GenderDirectionPolicy {
    pub fn new(payer: Gender, earner: Gender) -> Self {
        Self { payer, earner }
    }

    pub fn from_config(config: &BillingConfig) -> Self {
        Self::new(config.payer_gender, config.earner_gender)
    }
}

impl Default for GenderDirectionPolicy {
    fn default() -> Self {
        Self::new(Gender::Male, Gender::Female)
    }
}

impl MonetizationPolicy for GenderDirectionPolicy {
    fn is_monetized(&self, caller: &User, receiver: &User) -> bool {
        caller.gender == self.payer && receiver.gender == self.earner
    }
}
