use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Billing state of a subscription as reported by the fact source.
///
/// Defaults to `Cancelled` so a missing field deserializes to the
/// least-privileged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    #[default]
    Cancelled,
}

/// Immutable snapshot of an account's commercial and relationship state,
/// supplied by the external fact source at evaluation time.
///
/// Every field carries `#[serde(default)]`: a snapshot with missing fields
/// deserializes to the least-privileged value for each of them (false,
/// `None`, `Cancelled`), never to an access-granting one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountFacts {
    #[serde(default)]
    pub authenticated: bool,
    /// An active coach-customer contract exists.
    #[serde(default)]
    pub has_coach: bool,
    /// A currently paid, non-trial plan is active.
    #[serde(default)]
    pub has_payment_plan: bool,
    #[serde(default)]
    pub has_trial: bool,
    #[serde(default)]
    pub trial_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_subscription: bool,
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
}

impl AccountFacts {
    /// Snapshot used when no facts have arrived yet: unauthenticated,
    /// nothing granted. A delayed fact source must deny, never allow.
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Raw capability flags carried alongside the derived level.
///
/// The authorizer's partial-access carve-out consults these directly, so
/// they are snapshotted from the same facts the level was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_coach: bool,
    pub has_payment_plan: bool,
    pub has_trial: bool,
    pub has_subscription: bool,
}

impl From<&AccountFacts> for Capabilities {
    fn from(facts: &AccountFacts) -> Self {
        Self {
            has_coach: facts.has_coach,
            has_payment_plan: facts.has_payment_plan,
            has_trial: facts.has_trial,
            has_subscription: facts.has_subscription,
        }
    }
}
