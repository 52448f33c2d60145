use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;
use crate::facts::{AccountFacts, Capabilities, SubscriptionStatus};

/// Derived authorization tier summarizing an account's standing.
///
/// Variant order defines the hierarchy: `Ord` is derived, so
/// "level satisfies required" is exactly `level >= required`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    None,
    Minimal,
    CoachOnly,
    Full,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::Minimal => "minimal",
            AccessLevel::CoachOnly => "coach_only",
            AccessLevel::Full => "full",
        }
    }

    /// True if an account holding `self` meets a requirement of `required`.
    pub fn satisfies(&self, required: AccessLevel) -> bool {
        *self >= required
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AccessLevel::None),
            "minimal" => Ok(AccessLevel::Minimal),
            "coach_only" => Ok(AccessLevel::CoachOnly),
            "full" => Ok(AccessLevel::Full),
            other => Err(EngineError::InvalidLevel(other.to_string())),
        }
    }
}

/// Resolver output: the derived level plus the capability snapshot it was
/// derived from. The authorizer needs both — the partial-access carve-out
/// looks at raw capabilities, not the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub level: AccessLevel,
    pub capabilities: Capabilities,
}

/// Derive the access level from a fact snapshot. Pure and total: same
/// facts and clock always yield the same level, no hidden state.
///
/// Priority order, first match wins:
/// 1. unauthenticated -> `None`
/// 2. paying relationship (payment plan, active subscription, or
///    unexpired trial) -> `Full`
/// 3. coach contract -> `CoachOnly`
/// 4. otherwise -> `Minimal`
///
/// A paying relationship deliberately outranks a coach contract: a paying
/// user must never lose coach-gated capabilities. Trial expiry is compared
/// against the caller's clock on every call, so a call straddling expiry
/// returns the correct level without any external notification. A trial
/// with no expiry timestamp counts as not active.
pub fn resolve(facts: &AccountFacts, now: DateTime<Utc>) -> AccessLevel {
    if !facts.authenticated {
        return AccessLevel::None;
    }

    let subscription_active =
        facts.has_subscription && facts.subscription_status == SubscriptionStatus::Active;
    let trial_active = facts.has_trial
        && facts
            .trial_expires_at
            .map(|expires| expires > now)
            .unwrap_or(false);

    if facts.has_payment_plan || subscription_active || trial_active {
        return AccessLevel::Full;
    }

    if facts.has_coach {
        return AccessLevel::CoachOnly;
    }

    AccessLevel::Minimal
}

/// Resolve the level and bundle it with the capability snapshot.
pub fn grant(facts: &AccountFacts, now: DateTime<Utc>) -> AccessGrant {
    AccessGrant {
        level: resolve(facts, now),
        capabilities: Capabilities::from(facts),
    }
}
