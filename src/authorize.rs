use serde::{Deserialize, Serialize};
use std::fmt;

use crate::level::{AccessGrant, AccessLevel};
use crate::policy::PolicyTable;

/// Stable, level-keyed explanation for a denial. Derived from the
/// required level only — never from the path text — so reasons survive
/// route renaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    RequiresAuthentication,
    RequiresCoachOrSubscription,
    RequiresActiveSubscription,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::RequiresAuthentication => "requires_authentication",
            DenialReason::RequiresCoachOrSubscription => "requires_coach_or_subscription",
            DenialReason::RequiresActiveSubscription => "requires_active_subscription",
        }
    }

    /// Pure mapping from required level to reason. Required level `None`
    /// can never produce a denial, so it has no reason.
    fn for_required(required: AccessLevel) -> Option<Self> {
        match required {
            AccessLevel::None => None,
            AccessLevel::Minimal => Some(DenialReason::RequiresAuthentication),
            AccessLevel::CoachOnly => Some(DenialReason::RequiresCoachOrSubscription),
            AccessLevel::Full => Some(DenialReason::RequiresActiveSubscription),
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of authorizing one path at one grant. Never persisted;
/// always reflects the fact snapshot the grant was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub path: String,
    pub allowed: bool,
    /// Level the account held when the decision was made.
    pub level: AccessLevel,
    /// True when access was granted through the partial-access carve-out
    /// rather than the level hierarchy.
    pub partial: bool,
    pub denial_reason: Option<DenialReason>,
}

/// Authorize `path` for an account holding `grant`. Pure, reentrant, and
/// idempotent: no I/O, no hidden counters, safe to call concurrently
/// against the same immutable table.
///
/// The level hierarchy is consulted first. Only after a hierarchy
/// rejection does the partial-access carve-out apply: a route marked
/// `allow_partial` at required level `coach_only` admits any account whose
/// raw `has_coach` capability is set, as `allowed = true, partial = true`.
/// The carve-out is a deliberate exception to the hierarchy, keyed on the
/// specific capability the flag gates, and never widens routes that are
/// not explicitly marked.
pub fn authorize(table: &PolicyTable, grant: &AccessGrant, path: &str) -> AccessDecision {
    let policy = table.lookup(path);

    if grant.level.satisfies(policy.required_level) {
        return AccessDecision {
            path: path.to_string(),
            allowed: true,
            level: grant.level,
            partial: false,
            denial_reason: None,
        };
    }

    if policy.allow_partial
        && policy.required_level == AccessLevel::CoachOnly
        && grant.capabilities.has_coach
    {
        return AccessDecision {
            path: path.to_string(),
            allowed: true,
            level: grant.level,
            partial: true,
            denial_reason: None,
        };
    }

    AccessDecision {
        path: path.to_string(),
        allowed: false,
        level: grant.level,
        partial: false,
        denial_reason: DenialReason::for_required(policy.required_level),
    }
}
