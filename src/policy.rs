use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::level::AccessLevel;

/// One route policy: which level a route requires and whether the
/// partial-access carve-out may apply to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePolicy {
    pub pattern: String,
    pub required_level: AccessLevel,
    #[serde(default)]
    pub allow_partial: bool,
}

impl RoutePolicy {
    pub fn new(pattern: impl Into<String>, required_level: AccessLevel) -> Self {
        Self {
            pattern: pattern.into(),
            required_level,
            allow_partial: false,
        }
    }

    pub fn with_partial(mut self) -> Self {
        self.allow_partial = true;
        self
    }
}

/// Policy applied to paths that match no configured pattern. Unknown
/// routes are not an error; they just require the baseline level.
pub const DEFAULT_REQUIRED_LEVEL: AccessLevel = AccessLevel::Minimal;

/// Immutable mapping from route pattern to required access level.
///
/// Validated once at construction and never modified afterwards;
/// configuration changes require building a new table (new session or
/// process), not a runtime API.
#[derive(Debug)]
pub struct PolicyTable {
    /// Declaration order is preserved: prefix-match ties break to the
    /// earliest entry.
    entries: Vec<RoutePolicy>,
    /// pattern -> index into `entries`, for the exact-match fast path
    by_pattern: HashMap<String, usize>,
}

impl PolicyTable {
    /// Compile a table, failing fast on a corrupt configuration:
    /// duplicate patterns or patterns that are empty / missing the
    /// leading `/`. The engine must refuse to initialize rather than
    /// serve decisions from a bad table.
    pub fn new(entries: Vec<RoutePolicy>) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        let mut by_pattern = HashMap::with_capacity(entries.len());

        for (idx, entry) in entries.iter().enumerate() {
            if entry.pattern.is_empty() || !entry.pattern.starts_with('/') {
                return Err(EngineError::InvalidPattern {
                    pattern: entry.pattern.clone(),
                });
            }
            if !seen.insert(entry.pattern.clone()) {
                return Err(EngineError::DuplicatePattern {
                    pattern: entry.pattern.clone(),
                });
            }
            by_pattern.insert(entry.pattern.clone(), idx);
        }

        tracing::info!(entries = entries.len(), "Compiled route policy table");

        Ok(Self {
            entries,
            by_pattern,
        })
    }

    /// Look up the policy governing `path`.
    ///
    /// Exact match first; otherwise the entry whose pattern is a
    /// segment-boundary prefix of `path` with the longest pattern wins
    /// (ties break to declaration order). This is deliberate: with
    /// `/customer/programs` and `/customer/programs/history` both
    /// configured, the longer pattern must govern its subtree no matter
    /// which was declared first. Prefixes only match at `/` boundaries,
    /// so `/customer` governs `/customer/settings` but never
    /// `/customers`. Paths matching nothing fall back to
    /// [`DEFAULT_REQUIRED_LEVEL`] with the carve-out disabled.
    pub fn lookup(&self, path: &str) -> RoutePolicy {
        if let Some(&idx) = self.by_pattern.get(path) {
            return self.entries[idx].clone();
        }

        let mut best: Option<&RoutePolicy> = None;
        for entry in &self.entries {
            if prefix_matches(&entry.pattern, path) {
                let longer = best
                    .map(|b| entry.pattern.len() > b.pattern.len())
                    .unwrap_or(true);
                if longer {
                    best = Some(entry);
                }
            }
        }

        best.cloned().unwrap_or(RoutePolicy {
            pattern: path.to_string(),
            required_level: DEFAULT_REQUIRED_LEVEL,
            allow_partial: false,
        })
    }

    /// All configured patterns, in declaration order. These are the route
    /// identifiers a session cache evaluates on each recomputation.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.pattern.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Prefix match that respects path segments: the pattern must be followed
/// in the path by a `/` or by nothing, so a pattern never captures a
/// sibling route that merely shares its leading characters.
fn prefix_matches(pattern: &str, path: &str) -> bool {
    if !path.starts_with(pattern) {
        return false;
    }
    // Patterns ending in `/` (the root "/" in particular) already sit on
    // a segment boundary.
    pattern.ends_with('/') || matches!(path.as_bytes().get(pattern.len()), None | Some(b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PolicyTable {
        PolicyTable::new(vec![
            RoutePolicy::new("/", AccessLevel::None),
            RoutePolicy::new("/customer", AccessLevel::Minimal),
            RoutePolicy::new("/customer/programs", AccessLevel::CoachOnly),
            RoutePolicy::new("/customer/programs/history", AccessLevel::Full),
            RoutePolicy::new("/library", AccessLevel::CoachOnly).with_partial(),
        ])
        .unwrap()
    }

    #[test]
    fn test_exact_match_wins() {
        let t = table();
        let p = t.lookup("/customer/programs");
        assert_eq!(p.pattern, "/customer/programs");
        assert_eq!(p.required_level, AccessLevel::CoachOnly);
    }

    #[test]
    fn test_longest_prefix_wins_over_shorter() {
        let t = table();
        // Falls under both /customer/programs and /customer/programs/history;
        // the longer pattern governs.
        let p = t.lookup("/customer/programs/history/2024");
        assert_eq!(p.pattern, "/customer/programs/history");
        assert_eq!(p.required_level, AccessLevel::Full);
    }

    #[test]
    fn test_prefix_match_independent_of_declaration_order() {
        // Same table with the longer pattern declared first.
        let t = PolicyTable::new(vec![
            RoutePolicy::new("/customer/programs/history", AccessLevel::Full),
            RoutePolicy::new("/customer/programs", AccessLevel::CoachOnly),
        ])
        .unwrap();
        let p = t.lookup("/customer/programs/history/2024");
        assert_eq!(p.required_level, AccessLevel::Full);
        let p = t.lookup("/customer/programs/current");
        assert_eq!(p.required_level, AccessLevel::CoachOnly);
    }

    #[test]
    fn test_tie_breaks_to_declaration_order() {
        // Two equal-length patterns can both prefix-match only if they are
        // identical, which construction rejects; equal-length distinct
        // patterns never tie on the same path. Exercise the first-wins rule
        // through the scan anyway with a path matching one of them.
        let t = PolicyTable::new(vec![
            RoutePolicy::new("/alpha", AccessLevel::Full),
            RoutePolicy::new("/beta", AccessLevel::Minimal),
        ])
        .unwrap();
        assert_eq!(t.lookup("/alpha/x").required_level, AccessLevel::Full);
        assert_eq!(t.lookup("/beta/x").required_level, AccessLevel::Minimal);
    }

    #[test]
    fn test_prefix_match_stops_at_segment_boundaries() {
        let t = PolicyTable::new(vec![
            RoutePolicy::new("/customer", AccessLevel::CoachOnly),
            RoutePolicy::new("/", AccessLevel::None),
        ])
        .unwrap();
        // A sibling route sharing leading characters is not captured.
        let p = t.lookup("/customers");
        assert_eq!(p.pattern, "/");
        assert_eq!(p.required_level, AccessLevel::None);
        // The subtree still is.
        assert_eq!(
            t.lookup("/customer/settings").required_level,
            AccessLevel::CoachOnly
        );
    }

    #[test]
    fn test_unknown_path_defaults_to_minimal() {
        let t = PolicyTable::new(vec![RoutePolicy::new(
            "/customer",
            AccessLevel::CoachOnly,
        )])
        .unwrap();
        let p = t.lookup("/nowhere");
        assert_eq!(p.required_level, AccessLevel::Minimal);
        assert!(!p.allow_partial);
    }

    #[test]
    fn test_duplicate_pattern_rejected() {
        let err = PolicyTable::new(vec![
            RoutePolicy::new("/customer", AccessLevel::Minimal),
            RoutePolicy::new("/customer", AccessLevel::Full),
        ])
        .unwrap_err();
        assert!(matches!(err, EngineError::DuplicatePattern { pattern } if pattern == "/customer"));
    }

    #[test]
    fn test_malformed_pattern_rejected() {
        assert!(matches!(
            PolicyTable::new(vec![RoutePolicy::new("customer", AccessLevel::Minimal)]),
            Err(EngineError::InvalidPattern { .. })
        ));
        assert!(matches!(
            PolicyTable::new(vec![RoutePolicy::new("", AccessLevel::Minimal)]),
            Err(EngineError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_patterns_preserve_declaration_order() {
        let t = table();
        let patterns: Vec<&str> = t.patterns().collect();
        assert_eq!(
            patterns,
            vec![
                "/",
                "/customer",
                "/customer/programs",
                "/customer/programs/history",
                "/library"
            ]
        );
    }
}
