use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::policy::{PolicyTable, RoutePolicy};
use crate::session::SessionOptions;

/// One row of the route policy configuration. The level is kept as its
/// string form here and parsed during table construction, so a typo in
/// the file surfaces as a typed configuration error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub pattern: String,
    pub required_level: String,
    #[serde(default)]
    pub allow_partial: bool,
}

/// Static, versioned policy configuration, loaded once per process or
/// session. There is no runtime reload: changing the table means building
/// a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteEntry>,
    /// Debounce quiet window for the session cache, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            routes: default_routes(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_routes() -> Vec<RouteEntry> {
    let row = |pattern: &str, level: &str, partial: bool| RouteEntry {
        pattern: pattern.to_string(),
        required_level: level.to_string(),
        allow_partial: partial,
    };
    vec![
        row("/", "none", false),
        row("/home", "minimal", false),
        row("/settings", "minimal", false),
        row("/library", "coach_only", true),
        row("/customer/programs", "coach_only", false),
        row("/customer/programs/history", "full", false),
        row("/customer/checkins", "full", false),
    ]
}

impl PolicySettings {
    /// Load settings the usual layered way: built-in defaults, then an
    /// optional TOML file, then `GATEKEEP__`-prefixed environment
    /// overrides (e.g. `GATEKEEP__DEBOUNCE_MS=20`).
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let mut builder = config::Config::builder();

        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(config::Environment::with_prefix("GATEKEEP").separator("__"));

        let cfg = builder.build()?;
        let settings: PolicySettings = cfg.try_deserialize()?;
        Ok(settings)
    }

    /// Compile the configured rows into a validated [`PolicyTable`],
    /// failing fast on an unknown level, duplicate pattern, or malformed
    /// pattern.
    pub fn build_table(&self) -> Result<PolicyTable, EngineError> {
        let mut entries = Vec::with_capacity(self.routes.len());
        for row in &self.routes {
            entries.push(RoutePolicy {
                pattern: row.pattern.clone(),
                required_level: row.required_level.parse()?,
                allow_partial: row.allow_partial,
            });
        }
        PolicyTable::new(entries)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Session options derived from these settings (no audit sink).
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            debounce_window: self.debounce_window(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::AccessLevel;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_build_a_valid_table() {
        let settings = PolicySettings::default();
        let table = settings.build_table().expect("default table must compile");
        assert!(!table.is_empty());
        assert_eq!(settings.debounce_ms, 50);
        assert_eq!(
            table.lookup("/customer/programs").required_level,
            AccessLevel::CoachOnly
        );
        assert!(table.lookup("/library").allow_partial);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nonexistent.toml");

        let settings =
            PolicySettings::load(config_path.to_str().unwrap()).expect("Failed to load settings");
        assert_eq!(settings.routes.len(), default_routes().len());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("policy.toml");

        let config_content = r#"
debounce_ms = 20

[[routes]]
pattern = "/dash"
required_level = "minimal"

[[routes]]
pattern = "/dash/reports"
required_level = "full"
allow_partial = false
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings =
            PolicySettings::load(config_path.to_str().unwrap()).expect("Failed to load settings");
        assert_eq!(settings.debounce_ms, 20);
        assert_eq!(settings.routes.len(), 2);

        let table = settings.build_table().unwrap();
        assert_eq!(table.lookup("/dash").required_level, AccessLevel::Minimal);
        assert_eq!(
            table.lookup("/dash/reports/q3").required_level,
            AccessLevel::Full
        );
    }

    #[test]
    fn test_unknown_level_is_a_typed_config_error() {
        let settings = PolicySettings {
            routes: vec![RouteEntry {
                pattern: "/dash".into(),
                required_level: "superuser".into(),
                allow_partial: false,
            }],
            ..Default::default()
        };
        let err = settings.build_table().unwrap_err();
        assert!(matches!(err, EngineError::InvalidLevel(level) if level == "superuser"));
    }

    #[test]
    fn test_duplicate_row_fails_table_construction() {
        let settings = PolicySettings {
            routes: vec![
                RouteEntry {
                    pattern: "/dash".into(),
                    required_level: "minimal".into(),
                    allow_partial: false,
                },
                RouteEntry {
                    pattern: "/dash".into(),
                    required_level: "full".into(),
                    allow_partial: false,
                },
            ],
            ..Default::default()
        };
        assert!(matches!(
            settings.build_table(),
            Err(EngineError::DuplicatePattern { .. })
        ));
    }
}
