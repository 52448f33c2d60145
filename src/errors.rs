use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("Duplicate route pattern `{pattern}` in policy table")]
    #[diagnostic(
        code(gatekeep::policy::duplicate_pattern),
        help("Each route pattern may appear at most once; remove or merge the duplicate entry")
    )]
    DuplicatePattern { pattern: String },

    #[error("Invalid route pattern `{pattern}`")]
    #[diagnostic(
        code(gatekeep::policy::invalid_pattern),
        help("Route patterns must be non-empty and start with `/`, e.g. \"/customer/programs\"")
    )]
    InvalidPattern { pattern: String },

    #[error("Unknown access level `{0}`")]
    #[diagnostic(
        code(gatekeep::policy::invalid_level),
        help("Valid levels are: none, minimal, coach_only, full")
    )]
    InvalidLevel(String),

    #[error("Settings error: {0}")]
    #[diagnostic(code(gatekeep::settings))]
    Settings(#[from] config::ConfigError),

    #[error("Session is no longer active")]
    #[diagnostic(
        code(gatekeep::session::inactive),
        help(
            "The session cache was torn down (logout); construct a new session before querying. \
             This is a caller usage error, not a policy denial"
        )
    )]
    SessionInactive,
}
