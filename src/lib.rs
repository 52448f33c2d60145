//! Gatekeep - Access-Control Decision Engine
//!
//! Derives a single access level from an account's commercial state
//! (coach contract, trial, subscription, payment plan) and authorizes
//! navigation against a static route policy table, with per-session
//! reactive recomputation as facts change.
//!
//! The pipeline: a fact source pushes an [`facts::AccountFacts`] snapshot,
//! [`level::resolve`] derives the access level, [`authorize::authorize`]
//! evaluates paths against the [`policy::PolicyTable`], and the
//! [`session::SessionCache`] debounces fact bursts and publishes one
//! atomic [`session::ResolvedState`] per recomputation. Payment
//! processing, fact persistence, and UI rendering are external
//! collaborators; this crate only decides.

pub mod audit;
pub mod authorize;
pub mod errors;
pub mod facts;
pub mod level;
pub mod policy;
pub mod session;
pub mod settings;

pub use audit::{DecisionSink, TracingSink};
pub use authorize::{authorize, AccessDecision, DenialReason};
pub use errors::EngineError;
pub use facts::{AccountFacts, Capabilities, SubscriptionStatus};
pub use level::{grant, resolve, AccessGrant, AccessLevel};
pub use policy::{PolicyTable, RoutePolicy};
pub use session::{ResolvedState, SessionCache, SessionOptions};
pub use settings::PolicySettings;
