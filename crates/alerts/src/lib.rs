//! Alert matching and throttling.
//!
//! This crate provides:
//! - `Policy` definitions loaded from YAML
//! - `ThrottleManager` with hourly caps, minimum alert gaps, and keyed
//!   suppression windows over a pluggable `ThrottleStore` (in-memory or
//!   PostgreSQL)
//! - Minijinja-rendered suppression keys
//! - `AlertMatchPipeline`, which evaluates every policy against an event
//!   and hands allowed matches to an `AlertSink`

pub mod error;
pub mod pipeline;
pub mod policy;
pub mod sink;
pub mod templating;
pub mod throttle;

pub use error::{DeliveryError, PolicyError, ThrottleError};
pub use pipeline::{AlertMatchPipeline, Outcome, PolicyOutcome};
pub use policy::{load_policies, Policy};
pub use sink::{AlertSignal, AlertSink, ChannelSink};
pub use throttle::{
    EmitDecision, MemoryThrottleStore, PgThrottleStore, ThrottleLimits, ThrottleManager, ThrottleStore,
};
