//! prospect-sim: orchestration core for a simulated sales prospect
//!
//! Turn-taking authority → speech gate → candidate queue, fed by a response
//! planner with dual-path coaching, gated by the "Marcus" behavior engine.

pub mod config;
pub mod core;
pub mod error;
pub mod types;

pub use config::SessionConfig;
pub use error::{ConfigError, ServiceError, SessionError};

// =============================================================================
// TURN TAKING [C] - defaults, overridable via SessionConfig
// =============================================================================

/// Silence required before the user is considered done (milliseconds)
pub const SILENCE_THRESHOLD_MS: u64 = 700;

/// Minimum time the user must have held the floor before the gate may open
/// A breath mid-sentence never hands the floor over
pub const USER_DONE_THRESHOLD_MS: u64 = 1200;

// =============================================================================
// CANDIDATE QUEUE [C]
// =============================================================================

/// Maximum candidates held at once
pub const QUEUE_MAX_SIZE: usize = 5;

/// Default candidate lifetime (milliseconds)
pub const CANDIDATE_EXPIRY_MS: u64 = 8000;

/// Expiry multiplier when the coach classifies an open question
pub const OPEN_QUESTION_EXPIRY_FACTOR: f64 = 1.5;

/// Priority boost when the coach flags an intervention
pub const INTERVENTION_PRIORITY_BOOST: f64 = 0.2;

/// Rep control-taking above this makes the prospect's lines non-interruptible
pub const HOLD_FLOOR_CONTROL: f64 = 0.7;

// =============================================================================
// BEHAVIOR GATE [C] - base ± spread, perturbed by the session variance seed
// =============================================================================

/// Irritation at which the call is over
pub const DONE_IRRITATION: f64 = 0.9;

/// Respect below this → IMPATIENT (0.3 - 0.5)
pub const IMPATIENT_RESPECT_BASE: f64 = 0.4;
pub const IMPATIENT_RESPECT_SPREAD: f64 = 0.1;

/// Irritation above this → IMPATIENT (0.6 - 0.8)
pub const IMPATIENT_IRRITATION_BASE: f64 = 0.7;
pub const IMPATIENT_IRRITATION_SPREAD: f64 = 0.1;

/// Exchanges without purpose above this → DIRECT (5 - 7)
pub const DIRECT_EXCHANGES_BASE: f64 = 6.0;
pub const DIRECT_EXCHANGES_SPREAD: f64 = 1.0;

/// Respect below this → DIRECT (0.525 - 0.675)
pub const DIRECT_RESPECT_BASE: f64 = 0.6;
pub const DIRECT_RESPECT_SPREAD: f64 = 0.075;

/// Running-average weight of prior effort quality
pub const EFFORT_PRIOR_WEIGHT: f64 = 0.6;

// =============================================================================
// DUAL-PATH COACH [C]
// =============================================================================

/// Fast-path classify budget (milliseconds)
pub const CLASSIFY_TIMEOUT_MS: u64 = 1500;

/// Slow-path plan budget (milliseconds)
pub const PLAN_TIMEOUT_MS: u64 = 20000;

// =============================================================================
// SCORING [C]
// =============================================================================

/// Starting value for rapport, trust, interest
pub const INITIAL_SCORE: f64 = 50.0;

/// Score movement that triggers a new instruction bundle
pub const SIGNIFICANT_CHANGE: f64 = 10.0;

/// Rubric floor and practical ceiling (0-10 scale)
pub const RUBRIC_FLOOR: f64 = 4.0;
pub const RUBRIC_CEILING: f64 = 9.0;

// =============================================================================
// SESSIONS
// =============================================================================

/// Sessions with no command for this long are ended and evicted (milliseconds)
pub const SESSION_IDLE_TIMEOUT_MS: u64 = 600_000;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
