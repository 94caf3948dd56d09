//! Session configuration
//!
//! Every tuned threshold lives here so it can be re-calibrated without a
//! rebuild. Defaults come from the constants in `lib.rs`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::{
    CANDIDATE_EXPIRY_MS, CLASSIFY_TIMEOUT_MS, DIRECT_EXCHANGES_BASE, DIRECT_EXCHANGES_SPREAD,
    DIRECT_RESPECT_BASE, DIRECT_RESPECT_SPREAD, DONE_IRRITATION, EFFORT_PRIOR_WEIGHT,
    HOLD_FLOOR_CONTROL, IMPATIENT_IRRITATION_BASE, IMPATIENT_IRRITATION_SPREAD, IMPATIENT_RESPECT_BASE,
    IMPATIENT_RESPECT_SPREAD, INITIAL_SCORE, INTERVENTION_PRIORITY_BOOST,
    OPEN_QUESTION_EXPIRY_FACTOR, PLAN_TIMEOUT_MS, QUEUE_MAX_SIZE, SESSION_IDLE_TIMEOUT_MS,
    SIGNIFICANT_CHANGE, SILENCE_THRESHOLD_MS, USER_DONE_THRESHOLD_MS,
};

/// Top-level configuration for one call session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub turn: TurnConfig,
    pub queue: QueueConfig,
    pub gate: GateConfig,
    pub planner: PlannerConfig,
    pub coach: CoachConfig,
    pub scoring: ScoringConfig,
    pub services: ServiceEndpoints,
    /// Fixed variance seed; derived from the session id when absent
    pub variance_seed: Option<f64>,
    /// Served sessions idle this long are ended and evicted
    pub idle_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            turn: TurnConfig::default(),
            queue: QueueConfig::default(),
            gate: GateConfig::default(),
            planner: PlannerConfig::default(),
            coach: CoachConfig::default(),
            scoring: ScoringConfig::default(),
            services: ServiceEndpoints::default(),
            variance_seed: None,
            idle_timeout_ms: SESSION_IDLE_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Load from a JSON file; missing fields fall back to defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: SessionConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the state machines meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_size == 0 {
            return Err(ConfigError::Invalid {
                field: "queue.max_size",
                reason: "must hold at least one candidate".to_string(),
            });
        }
        if let Some(seed) = self.variance_seed {
            if !(0.0..=1.0).contains(&seed) {
                return Err(ConfigError::Invalid {
                    field: "variance_seed",
                    reason: format!("{} is outside [0, 1]", seed),
                });
            }
        }
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "idle_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.gate.done_irritation) {
            return Err(ConfigError::Invalid {
                field: "gate.done_irritation",
                reason: format!("{} is outside [0, 1]", self.gate.done_irritation),
            });
        }
        if !(0.0..1.0).contains(&self.gate.effort_prior_weight) {
            return Err(ConfigError::Invalid {
                field: "gate.effort_prior_weight",
                reason: format!("{} is outside [0, 1)", self.gate.effort_prior_weight),
            });
        }
        Ok(())
    }
}

/// Silence / floor thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub silence_threshold_ms: u64,
    pub user_done_threshold_ms: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ms: SILENCE_THRESHOLD_MS,
            user_done_threshold_ms: USER_DONE_THRESHOLD_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: QUEUE_MAX_SIZE,
        }
    }
}

/// A threshold that moves with the session's variance seed
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Perturbed {
    pub base: f64,
    pub spread: f64,
}

impl Perturbed {
    pub const fn new(base: f64, spread: f64) -> Self {
        Self { base, spread }
    }

    /// seed 0.0 → base - spread, 0.5 → base, 1.0 → base + spread
    pub fn at(&self, seed: f64) -> f64 {
        self.base + (2.0 * seed.clamp(0.0, 1.0) - 1.0) * self.spread
    }
}

/// Behavior gate thresholds and fact-update deltas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub done_irritation: f64,
    pub impatient_respect: Perturbed,
    pub impatient_irritation: Perturbed,
    pub direct_exchanges: Perturbed,
    pub direct_respect: Perturbed,
    pub effort_prior_weight: f64,

    pub initial_respect: f64,
    pub initial_effort: f64,

    /// Respect lost per disrespect cue
    pub disrespect_delta: f64,
    /// Respect gained per courtesy cue
    pub courtesy_delta: f64,
    /// Respect gained for a thoughtful question
    pub thoughtful_delta: f64,
    /// Irritation added each turn respect sits below `low_respect_line`
    pub low_respect_irritation: f64,
    pub low_respect_line: f64,
    /// Irritation added per purposeless exchange past the grace count
    pub purposeless_irritation: f64,
    pub purposeless_grace: u32,
    /// Irritation added per minimal response once the streak reaches `fade_minimal_count`
    pub minimal_irritation: f64,
    pub fade_minimal_count: u32,

    /// Effort at or above which silence is waited out patiently
    pub patient_effort: f64,
    pub patient_wait_ms: u64,
    pub prompt_wait_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            done_irritation: DONE_IRRITATION,
            impatient_respect: Perturbed::new(IMPATIENT_RESPECT_BASE, IMPATIENT_RESPECT_SPREAD),
            impatient_irritation: Perturbed::new(
                IMPATIENT_IRRITATION_BASE,
                IMPATIENT_IRRITATION_SPREAD,
            ),
            direct_exchanges: Perturbed::new(DIRECT_EXCHANGES_BASE, DIRECT_EXCHANGES_SPREAD),
            direct_respect: Perturbed::new(DIRECT_RESPECT_BASE, DIRECT_RESPECT_SPREAD),
            effort_prior_weight: EFFORT_PRIOR_WEIGHT,
            initial_respect: 0.75,
            initial_effort: 0.5,
            disrespect_delta: 0.15,
            courtesy_delta: 0.05,
            thoughtful_delta: 0.05,
            low_respect_irritation: 0.1,
            low_respect_line: 0.5,
            purposeless_irritation: 0.05,
            purposeless_grace: 3,
            minimal_irritation: 0.1,
            fade_minimal_count: 2,
            patient_effort: 0.65,
            patient_wait_ms: 6000,
            prompt_wait_ms: 3000,
        }
    }
}

/// Manner and candidate-shaping parameters for the response planner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub persona: String,
    pub base_priority: f64,
    pub expiry_ms: u64,
    pub open_question_expiry_factor: f64,
    pub intervention_boost: f64,
    /// Control-taking above which prospect lines cannot be talked over
    pub hold_floor_control: f64,
    pub base_pre_delay_ms: u64,
    /// Extra hesitation at full awkwardness
    pub max_hesitation_ms: u64,
    /// Weight of the newest turn in the behavior-state blend
    pub behavior_blend: f64,
    /// Transcript lines kept in memory
    pub history_limit: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            persona: "Marcus, operations director at a mid-size logistics firm; busy, skeptical of cold calls".to_string(),
            base_priority: 0.5,
            expiry_ms: CANDIDATE_EXPIRY_MS,
            open_question_expiry_factor: OPEN_QUESTION_EXPIRY_FACTOR,
            intervention_boost: INTERVENTION_PRIORITY_BOOST,
            hold_floor_control: HOLD_FLOOR_CONTROL,
            base_pre_delay_ms: 250,
            max_hesitation_ms: 900,
            behavior_blend: 0.5,
            history_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub classify_timeout_ms: u64,
    pub plan_timeout_ms: u64,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            classify_timeout_ms: CLASSIFY_TIMEOUT_MS,
            plan_timeout_ms: PLAN_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub initial_score: f64,
    pub significant_change: f64,
    pub judge_timeout_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            initial_score: INITIAL_SCORE,
            significant_change: SIGNIFICANT_CHANGE,
            judge_timeout_ms: 10000,
        }
    }
}

/// Base URLs of the external collaborators; `None` means offline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoints {
    pub generation_url: Option<String>,
    pub coach_url: Option<String>,
    pub judge_url: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            generation_url: None,
            coach_url: None,
            judge_url: None,
            request_timeout_ms: 15000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perturbed_range() {
        let t = Perturbed::new(0.4, 0.1);
        assert!((t.at(0.0) - 0.3).abs() < 1e-9);
        assert!((t.at(0.5) - 0.4).abs() < 1e-9);
        assert!((t.at(1.0) - 0.5).abs() < 1e-9);
        // Out-of-range seeds clamp
        assert!((t.at(7.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"turn": {"silence_threshold_ms": 900}}"#).unwrap();
        assert_eq!(config.turn.silence_threshold_ms, 900);
        assert_eq!(config.turn.user_done_threshold_ms, USER_DONE_THRESHOLD_MS);
        assert_eq!(config.queue.max_size, QUEUE_MAX_SIZE);
    }

    #[test]
    fn test_validate_rejects_bad_seed() {
        let config = SessionConfig {
            variance_seed: Some(1.5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_queue() {
        let mut config = SessionConfig::default();
        config.queue.max_size = 0;
        assert!(config.validate().is_err());
    }
}
