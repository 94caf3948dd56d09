//! Manner state inferred from how the rep talks

use serde::{Deserialize, Serialize};

/// Modulates how the next response is delivered, never what it says
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorState {
    /// Filler words, restarts (0.0 - 1.0)
    pub awkwardness_level: f64,
    /// Imperatives and question pressure (0.0 - 1.0)
    pub control_taking: f64,
    /// Pace and emphasis (0.0 - 1.0)
    pub energy_level: f64,
}

impl Default for BehaviorState {
    fn default() -> Self {
        Self {
            awkwardness_level: 0.0,
            control_taking: 0.3,
            energy_level: 0.5,
        }
    }
}

/// One turn's raw behavior readings, before blending
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BehaviorSignals {
    pub filler_density: f64,
    pub imperative_density: f64,
    pub question_density: f64,
    pub exclamation_density: f64,
    pub word_count: usize,
}

impl BehaviorState {
    /// Blend a new reading into the state; `weight` is the share of the new turn
    pub fn blend(&self, signals: &BehaviorSignals, weight: f64) -> Self {
        let w = weight.clamp(0.0, 1.0);
        let awkward = (signals.filler_density * 5.0).clamp(0.0, 1.0);
        let control =
            (signals.imperative_density * 4.0 + signals.question_density * 2.0).clamp(0.0, 1.0);
        let pace = (signals.word_count as f64 / 40.0).min(1.0);
        let energy = (0.6 * pace + signals.exclamation_density * 4.0).clamp(0.0, 1.0);
        Self {
            awkwardness_level: self.awkwardness_level * (1.0 - w) + awkward * w,
            control_taking: self.control_taking * (1.0 - w) + control * w,
            energy_level: self.energy_level * (1.0 - w) + energy * w,
        }
    }
}
