//! Session scores, scoring events and behavior tiers

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Rapport,
    Trust,
    Interest,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Rapport, Metric::Trust, Metric::Interest];
}

/// Rapport / trust / interest, each 0 - 100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionScores {
    pub rapport: f64,
    pub trust: f64,
    pub interest: f64,
    pub last_updated: DateTime<Utc>,
}

impl SessionScores {
    pub fn new(initial: f64) -> Self {
        let v = initial.clamp(0.0, 100.0);
        Self {
            rapport: v,
            trust: v,
            interest: v,
            last_updated: Utc::now(),
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Rapport => self.rapport,
            Metric::Trust => self.trust,
            Metric::Interest => self.interest,
        }
    }

    pub(crate) fn apply(&mut self, metric: Metric, delta: f64) {
        let slot = match metric {
            Metric::Rapport => &mut self.rapport,
            Metric::Trust => &mut self.trust,
            Metric::Interest => &mut self.interest,
        };
        *slot = (*slot + delta).clamp(0.0, 100.0);
        self.last_updated = Utc::now();
    }

    pub fn mean(&self) -> f64 {
        (self.rapport + self.trust + self.interest) / 3.0
    }
}

/// A named delta on one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringEvent {
    pub name: String,
    pub metric: Metric,
    pub delta: f64,
}

impl ScoringEvent {
    pub fn new(name: impl Into<String>, metric: Metric, delta: f64) -> Self {
        Self {
            name: name.into(),
            metric,
            delta,
        }
    }

    /// Catalog of well-known events
    pub fn named(name: &str) -> Option<Self> {
        let (metric, delta) = match name {
            "asked_open_question" => (Metric::Interest, 5.0),
            "asked_follow_up" => (Metric::Rapport, 4.0),
            "used_prospect_name" => (Metric::Rapport, 3.0),
            "empathy_statement" => (Metric::Rapport, 6.0),
            "value_statement" => (Metric::Interest, 5.0),
            "provided_proof" => (Metric::Trust, 8.0),
            "objection_resolved" => (Metric::Trust, 10.0),
            "interrupted_prospect" => (Metric::Rapport, -8.0),
            "ignored_objection" => (Metric::Trust, -10.0),
            "pushy_close" => (Metric::Trust, -12.0),
            "monologue" => (Metric::Interest, -6.0),
            "vague_pitch" => (Metric::Interest, -4.0),
            _ => return None,
        };
        Some(Self::new(name, metric, delta))
    }
}

/// Coarse disposition bucket derived from the three scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorTier {
    Guarded,
    Neutral,
    Engaged,
    Enthusiastic,
}

impl std::fmt::Display for BehaviorTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BehaviorTier::Guarded => "guarded",
            BehaviorTier::Neutral => "neutral",
            BehaviorTier::Engaged => "engaged",
            BehaviorTier::Enthusiastic => "enthusiastic",
        };
        write!(f, "{}", name)
    }
}

/// Instruction bundle pushed to the response planner on significant change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierInstructions {
    pub tier: BehaviorTier,
    pub response_style: String,
    pub question_frequency: String,
    pub engagement_level: String,
    /// One modifier per metric, e.g. "trust:low"
    pub modifiers: Vec<String>,
}
