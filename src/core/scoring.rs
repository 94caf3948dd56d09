//! Scoring Engine: rapport / trust / interest telemetry → behavior tier
//!
//! Scores only move through named events. After each event the tier is
//! recomputed; a tier change, or a move of at least `significant_change` on
//! any metric since the last push, produces a fresh instruction bundle for
//! the response planner.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ScoringConfig;
use crate::types::{BehaviorTier, Metric, ScoringEvent, SessionScores, TierInstructions};

/// Mean below which the prospect is guarded
const GUARDED_BELOW: f64 = 35.0;
const NEUTRAL_BELOW: f64 = 55.0;
const ENGAGED_BELOW: f64 = 75.0;

/// Trust below this caps the tier at guarded
const TRUST_FLOOR: f64 = 25.0;

/// Tier as a pure function of the scores
pub fn tier_for(scores: &SessionScores) -> BehaviorTier {
    if scores.trust < TRUST_FLOOR {
        return BehaviorTier::Guarded;
    }
    let mean = scores.mean();
    if mean < GUARDED_BELOW {
        BehaviorTier::Guarded
    } else if mean < NEUTRAL_BELOW {
        BehaviorTier::Neutral
    } else if mean < ENGAGED_BELOW {
        BehaviorTier::Engaged
    } else {
        BehaviorTier::Enthusiastic
    }
}

/// Instruction bundle for a tier, with one modifier per metric
pub fn instructions_for(tier: BehaviorTier, scores: &SessionScores) -> TierInstructions {
    let (response_style, question_frequency, engagement_level) = match tier {
        BehaviorTier::Guarded => ("short, clipped answers; volunteer nothing", "rarely", "minimal"),
        BehaviorTier::Neutral => ("polite and brief; answer what is asked", "occasionally", "moderate"),
        BehaviorTier::Engaged => ("conversational; share context when asked", "regularly", "active"),
        BehaviorTier::Enthusiastic => ("open and forthcoming; think out loud", "frequently", "high"),
    };
    let modifiers = Metric::ALL
        .iter()
        .map(|m| {
            let value = scores.get(*m);
            let band = if value < GUARDED_BELOW {
                "low"
            } else if value >= 70.0 {
                "high"
            } else {
                "steady"
            };
            format!("{}:{}", metric_name(*m), band)
        })
        .collect();

    TierInstructions {
        tier,
        response_style: response_style.to_string(),
        question_frequency: question_frequency.to_string(),
        engagement_level: engagement_level.to_string(),
        modifiers,
    }
}

fn metric_name(metric: Metric) -> &'static str {
    match metric {
        Metric::Rapport => "rapport",
        Metric::Trust => "trust",
        Metric::Interest => "interest",
    }
}

// =============================================================================
// SCORE STORE
// =============================================================================

/// Event log for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub initial: SessionScores,
    pub events: Vec<ScoringEvent>,
    pub final_scores: Option<SessionScores>,
}

/// Session-scoped persistence for scoring events
pub trait ScoreStore: Send + Sync {
    fn start(&self, session_id: &str, initial: &SessionScores);
    fn append(&self, session_id: &str, event: &ScoringEvent, scores: &SessionScores);
    fn end(&self, session_id: &str, final_scores: &SessionScores) -> Option<ScoreRecord>;
}

#[derive(Debug, Default)]
pub struct InMemoryScoreStore {
    records: Mutex<HashMap<String, ScoreRecord>>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, session_id: &str) -> Option<ScoreRecord> {
        self.records.lock().ok()?.get(session_id).cloned()
    }
}

impl ScoreStore for InMemoryScoreStore {
    fn start(&self, session_id: &str, initial: &SessionScores) {
        if let Ok(mut records) = self.records.lock() {
            records.insert(
                session_id.to_string(),
                ScoreRecord {
                    session_id: session_id.to_string(),
                    started_at: Utc::now(),
                    ended_at: None,
                    initial: initial.clone(),
                    events: Vec::new(),
                    final_scores: None,
                },
            );
        }
    }

    fn append(&self, session_id: &str, event: &ScoringEvent, _scores: &SessionScores) {
        let Ok(mut records) = self.records.lock() else {
            return;
        };
        match records.get_mut(session_id) {
            Some(record) => record.events.push(event.clone()),
            None => warn!(session_id, event = %event.name, "append to unknown score session"),
        }
    }

    fn end(&self, session_id: &str, final_scores: &SessionScores) -> Option<ScoreRecord> {
        let mut records = self.records.lock().ok()?;
        let record = records.get_mut(session_id)?;
        record.ended_at = Some(Utc::now());
        record.final_scores = Some(final_scores.clone());
        Some(record.clone())
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Result of applying one event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreUpdate {
    pub scores: SessionScores,
    pub tier: BehaviorTier,
    pub tier_changed: bool,
    /// Present when the change is significant enough to push
    pub instructions: Option<TierInstructions>,
}

pub struct ScoringEngine {
    session_id: String,
    config: ScoringConfig,
    scores: SessionScores,
    tier: BehaviorTier,
    /// Scores at the last instruction push
    baseline: SessionScores,
    store: Arc<dyn ScoreStore>,
    events: Vec<ScoringEvent>,
}

impl ScoringEngine {
    pub fn new(session_id: impl Into<String>, config: ScoringConfig, store: Arc<dyn ScoreStore>) -> Self {
        let session_id = session_id.into();
        let scores = SessionScores::new(config.initial_score);
        store.start(&session_id, &scores);
        Self {
            session_id,
            tier: tier_for(&scores),
            baseline: scores.clone(),
            scores,
            config,
            store,
            events: Vec::new(),
        }
    }

    /// Apply a named catalog event; unknown names are ignored
    pub fn apply_named(&mut self, name: &str) -> Option<ScoreUpdate> {
        match ScoringEvent::named(name) {
            Some(event) => Some(self.apply(event)),
            None => {
                warn!(event = name, "unknown scoring event");
                None
            }
        }
    }

    pub fn apply(&mut self, event: ScoringEvent) -> ScoreUpdate {
        self.scores.apply(event.metric, event.delta);
        self.store.append(&self.session_id, &event, &self.scores);
        debug!(
            session_id = %self.session_id,
            event = %event.name,
            rapport = self.scores.rapport,
            trust = self.scores.trust,
            interest = self.scores.interest,
            "scoring event"
        );
        self.events.push(event);

        let tier = tier_for(&self.scores);
        let tier_changed = tier != self.tier;
        if tier_changed {
            info!(session_id = %self.session_id, from = %self.tier, to = %tier, "behavior tier changed");
        }
        self.tier = tier;

        let significant = Metric::ALL.iter().any(|m| {
            (self.scores.get(*m) - self.baseline.get(*m)).abs() >= self.config.significant_change
        });
        let instructions = if tier_changed || significant {
            self.baseline = self.scores.clone();
            Some(instructions_for(tier, &self.scores))
        } else {
            None
        };

        ScoreUpdate {
            scores: self.scores.clone(),
            tier,
            tier_changed,
            instructions,
        }
    }

    /// Close the session in the store
    pub fn finish(&self) -> Option<ScoreRecord> {
        self.store.end(&self.session_id, &self.scores)
    }

    pub fn scores(&self) -> &SessionScores {
        &self.scores
    }

    pub fn tier(&self) -> BehaviorTier {
        self.tier
    }

    pub fn events(&self) -> &[ScoringEvent] {
        &self.events
    }

    /// How many times an event fired this session
    pub fn count(&self, name: &str) -> u32 {
        self.events.iter().filter(|e| e.name == name).count() as u32
    }

    pub fn current_instructions(&self) -> TierInstructions {
        instructions_for(self.tier, &self.scores)
    }
}

// =============================================================================
// TESTS
// =============================================================================
