//! Behavior Gate Engine ("Marcus"): patience ladder over conversational facts
//!
//! Stage rules, evaluated fresh each turn, first match wins:
//! - irritation ≥ done line                         → DONE (latched)
//! - no name after ≥1 exchange                      → NEEDS_NAME
//! - no company (skipped for warm relationships)    → NEEDS_COMPANY
//! - no purpose                                     → NEEDS_PURPOSE
//! - respect / irritation past impatience lines     → IMPATIENT
//! - too many purposeless exchanges, guarded respect→ DIRECT
//! - otherwise                                      → NORMAL

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::GateConfig;
use crate::core::extract;
use crate::types::{
    BehaviorStage, ConversationalFacts, ReasonCode, RelationshipContext, SilencePolicy,
    StageOutput,
};

/// Derive the stage from facts alone (no latch)
pub fn derive_stage(facts: &ConversationalFacts, config: &GateConfig) -> (BehaviorStage, ReasonCode) {
    let seed = facts.variance_seed;

    if facts.irritation_level >= config.done_irritation {
        return (BehaviorStage::Done, ReasonCode::G001_IRRITATION_TERMINAL);
    }
    if !facts.has_name && facts.exchanges() >= 1 {
        return (BehaviorStage::NeedsName, ReasonCode::G002_NAME_REQUIRED);
    }
    if !facts.has_company && !facts.relationship_context.skips_company_gate() {
        return (BehaviorStage::NeedsCompany, ReasonCode::G003_COMPANY_REQUIRED);
    }
    if !facts.purpose_stated {
        return (BehaviorStage::NeedsPurpose, ReasonCode::G004_PURPOSE_REQUIRED);
    }
    if facts.perceived_respect < config.impatient_respect.at(seed) {
        return (BehaviorStage::Impatient, ReasonCode::G005_RESPECT_LOW);
    }
    if facts.irritation_level > config.impatient_irritation.at(seed) {
        return (BehaviorStage::Impatient, ReasonCode::G005_IRRITATION_HIGH);
    }
    if facts.exchanges_without_purpose as f64 > config.direct_exchanges.at(seed) {
        return (BehaviorStage::Direct, ReasonCode::G006_PURPOSELESS_EXCHANGES);
    }
    if facts.perceived_respect < config.direct_respect.at(seed) {
        return (BehaviorStage::Direct, ReasonCode::G006_RESPECT_GUARDED);
    }
    (BehaviorStage::Normal, ReasonCode::G007_ENGAGED)
}

/// Fold one final rep utterance into the facts
///
/// Irritation only rises here; lowering it is reserved for deltas supplied
/// by the generation service.
pub fn update_facts(prior: &ConversationalFacts, text: &str, config: &GateConfig) -> ConversationalFacts {
    let mut facts = prior.clone();
    facts.exchange_count += 1;

    // Identity and purpose
    if !facts.has_name && extract::extract_name(text).is_some() {
        facts.has_name = true;
    }
    if !facts.has_company && extract::extract_company(text).is_some() {
        facts.has_company = true;
    }
    if facts.relationship_context == RelationshipContext::Cold
        && extract::claims_warm_relationship(text)
    {
        facts.relationship_context = RelationshipContext::WarmClaimed;
    }
    if !facts.purpose_stated && extract::states_purpose(text) {
        facts.purpose_stated = true;
    }
    if !facts.purpose_stated {
        facts.exchanges_without_purpose += 1;
    }

    // Engagement quality
    let minimal = extract::is_minimal_response(text);
    let thoughtful = extract::is_thoughtful_question(text);
    let vague = extract::vagueness_hits(text).min(2) as f64;
    let turn_quality = if minimal {
        0.1
    } else if thoughtful {
        0.9
    } else {
        0.5
    };
    let turn_quality = (turn_quality - 0.15 * vague).clamp(0.0, 1.0);
    let w = config.effort_prior_weight;
    facts.user_effort_quality = (w * prior.user_effort_quality + (1.0 - w) * turn_quality).clamp(0.0, 1.0);
    facts.consecutive_minimal_responses = if minimal {
        prior.consecutive_minimal_responses + 1
    } else {
        0
    };

    // Respect
    let (disrespect, courtesy) = extract::respect_cues(text);
    let mut respect = facts.perceived_respect;
    respect -= disrespect as f64 * config.disrespect_delta;
    respect += courtesy as f64 * config.courtesy_delta;
    if thoughtful {
        respect += config.thoughtful_delta;
    }
    facts.perceived_respect = respect.clamp(0.0, 1.0);

    // Irritation
    let mut bump = 0.0;
    if facts.perceived_respect < config.low_respect_line {
        bump += config.low_respect_irritation;
    }
    if !facts.purpose_stated && facts.exchanges_without_purpose > config.purposeless_grace {
        bump += config.purposeless_irritation;
    }
    if facts.consecutive_minimal_responses >= config.fade_minimal_count {
        bump += config.minimal_irritation;
    }
    facts.irritation_level = (facts.irritation_level + bump).min(1.0);

    facts
}

/// Stable per-session variance seed in [0, 1]
pub fn variance_seed_for(session_id: &str) -> f64 {
    let digest = Sha256::digest(session_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_le_bytes(bytes) as f64 / u64::MAX as f64
}

/// Behavior gate state machine for one call
#[derive(Debug)]
pub struct BehaviorGateEngine {
    config: GateConfig,
    facts: ConversationalFacts,
    stage: BehaviorStage,
    reason: ReasonCode,
    /// Set once DONE is reached
    terminal: bool,
    update_count: u64,
}

impl BehaviorGateEngine {
    /// New engine for a cold call
    pub fn new(config: GateConfig, variance_seed: f64) -> Self {
        let facts = ConversationalFacts::new(variance_seed, config.initial_respect, config.initial_effort);
        Self::with_facts(config, facts)
    }

    /// Engine starting from explicit facts (scenario setup, tests)
    pub fn with_facts(config: GateConfig, facts: ConversationalFacts) -> Self {
        Self {
            config,
            facts,
            stage: BehaviorStage::Normal,
            reason: ReasonCode::G007_OPENING,
            terminal: false,
            update_count: 0,
        }
    }

    /// Update facts from a final rep utterance and re-evaluate
    pub fn observe_user_turn(&mut self, text: &str) -> StageOutput {
        if !self.terminal {
            self.facts = update_facts(&self.facts, text, &self.config);
        }
        self.evaluate()
    }

    /// Irritation delta supplied by the generation service (may be negative)
    pub fn apply_irritation_delta(&mut self, delta: f64) -> StageOutput {
        if !self.terminal {
            self.facts.irritation_level = (self.facts.irritation_level + delta).clamp(0.0, 1.0);
            debug!(delta, irritation = self.facts.irritation_level, "external irritation delta");
        }
        self.evaluate()
    }

    /// Scenario-level relationship override (e.g. verified warm lead)
    pub fn set_relationship(&mut self, context: RelationshipContext) {
        self.facts.relationship_context = context;
    }

    /// Re-derive the stage from current facts, honoring the terminal latch
    pub fn evaluate(&mut self) -> StageOutput {
        self.update_count += 1;
        let (stage, reason) = if self.terminal {
            (BehaviorStage::Done, ReasonCode::G001_TERMINAL_LATCHED)
        } else {
            derive_stage(&self.facts, &self.config)
        };

        let transitioned = stage != self.stage;
        if transitioned {
            info!(from = %self.stage, to = %stage, reason = reason.code(), "behavior stage transition");
        }
        self.stage = stage;
        self.reason = reason;
        if stage.is_terminal() {
            self.terminal = true;
        }

        StageOutput::new(stage, reason, &self.facts, self.silence_policy(), transitioned)
    }

    /// How to treat silence after the prospect's turn
    pub fn silence_policy(&self) -> SilencePolicy {
        if self.terminal || self.facts.consecutive_minimal_responses >= self.config.fade_minimal_count {
            SilencePolicy::Fade
        } else if self.facts.user_effort_quality >= self.config.patient_effort {
            SilencePolicy::PatientWait {
                max_wait_ms: self.config.patient_wait_ms,
            }
        } else {
            SilencePolicy::Prompt {
                after_ms: self.config.prompt_wait_ms,
            }
        }
    }

    pub fn stage(&self) -> BehaviorStage {
        self.stage
    }

    pub fn facts(&self) -> &ConversationalFacts {
        &self.facts
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Current output without re-evaluating
    pub fn current_output(&self) -> StageOutput {
        StageOutput::new(self.stage, self.reason, &self.facts, self.silence_policy(), false)
    }
}

// =============================================================================
// TESTS
// =============================================================================
