//! Response Planner (meaning authority)
//!
//! Owns the transcript and the rep's behavior state. Builds generation
//! requests from everything the session knows and shapes generated text into
//! candidate utterances. The generation call itself runs off the session
//! loop, so the request/response halves are separate.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::core::extract;
use crate::core::services::{GenerationRequest, GenerationResponse, GenerationService};
use crate::types::{
    BehaviorStage, BehaviorState, CandidateUtterance, CoachReflexes, QuestionType, Speaker,
    SpeakingSpeed, StrategicPlan, TierInstructions, Tone, TranscriptEvent, TranscriptHistory,
    TranscriptLine,
};

lazy_static! {
    /// Sentence with its terminal punctuation
    static ref RE_SENTENCE: Regex = Regex::new(r"[^.!?]+[.!?]*").unwrap();
}

/// Call the generation service; failure or blank output is an empty response
pub async fn generate_prospect_response(
    generator: &dyn GenerationService,
    request: &GenerationRequest,
) -> GenerationResponse {
    match generator.generate(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(session_id = %request.session_id, error = %e, "generation failed");
            GenerationResponse::default()
        }
    }
}

/// Keep at most `max` sentences
pub fn cap_sentences(text: &str, max: u8) -> String {
    let max = max.max(1) as usize;
    let sentences: Vec<&str> = RE_SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.len() <= max {
        return text.trim().to_string();
    }
    sentences[..max].join(" ")
}

pub struct ResponsePlanner {
    session_id: String,
    config: PlannerConfig,
    history: TranscriptHistory,
    behavior: BehaviorState,
    tier: Option<TierInstructions>,
    generator: Arc<dyn GenerationService>,
}

impl ResponsePlanner {
    pub fn new(
        session_id: impl Into<String>,
        config: PlannerConfig,
        generator: Arc<dyn GenerationService>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            history: TranscriptHistory::new(config.history_limit),
            config,
            behavior: BehaviorState::default(),
            tier: None,
            generator,
        }
    }

    /// Record a transcript event; returns true for a final, non-blank line
    ///
    /// User lines also update the behavior state.
    pub fn on_transcript(&mut self, event: &TranscriptEvent) -> bool {
        let text = event.text.trim();
        if !event.is_final || text.is_empty() {
            return false;
        }
        if event.speaker == Speaker::User {
            let signals = extract::behavior_signals(text);
            self.behavior = self.behavior.blend(&signals, self.config.behavior_blend);
            debug!(
                awkwardness = self.behavior.awkwardness_level,
                control = self.behavior.control_taking,
                energy = self.behavior.energy_level,
                "behavior state"
            );
        }
        self.history.add_line(TranscriptLine::new(event.speaker, text));
        true
    }

    pub fn set_tier_instructions(&mut self, instructions: TierInstructions) {
        self.tier = Some(instructions);
    }

    /// Everything the generation service needs for the next prospect turn
    pub fn build_request(
        &self,
        stage: BehaviorStage,
        reflexes: Option<&CoachReflexes>,
        plan: Option<&StrategicPlan>,
    ) -> GenerationRequest {
        GenerationRequest {
            session_id: self.session_id.clone(),
            transcript: self.history.render(),
            persona: self.config.persona.clone(),
            behavior_state: self.behavior,
            stage,
            directive: stage.directive(),
            reflexes: reflexes.cloned(),
            plan: plan.cloned(),
            tier: self.tier.clone(),
        }
    }

    /// Shape generated text into a candidate; `None` for blank text
    pub fn build_candidate(
        &self,
        text: &str,
        reflexes: Option<&CoachReflexes>,
        stage: BehaviorStage,
    ) -> Option<CandidateUtterance> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let mut max_sentences = stage.directive().max_sentences;
        if let Some(r) = reflexes {
            max_sentences = max_sentences.min(r.max_sentences.max(1));
        }
        let text = cap_sentences(text, max_sentences);

        let intervention = reflexes.map(|r| r.intervention).unwrap_or(false);
        let mut priority = self.config.base_priority + self.behavior.control_taking * 0.2;
        if intervention {
            priority += self.config.intervention_boost;
        }

        let mut expiry_ms = self.config.expiry_ms;
        if reflexes.map(|r| r.question_type == QuestionType::Open).unwrap_or(false) {
            expiry_ms = (expiry_ms as f64 * self.config.open_question_expiry_factor) as u64;
        }

        let pre_delay_ms = self.config.base_pre_delay_ms
            + (self.behavior.awkwardness_level * self.config.max_hesitation_ms as f64) as u64;
        let (tone, speed) = self.manner(stage);
        let farewell = stage.is_terminal();
        // An intervention or a steamrolling rep means the prospect finishes the thought
        let interruptible = !farewell
            && !intervention
            && self.behavior.control_taking <= self.config.hold_floor_control;

        Some(
            CandidateUtterance::new(text, priority.min(1.0))
                .with_expiry_ms(expiry_ms)
                .with_pre_delay_ms(pre_delay_ms)
                .with_manner(tone, speed)
                .with_abortable(!farewell)
                .with_interruptible(interruptible),
        )
    }

    fn manner(&self, stage: BehaviorStage) -> (Tone, SpeakingSpeed) {
        let b = &self.behavior;
        let speed = if b.energy_level > 0.7 {
            SpeakingSpeed::Fast
        } else if b.energy_level < 0.3 {
            SpeakingSpeed::Slow
        } else {
            SpeakingSpeed::Normal
        };
        match stage {
            BehaviorStage::Done => (Tone::Firm, SpeakingSpeed::Normal),
            BehaviorStage::Impatient => (Tone::Curt, SpeakingSpeed::Fast),
            BehaviorStage::Direct => (Tone::Firm, speed),
            BehaviorStage::NeedsName | BehaviorStage::NeedsCompany | BehaviorStage::NeedsPurpose => {
                (Tone::Guarded, speed)
            }
            BehaviorStage::Normal => {
                let tone = if b.control_taking > 0.6 {
                    Tone::Guarded
                } else if b.awkwardness_level > 0.5 {
                    Tone::Hesitant
                } else if b.energy_level > 0.65 {
                    Tone::Warm
                } else {
                    Tone::Neutral
                };
                (tone, speed)
            }
        }
    }

    pub fn generator(&self) -> Arc<dyn GenerationService> {
        Arc::clone(&self.generator)
    }

    pub fn history(&self) -> &TranscriptHistory {
        &self.history
    }

    pub fn behavior(&self) -> &BehaviorState {
        &self.behavior
    }

    pub fn tier_instructions(&self) -> Option<&TierInstructions> {
        self.tier.as_ref()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The persona's first name ("Marcus, operations director..." → "Marcus")
    pub fn persona_name(&self) -> &str {
        self.config
            .persona
            .split(|c: char| c == ',' || c.is_whitespace())
            .next()
            .unwrap_or("")
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use async_trait::async_trait;

    struct FailingGenerator;

    #[async_trait]
    impl GenerationService for FailingGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResponse, ServiceError> {
            Err(ServiceError::RequestFailed("connection refused".to_string()))
        }
    }

    fn planner() -> ResponsePlanner {
        ResponsePlanner::new("s1", PlannerConfig::default(), Arc::new(FailingGenerator))
    }

    #[test]
    fn test_blank_text_is_dropped() {
        let p = planner();
        assert!(p.build_candidate("   ", None, BehaviorStage::Normal).is_none());
    }

    #[test]
    fn test_intervention_boost_is_capped() {
        let mut p = planner();
        // Push control-taking toward 1.0
        for _ in 0..6 {
            p.on_transcript(&TranscriptEvent::user("Listen. Tell me now? Give me numbers? Just answer?"));
        }
        let reflexes = CoachReflexes {
            intervention: true,
            ..Default::default()
        };
        let plain = p.build_candidate("Fine.", None, BehaviorStage::Normal).unwrap();
        let boosted = p.build_candidate("Fine.", Some(&reflexes), BehaviorStage::Normal).unwrap();
        assert!(boosted.priority > plain.priority);
        assert!(boosted.priority <= 1.0);
    }

    #[test]
    fn test_open_question_extends_expiry() {
        let p = planner();
        let reflexes = CoachReflexes {
            question_type: QuestionType::Open,
            ..Default::default()
        };
        let c = p.build_candidate("Good question.", Some(&reflexes), BehaviorStage::Normal).unwrap();
        assert_eq!(c.expires_after_ms, 12_000);
    }

    #[test]
    fn test_farewell_is_not_abortable() {
        let p = planner();
        let c = p.build_candidate("I'm done here. Goodbye.", None, BehaviorStage::Done).unwrap();
        assert!(!c.abortable);
        assert!(!c.interruptible);
        assert_eq!(c.tone, Tone::Firm);
    }

    #[test]
    fn test_interruptible_unless_holding_floor() {
        let mut p = planner();
        let plain = p.build_candidate("Go on.", None, BehaviorStage::Normal).unwrap();
        assert!(plain.interruptible);

        let intervention = CoachReflexes {
            intervention: true,
            ..Default::default()
        };
        let stepping_in = p.build_candidate("Hold on.", Some(&intervention), BehaviorStage::Normal).unwrap();
        assert!(!stepping_in.interruptible);
        assert!(stepping_in.abortable);

        // A rep firing questions pushes control-taking past the hold line
        for _ in 0..6 {
            p.on_transcript(&TranscriptEvent::user("Why? Why? Why? Why?"));
        }
        assert!(p.behavior().control_taking > PlannerConfig::default().hold_floor_control);
        let held = p.build_candidate("Let me finish.", None, BehaviorStage::Normal).unwrap();
        assert!(!held.interruptible);
    }

    #[test]
    fn test_stage_caps_sentences() {
        let p = planner();
        let c = p
            .build_candidate("Who is this? How did you get my number? I'm busy.", None, BehaviorStage::NeedsName)
            .unwrap();
        assert_eq!(c.text, "Who is this?");
    }

    #[test]
    fn test_fillers_raise_hesitation() {
        let mut p = planner();
        let calm = p.build_candidate("Sure.", None, BehaviorStage::Normal).unwrap().pre_delay_ms;
        p.on_transcript(&TranscriptEvent::user("Um, uh, so, like, um, you know, uh"));
        let hesitant = p.build_candidate("Sure.", None, BehaviorStage::Normal).unwrap().pre_delay_ms;
        assert!(hesitant > calm);
    }

    #[test]
    fn test_non_final_transcripts_ignored() {
        let mut p = planner();
        let partial = TranscriptEvent {
            text: "Hi this is".to_string(),
            speaker: Speaker::User,
            is_final: false,
        };
        assert!(!p.on_transcript(&partial));
        assert!(p.history().is_empty());
        assert!(p.on_transcript(&TranscriptEvent::prospect("Hello?")));
        assert_eq!(p.history().len(), 1);
    }

    #[test]
    fn test_request_carries_stage_directive_and_tier() {
        let mut p = planner();
        p.on_transcript(&TranscriptEvent::user("Hi there"));
        p.set_tier_instructions(crate::core::scoring::instructions_for(
            crate::types::BehaviorTier::Neutral,
            &crate::types::SessionScores::new(50.0),
        ));
        let request = p.build_request(BehaviorStage::NeedsName, None, None);
        assert_eq!(request.transcript, "Rep: Hi there");
        assert_eq!(request.directive.max_sentences, 1);
        assert!(request.tier.is_some());
    }

    #[tokio::test]
    async fn test_generation_failure_is_empty() {
        let p = planner();
        let request = p.build_request(BehaviorStage::Normal, None, None);
        let response = generate_prospect_response(p.generator().as_ref(), &request).await;
        assert!(response.text.is_empty());
    }

    #[test]
    fn test_cap_sentences() {
        assert_eq!(cap_sentences("One. Two! Three?", 2), "One. Two!");
        assert_eq!(cap_sentences("No punctuation here", 1), "No punctuation here");
    }
}
