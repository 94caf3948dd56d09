//! Offline collaborators for the interactive demo and tests
//!
//! A scripted prospect that follows the behavior stage, a coach built on the
//! extraction patterns, and speech sinks that simulate playback time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;

use crate::core::extract;
use crate::core::services::{
    ClassifyRequest, CoachService, GenerationRequest, GenerationResponse, GenerationService,
    PlanRequest, SpeechSink,
};
use crate::error::ServiceError;
use crate::types::{
    AnswerPolicy, BehaviorStage, BehaviorTier, CoachReflexes, ConversationPhase, QuestionType,
    SpeakOptions, StrategicPlan, Tone,
};

/// Normal-stage turn on which the scripted prospect raises its objection
const OBJECTION_TURN: usize = 2;

const NORMAL_LINES: &[&str] = &[
    "Alright, I'm listening. We move about four hundred loads a week, mostly regional.",
    "Our carriers are fine most weeks. Peak season is where it falls apart.",
    "Go on. What would that actually look like for us?",
    "Hm. And how long does something like that take to get running?",
    "Okay. Send me something short and I'll take a look.",
];

/// Stage-driven prospect lines
#[derive(Debug, Default)]
pub struct ScriptedProspect {
    normal_turns: AtomicUsize,
}

impl ScriptedProspect {
    pub fn new() -> Self {
        Self::default()
    }

    fn normal_line(&self, request: &GenerationRequest) -> GenerationResponse {
        let turn = self.normal_turns.fetch_add(1, Ordering::SeqCst);
        if turn == OBJECTION_TURN {
            return GenerationResponse {
                text: "Honestly, we just don't have the budget for this right now.".to_string(),
                raised_objection: Some("budget".to_string()),
                ..Default::default()
            };
        }

        let guarded = request
            .tier
            .as_ref()
            .map(|t| t.tier == BehaviorTier::Guarded)
            .unwrap_or(false);
        let text = if guarded {
            "Mm. I'm not sure this is for us."
        } else {
            NORMAL_LINES[turn.min(NORMAL_LINES.len() - 1)]
        };
        GenerationResponse {
            text: text.to_string(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl GenerationService for ScriptedProspect {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        let text = match request.stage {
            BehaviorStage::NeedsName => "Sorry, who is this?",
            BehaviorStage::NeedsCompany => "And which company are you with?",
            BehaviorStage::NeedsPurpose => "Okay. What's this about?",
            BehaviorStage::Direct => "I've got a couple of minutes. What exactly are you offering?",
            BehaviorStage::Impatient => "Look, I'm busy. Get to the point or I'm hanging up.",
            BehaviorStage::Done => "I'm going to stop you there. Not interested. Goodbye.",
            BehaviorStage::Normal => return Ok(self.normal_line(request)),
        };
        Ok(GenerationResponse {
            text: text.to_string(),
            ..Default::default()
        })
    }
}

/// Coach built from the local extraction patterns
#[derive(Debug, Default)]
pub struct LocalCoach;

#[async_trait]
impl CoachService for LocalCoach {
    async fn classify(&self, request: &ClassifyRequest) -> Result<CoachReflexes, ServiceError> {
        let text = request.utterance.as_str();
        let prev = request.previous_prospect_line.as_deref();

        let question_type = if extract::is_follow_up(text, prev) {
            QuestionType::FollowUp
        } else if extract::is_leading_question(text) {
            QuestionType::Leading
        } else if extract::is_open_question(text) {
            QuestionType::Open
        } else if extract::is_closed_question(text) {
            QuestionType::Closed
        } else {
            QuestionType::None
        };

        let pushy = extract::is_pushy(text);
        let rambling = extract::word_count(text) > 80;
        let answer_policy = if pushy {
            AnswerPolicy::Deflect
        } else if extract::is_vague(text) {
            AnswerPolicy::Clarify
        } else {
            AnswerPolicy::Answer
        };

        let mut hard_constraints = Vec::new();
        if answer_policy == AnswerPolicy::Clarify {
            hard_constraints.push("ask what they actually mean".to_string());
        }
        if pushy {
            hard_constraints.push("do not agree to anything".to_string());
        }

        Ok(CoachReflexes {
            max_sentences: if question_type == QuestionType::Open { 3 } else { 2 },
            answer_policy,
            hard_constraints,
            question_type,
            intervention: pushy || rambling,
        })
    }

    async fn plan(&self, request: &PlanRequest) -> Result<StrategicPlan, ServiceError> {
        let lines = request.transcript.lines().count();
        let suggested_phase = match request.stage {
            BehaviorStage::NeedsName | BehaviorStage::NeedsCompany | BehaviorStage::NeedsPurpose => {
                ConversationPhase::Opening
            }
            BehaviorStage::Impatient | BehaviorStage::Done => ConversationPhase::Close,
            _ if lines < 6 => ConversationPhase::Discovery,
            _ if request.transcript.to_lowercase().contains("budget") => ConversationPhase::Objection,
            _ => ConversationPhase::Pitch,
        };
        let pending_trap = match suggested_phase {
            ConversationPhase::Discovery | ConversationPhase::Pitch => Some("timing".to_string()),
            _ => None,
        };
        let pressure_adjustment = match request.stage {
            BehaviorStage::Direct | BehaviorStage::Impatient => 0.5,
            _ => 0.0,
        };
        Ok(StrategicPlan {
            suggested_phase,
            pending_trap,
            pressure_adjustment,
        })
    }
}

fn playback(text: &str, options: &SpeakOptions) -> Duration {
    let words = text.split_whitespace().count() as f64;
    Duration::from_millis((words / options.speaking_speed.words_per_second() * 1000.0) as u64)
}

/// Simulates playback time and nothing else
#[derive(Debug, Default)]
pub struct SimulatedSpeechSink;

#[async_trait]
impl SpeechSink for SimulatedSpeechSink {
    async fn speak(&self, text: &str, options: SpeakOptions) -> Result<(), ServiceError> {
        tokio::time::sleep(playback(text, &options)).await;
        Ok(())
    }
}

/// Prints the prospect's line, colored by tone, then simulates playback
#[derive(Debug, Default)]
pub struct ConsoleSpeechSink;

#[async_trait]
impl SpeechSink for ConsoleSpeechSink {
    async fn speak(&self, text: &str, options: SpeakOptions) -> Result<(), ServiceError> {
        let line = match options.tone {
            Tone::Warm => text.green(),
            Tone::Guarded | Tone::Hesitant => text.cyan(),
            Tone::Curt | Tone::Firm => text.red(),
            Tone::Neutral => text.normal(),
        };
        println!("{} {}", "Prospect:".bold(), line);
        tokio::time::sleep(playback(text, &options)).await;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
