//! Coach outputs: fast-path reflexes and slow-path strategic plans

use serde::{Deserialize, Serialize};

/// How the prospect should treat the rep's last utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerPolicy {
    #[default]
    Answer,
    Clarify,
    Deflect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    None,
    Open,
    Closed,
    Leading,
    FollowUp,
}

/// Fast-path classification of the rep's turn
///
/// Also carried as optional coach metadata on generation responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachReflexes {
    pub max_sentences: u8,
    pub answer_policy: AnswerPolicy,
    pub hard_constraints: Vec<String>,
    pub question_type: QuestionType,
    /// Coach wants the prospect to step in (rep rambling, pushy close, ...)
    pub intervention: bool,
}

impl Default for CoachReflexes {
    fn default() -> Self {
        Self {
            max_sentences: 2,
            answer_policy: AnswerPolicy::Answer,
            hard_constraints: Vec::new(),
            question_type: QuestionType::None,
            intervention: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    Opening,
    Discovery,
    Pitch,
    Objection,
    Close,
}

/// Slow-path advice for future turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategicPlan {
    pub suggested_phase: ConversationPhase,
    /// Objection or test the prospect should spring later
    pub pending_trap: Option<String>,
    /// -1.0 (ease off) .. 1.0 (press harder)
    pub pressure_adjustment: f64,
}
