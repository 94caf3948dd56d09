//! Core types for prospect-sim

mod utterance;
mod turn;
mod facts;
mod reason;
mod output;
mod behavior;
mod coach;
mod objection;
mod scores;
mod rubric;

pub use utterance::{CandidateUtterance, Tone, SpeakingSpeed, SpeakOptions};
pub use turn::{TurnState, Speaker, TranscriptEvent, TranscriptLine, TranscriptHistory};
pub use facts::{
    ConversationalFacts, RelationshipContext, BehaviorStage, RequiredInfo, StageDirective,
    SilencePolicy,
};
pub use reason::ReasonCode;
pub use output::StageOutput;
pub use behavior::{BehaviorState, BehaviorSignals};
pub use coach::{CoachReflexes, AnswerPolicy, QuestionType, StrategicPlan, ConversationPhase};
pub use objection::{
    ResolutionSignal, HiddenRoot, ObjectionTemplate, ObjectionInstance, ResolutionPath, Assessment,
};
pub use scores::{Metric, SessionScores, ScoringEvent, BehaviorTier, TierInstructions};
pub use rubric::{RubricInput, RubricScore, RubricSource, SkillLevel};
