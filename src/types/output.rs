//! Per-turn output of the behavior gate

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::{BehaviorStage, ConversationalFacts, ReasonCode, SilencePolicy};

/// Result of one gate evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    pub timestamp: DateTime<Utc>,
    pub stage: BehaviorStage,
    pub reason: ReasonCode,
    pub perceived_respect: f64,
    pub irritation_level: f64,
    pub user_effort_quality: f64,
    pub exchange_count: u32,
    pub silence_policy: SilencePolicy,
    /// Stage changed on this evaluation
    pub transitioned: bool,
    /// Call is over; the caller should hang up after the farewell
    pub call_ended: bool,
}

impl StageOutput {
    pub fn new(
        stage: BehaviorStage,
        reason: ReasonCode,
        facts: &ConversationalFacts,
        silence_policy: SilencePolicy,
        transitioned: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            stage,
            reason,
            perceived_respect: facts.perceived_respect,
            irritation_level: facts.irritation_level,
            user_effort_quality: facts.user_effort_quality,
            exchange_count: facts.exchange_count,
            silence_policy,
            transitioned,
            call_ended: stage.is_terminal(),
        }
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        format!(
            "stage={} | respect={:.2} | irritation={:.2} | effort={:.2} | {}",
            self.stage.colored(),
            self.perceived_respect,
            self.irritation_level,
            self.user_effort_quality,
            self.reason.code(),
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        format!(
            "stage={} | respect={:.2} | irritation={:.2} | effort={:.2} | reason={}",
            self.stage.as_str(),
            self.perceived_respect,
            self.irritation_level,
            self.user_effort_quality,
            self.reason.code()
        )
    }
}
