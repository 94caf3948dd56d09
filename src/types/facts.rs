//! Conversational facts and the behavior stages derived from them

use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};

/// How the rep framed the relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipContext {
    /// Cold call
    Cold,
    /// Rep claims a prior relationship (unverified)
    WarmClaimed,
    /// Prior relationship confirmed by the scenario
    WarmVerified,
}

impl RelationshipContext {
    /// Warm contacts are not asked which company they are with
    pub fn skips_company_gate(&self) -> bool {
        !matches!(self, RelationshipContext::Cold)
    }
}

/// Facts the persona has gathered, updated once per final user turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationalFacts {
    pub has_name: bool,
    pub has_company: bool,
    pub purpose_stated: bool,
    pub exchange_count: u32,
    pub exchanges_without_purpose: u32,
    /// 0.0 - 1.0
    pub perceived_respect: f64,
    /// 0.0 - 1.0
    pub irritation_level: f64,
    /// 0.0 - 1.0, running average
    pub user_effort_quality: f64,
    pub consecutive_minimal_responses: u32,
    pub relationship_context: RelationshipContext,
    /// Fixed at session start
    pub variance_seed: f64,
}

impl ConversationalFacts {
    /// Fresh facts for a cold call
    pub fn new(variance_seed: f64, initial_respect: f64, initial_effort: f64) -> Self {
        Self {
            has_name: false,
            has_company: false,
            purpose_stated: false,
            exchange_count: 0,
            exchanges_without_purpose: 0,
            perceived_respect: initial_respect.clamp(0.0, 1.0),
            irritation_level: 0.0,
            user_effort_quality: initial_effort.clamp(0.0, 1.0),
            consecutive_minimal_responses: 0,
            relationship_context: RelationshipContext::Cold,
            variance_seed: variance_seed.clamp(0.0, 1.0),
        }
    }

    /// User turns so far
    ///
    /// Never less than the purposeless count, which is itself a count of turns.
    pub fn exchanges(&self) -> u32 {
        self.exchange_count.max(self.exchanges_without_purpose)
    }
}

impl Default for ConversationalFacts {
    fn default() -> Self {
        Self::new(0.5, 0.75, 0.5)
    }
}

/// Rung of the persona's patience ladder, in increasing severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorStage {
    Normal,
    NeedsName,
    NeedsCompany,
    NeedsPurpose,
    Direct,
    Impatient,
    /// Terminal: the prospect ends the call
    Done,
}

impl BehaviorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorStage::Normal => "normal",
            BehaviorStage::NeedsName => "needs_name",
            BehaviorStage::NeedsCompany => "needs_company",
            BehaviorStage::NeedsPurpose => "needs_purpose",
            BehaviorStage::Direct => "direct",
            BehaviorStage::Impatient => "impatient",
            BehaviorStage::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BehaviorStage::Done)
    }

    /// Stage label colored for terminal display
    pub fn colored(&self) -> ColoredString {
        let label = self.as_str().to_uppercase();
        match self {
            BehaviorStage::Normal => label.green(),
            BehaviorStage::NeedsName | BehaviorStage::NeedsCompany | BehaviorStage::NeedsPurpose => {
                label.cyan()
            }
            BehaviorStage::Direct => label.yellow(),
            BehaviorStage::Impatient => label.bright_red(),
            BehaviorStage::Done => label.red().bold(),
        }
    }

    /// What the persona is steering toward at this stage
    pub fn directive(&self) -> StageDirective {
        match self {
            BehaviorStage::Normal => StageDirective {
                demand: None,
                max_sentences: 3,
                instruction: "Engage naturally; answer what was asked",
            },
            BehaviorStage::NeedsName => StageDirective {
                demand: Some(RequiredInfo::Name),
                max_sentences: 1,
                instruction: "Ask who is calling before anything else",
            },
            BehaviorStage::NeedsCompany => StageDirective {
                demand: Some(RequiredInfo::Company),
                max_sentences: 1,
                instruction: "Ask which company the caller is with",
            },
            BehaviorStage::NeedsPurpose => StageDirective {
                demand: Some(RequiredInfo::Purpose),
                max_sentences: 1,
                instruction: "Ask what the call is about",
            },
            BehaviorStage::Direct => StageDirective {
                demand: None,
                max_sentences: 2,
                instruction: "Be brief and push for the point",
            },
            BehaviorStage::Impatient => StageDirective {
                demand: None,
                max_sentences: 1,
                instruction: "Signal you are about to hang up",
            },
            BehaviorStage::Done => StageDirective {
                demand: None,
                max_sentences: 1,
                instruction: "End the call politely but firmly",
            },
        }
    }
}

impl std::fmt::Display for BehaviorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// Information the persona insists on before cooperating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredInfo {
    Name,
    Company,
    Purpose,
}

/// Stage-specific steering passed to the generation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageDirective {
    pub demand: Option<RequiredInfo>,
    pub max_sentences: u8,
    pub instruction: &'static str,
}

/// How the persona treats silence after its own turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SilencePolicy {
    /// Effort has been earned; wait quietly
    PatientWait { max_wait_ms: u64 },
    /// Nudge after a short wait
    Prompt { after_ms: u64 },
    /// Let the conversation die out
    Fade,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering_is_severity() {
        assert!(BehaviorStage::Normal < BehaviorStage::NeedsName);
        assert!(BehaviorStage::Impatient < BehaviorStage::Done);
    }

    #[test]
    fn test_only_done_is_terminal() {
        assert!(BehaviorStage::Done.is_terminal());
        assert!(!BehaviorStage::Impatient.is_terminal());
    }

    #[test]
    fn test_warm_skips_company() {
        assert!(!RelationshipContext::Cold.skips_company_gate());
        assert!(RelationshipContext::WarmClaimed.skips_company_gate());
        assert!(RelationshipContext::WarmVerified.skips_company_gate());
    }

    #[test]
    fn test_exchanges_uses_larger_count() {
        let facts = ConversationalFacts {
            exchanges_without_purpose: 2,
            ..Default::default()
        };
        assert_eq!(facts.exchanges(), 2);
    }

    #[test]
    fn test_gate_stages_demand_info() {
        assert_eq!(BehaviorStage::NeedsName.directive().demand, Some(RequiredInfo::Name));
        assert_eq!(BehaviorStage::Normal.directive().demand, None);
    }
}
