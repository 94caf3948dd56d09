//! Post-call rubric

use serde::{Deserialize, Serialize};

/// Call statistics the rubric is computed from
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RubricInput {
    /// Rep's share of spoken words (0.0 - 1.0)
    pub talk_ratio: f64,
    pub open_ended_count: u32,
    pub follow_up_count: u32,
    pub objections_raised: u32,
    pub objections_resolved: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SkillLevel {
    Developing,
    Proficient,
    Strong,
    Advanced,
}

impl SkillLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 8.5 {
            SkillLevel::Advanced
        } else if score >= 7.0 {
            SkillLevel::Strong
        } else if score >= 5.5 {
            SkillLevel::Proficient
        } else {
            SkillLevel::Developing
        }
    }
}

/// Who produced the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RubricSource {
    Judge,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricScore {
    /// 0 - 10, floored and capped
    pub score: f64,
    pub level: SkillLevel,
    pub source: RubricSource,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_bands() {
        assert_eq!(SkillLevel::from_score(4.0), SkillLevel::Developing);
        assert_eq!(SkillLevel::from_score(6.0), SkillLevel::Proficient);
        assert_eq!(SkillLevel::from_score(8.1), SkillLevel::Strong);
        assert_eq!(SkillLevel::from_score(9.0), SkillLevel::Advanced);
    }
}
