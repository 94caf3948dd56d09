//! Post-call rubric: LLM judge with a deterministic fallback
//!
//! Heuristic (0 - 10 before clamping):
//!   base 2
//!   + talk ratio: 2 inside 0.4-0.6, 1 inside 0.3-0.7
//!   + 0.4 per open question (max 5)
//!   + 0.5 per follow-up (max 3)
//!   + 1.5 × objection resolution ratio (0.75 when none were raised)
//! Every score, judged or heuristic, is held to [RUBRIC_FLOOR, RUBRIC_CEILING].

use std::time::Duration;

use tracing::{info, warn};

use crate::core::services::{JudgeRequest, RubricJudge};
use crate::types::{RubricInput, RubricScore, RubricSource, SkillLevel};
use crate::{RUBRIC_CEILING, RUBRIC_FLOOR};

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return RUBRIC_FLOOR;
    }
    score.clamp(RUBRIC_FLOOR, RUBRIC_CEILING)
}

fn talk_ratio_points(ratio: f64) -> f64 {
    if (0.4..=0.6).contains(&ratio) {
        2.0
    } else if (0.3..=0.7).contains(&ratio) {
        1.0
    } else {
        0.0
    }
}

fn objection_points(raised: u32, resolved: u32) -> f64 {
    if raised == 0 {
        0.75
    } else {
        1.5 * (resolved.min(raised) as f64 / raised as f64)
    }
}

/// Deterministic rubric from call statistics
pub fn heuristic_score(input: &RubricInput) -> RubricScore {
    let raw = 2.0
        + talk_ratio_points(input.talk_ratio)
        + 0.4 * input.open_ended_count.min(5) as f64
        + 0.5 * input.follow_up_count.min(3) as f64
        + objection_points(input.objections_raised, input.objections_resolved);
    let score = clamp_score((raw * 10.0).round() / 10.0);
    let (strengths, improvements) = feedback(input);

    RubricScore {
        score,
        level: SkillLevel::from_score(score),
        source: RubricSource::Heuristic,
        strengths,
        improvements,
    }
}

fn feedback(input: &RubricInput) -> (Vec<String>, Vec<String>) {
    let mut strengths = Vec::new();
    let mut improvements = Vec::new();

    if (0.4..=0.6).contains(&input.talk_ratio) {
        strengths.push("Balanced talk time".to_string());
    } else if input.talk_ratio > 0.6 {
        improvements.push("Talk less; let the prospect carry more of the call".to_string());
    } else {
        improvements.push("Lead more; the prospect did most of the talking".to_string());
    }

    if input.open_ended_count >= 3 {
        strengths.push("Asked open-ended questions".to_string());
    } else {
        improvements.push("Ask more open-ended questions".to_string());
    }

    if input.follow_up_count >= 2 {
        strengths.push("Built on the prospect's answers with follow-ups".to_string());
    } else {
        improvements.push("Follow up on what the prospect tells you".to_string());
    }

    if input.objections_raised > 0 {
        if input.objections_resolved >= input.objections_raised {
            strengths.push("Resolved every objection raised".to_string());
        } else {
            improvements.push("Address the root cause behind objections, not the surface".to_string());
        }
    }

    (strengths, improvements)
}

/// Ask the judge within `timeout_ms`; fall back to the heuristic on any failure
pub async fn evaluate(
    judge: Option<&dyn RubricJudge>,
    request: &JudgeRequest,
    timeout_ms: u64,
) -> RubricScore {
    let Some(judge) = judge else {
        return heuristic_score(&request.stats);
    };

    match tokio::time::timeout(Duration::from_millis(timeout_ms), judge.judge(request)).await {
        Ok(Ok(verdict)) => {
            let score = clamp_score(verdict.score);
            info!(session_id = %request.session_id, score, "rubric judged");
            RubricScore {
                score,
                level: SkillLevel::from_score(score),
                source: RubricSource::Judge,
                strengths: verdict.strengths,
                improvements: verdict.improvements,
            }
        }
        Ok(Err(e)) => {
            warn!(session_id = %request.session_id, error = %e, "rubric judge failed, using heuristic");
            heuristic_score(&request.stats)
        }
        Err(_) => {
            warn!(session_id = %request.session_id, timeout_ms, "rubric judge timed out, using heuristic");
            heuristic_score(&request.stats)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
