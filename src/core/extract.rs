//! Extraction: pure pattern functions over a single rep utterance
//!
//! Nothing here holds state. The gate engine, planner, scorer and objection
//! tracker decide what the readings mean.

use std::collections::{BTreeSet, HashSet};
use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{BehaviorSignals, ResolutionSignal};

lazy_static! {
    // =========================================================================
    // Identity: name, company
    // =========================================================================
    static ref RE_NAME_EXPLICIT: Regex = Regex::new(
        r"(?i)\bmy name(?:'s| is)\s+([a-z][a-z'-]+)"
    ).unwrap();

    /// Intro phrase (any case) followed by a capitalized word
    static ref RE_NAME_INTRO: Regex = Regex::new(
        r"\b(?i:this is|i'm|i am|it's)\s+([A-Z][a-z'-]+)"
    ).unwrap();

    static ref RE_COMPANY: Regex = Regex::new(
        r"\b(?i:calling from|over at|here at|from|with|at|represent|work for)\s+([A-Z][\w&'-]*(?:\s+[A-Z][\w&'-]*)*)"
    ).unwrap();

    static ref RE_COMPANY_NAMED: Regex = Regex::new(
        r"(?i)\b(?:my|our) (?:company|firm|team) (?:is called|is)\s+(\w[\w&'-]*)"
    ).unwrap();

    // =========================================================================
    // Purpose and relationship framing
    // =========================================================================
    static ref RE_PURPOSE: Regex = Regex::new(
        r"(?i)\b(the reason (?:i'm|i am) calling|(?:i'm|i am) calling (?:about|because|to|regarding)|reason for (?:my|the|this) call|wanted to (?:talk|speak|chat) (?:about|with you about)|reaching out (?:about|because|to)|purpose of (?:my|this) call|calling to see|help (?:you|your team) (?:with|reduce|improve|cut|save))"
    ).unwrap();

    static ref RE_WARM_CLAIM: Regex = Regex::new(
        r"(?i)\b(we (?:spoke|talked|met)|you asked me to (?:call|follow up)|following up on|referred (?:me|by)|(?:mutual|our) (?:friend|colleague)|last time we)"
    ).unwrap();

    // =========================================================================
    // Engagement quality
    // =========================================================================
    static ref RE_MINIMAL: Regex = Regex::new(
        r"(?i)^\s*(ok(?:ay)?|yeah|yes|no|sure|uh[- ]huh|m+|mhm+|right|cool|fine|hmm+|yep|nope|got it)\s*[.!?]*\s*$"
    ).unwrap();

    static ref RE_OPEN_QUESTION: Regex = Regex::new(
        r"(?i)\b(how|what|why|tell me about|walk me through|help me understand|describe|in what way)\b"
    ).unwrap();

    static ref RE_OPEN_PROMPT: Regex = Regex::new(
        r"(?i)^\s*(tell me|walk me through|describe|help me understand)\b"
    ).unwrap();

    static ref RE_CLOSED_QUESTION: Regex = Regex::new(
        r"(?i)^\s*(do|does|did|is|are|was|were|can|could|would|will|have|has|should)\b"
    ).unwrap();

    static ref RE_LEADING_QUESTION: Regex = Regex::new(
        r"(?i)\b(wouldn't you agree|don't you think|isn't it true|right\?|surely you)"
    ).unwrap();

    static ref RE_FOLLOW_UP_CUE: Regex = Regex::new(
        r"(?i)\b(you mentioned|you said|earlier you|going back to|when you say|you brought up)\b"
    ).unwrap();

    static ref RE_VAGUE: Regex = Regex::new(
        r"(?i)\b(stuff|things|kind of|sort of|whatever|solutions?|synergy|leverage|best[- ]in[- ]class|game[- ]changer|cutting[- ]edge|a bunch of)\b"
    ).unwrap();

    // =========================================================================
    // Manner
    // =========================================================================
    static ref RE_FILLER: Regex = Regex::new(
        r"(?i)\b(u+m+|u+h+|e+r+m*|a+h+|like|you know|i mean|basically|actually)\b"
    ).unwrap();

    static ref RE_IMPERATIVE: Regex = Regex::new(
        r"(?im)(?:^|[.!?]\s+)(listen|look|let me|you need to|you should|you have to|tell me|give me|just|check out|imagine|consider|think about)\b"
    ).unwrap();

    // =========================================================================
    // Respect
    // =========================================================================
    static ref RE_DISRESPECT: Regex = Regex::new(
        r"(?i)\b(buddy|pal|obviously|trust me|you need to|you have to|whatever|shut up|calm down|with all due respect|no offense|honestly you)\b"
    ).unwrap();

    static ref RE_COURTESY: Regex = Regex::new(
        r"(?i)\b(thank you|thanks|appreciate|is (?:now|this) a (?:good|bad) time|sorry to (?:bother|interrupt)|do you have a (?:minute|moment)|if that's ok|would you mind)\b"
    ).unwrap();

    // =========================================================================
    // Scoring cues
    // =========================================================================
    static ref RE_EMPATHY: Regex = Regex::new(
        r"(?i)\b(i understand|that makes sense|i hear you|totally get|that sounds (?:frustrating|hard|tough|painful)|i can see why|fair enough)\b"
    ).unwrap();

    static ref RE_PROOF: Regex = Regex::new(
        r"(?i)\b(case study|customers? like|for example|we helped|data shows|references?|percent)\b|\d+\s?%"
    ).unwrap();

    static ref RE_VALUE: Regex = Regex::new(
        r"(?i)\b(save|saves|saving|reduce|reduces|increase|increases|cut|cuts|grow|faster|roi|return on)\b"
    ).unwrap();

    static ref RE_PUSHY: Regex = Regex::new(
        r"(?i)\b(sign (?:today|now|up today)|limited time|decide (?:now|today)|let's get you started|what will it take|are you ready to (?:buy|sign|commit))\b"
    ).unwrap();

    // =========================================================================
    // Objection resolution signals
    // =========================================================================
    static ref RE_RISK_REVERSAL: Regex = Regex::new(
        r"(?i)\b(money[- ]back|guarantee[ds]?|risk[- ]free|free trial|pilot|cancel any ?time|no (?:long[- ]term )?(?:commitment|contract)|opt out)\b"
    ).unwrap();

    static ref RE_PROOF_OF_ROI: Regex = Regex::new(
        r"(?i)\b(roi|return on investment|pays? for itself|payback|cost savings|saved? \$?\d+)\b|\d+\s?%"
    ).unwrap();

    static ref RE_SOCIAL_PROOF: Regex = Regex::new(
        r"(?i)\b(customers? like|companies like|case stud(?:y|ies)|references?|other (?:teams|companies|clients)|(?:clients|customers) (?:in|across) your)\b"
    ).unwrap();

    static ref RE_FLEXIBLE_TERMS: Regex = Regex::new(
        r"(?i)\b(payment plan|month[- ]to[- ]month|quarterly billing|flexible|phased|start small|smaller package|discount|net[- ]?\d+)\b"
    ).unwrap();

    static ref RE_URGENCY_CASE: Regex = Regex::new(
        r"(?i)\b(cost of (?:waiting|delay|inaction)|every (?:month|week) you wait|before (?:q\d|the end of|peak season)|losing \$?\d+)"
    ).unwrap();

    static ref RE_STAKEHOLDER_PLAN: Regex = Regex::new(
        r"(?i)\b(loop in|bring in|include your|present (?:this )?to|who else|decision[- ]makers?|your (?:boss|cfo|vp|team lead)|stakeholders?)\b"
    ).unwrap();

    static ref RE_LOW_EFFORT_SWITCH: Regex = Regex::new(
        r"(?i)\b(we handle|no (?:it|engineering) (?:work|effort)|plugs? (?:in|into)|integrat(?:es|ion) with|migrat(?:e|ion) for you|set it up for you|minutes to set up|white[- ]glove onboarding)\b"
    ).unwrap();
}

/// Words that follow "I'm" / "this is" but are never a name
const NOT_NAMES: &[&str] = &[
    "Just", "Not", "Calling", "Sorry", "Here", "Good", "Great", "Fine", "Sure", "Actually",
    "Really", "Trying", "Going", "With", "From", "The", "Reaching", "Following",
];

/// Calendar and time words that follow "from" / "at" / "with" in ordinary speech
const NOT_COMPANIES: &[&str] = &[
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December", "Noon", "Midnight", "Today", "Tomorrow", "Tonight",
    "Christmas", "Easter", "Thanksgiving", "I",
];

/// Pull a self-introduced name out of the utterance
pub fn extract_name(text: &str) -> Option<String> {
    if let Some(caps) = RE_NAME_EXPLICIT.captures(text) {
        return Some(capitalize(&caps[1]));
    }
    RE_NAME_INTRO
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .find(|name| !NOT_NAMES.contains(&name.as_str()))
}

/// Pull a company / affiliation out of the utterance
pub fn extract_company(text: &str) -> Option<String> {
    if let Some(caps) = RE_COMPANY_NAMED.captures(text) {
        return Some(caps[1].to_string());
    }
    RE_COMPANY
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .find(|company| {
            let head = company.split_whitespace().next().unwrap_or("");
            !NOT_NAMES.contains(&company.as_str()) && !NOT_COMPANIES.contains(&head)
        })
}

/// Rep stated why they are calling
pub fn states_purpose(text: &str) -> bool {
    RE_PURPOSE.is_match(text)
}

/// Rep claims a prior relationship
pub fn claims_warm_relationship(text: &str) -> bool {
    RE_WARM_CLAIM.is_match(text)
}

/// One-word acknowledgements and near-empty turns
pub fn is_minimal_response(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() || RE_MINIMAL.is_match(text) {
        return true;
    }
    word_count(text) <= 2 && !text.contains('?')
}

/// Open question (how / what / why / tell me about ...)
pub fn is_open_question(text: &str) -> bool {
    RE_OPEN_PROMPT.is_match(text) || (text.contains('?') && RE_OPEN_QUESTION.is_match(text))
}

/// Open question with enough substance to show real effort
pub fn is_thoughtful_question(text: &str) -> bool {
    is_open_question(text) && word_count(text) >= 6
}

/// Yes/no question
pub fn is_closed_question(text: &str) -> bool {
    text.contains('?') && RE_CLOSED_QUESTION.is_match(text) && !is_open_question(text)
}

pub fn is_leading_question(text: &str) -> bool {
    RE_LEADING_QUESTION.is_match(text)
}

/// Question that builds on what the prospect just said
///
/// Either an explicit callback ("you mentioned ...") or enough word overlap
/// with the prospect's previous line.
pub fn is_follow_up(text: &str, previous_prospect_line: Option<&str>) -> bool {
    if !text.contains('?') && !RE_OPEN_PROMPT.is_match(text) {
        return false;
    }
    if RE_FOLLOW_UP_CUE.is_match(text) {
        return true;
    }
    match previous_prospect_line {
        Some(prev) => content_overlap(text, prev) >= 0.15,
        None => false,
    }
}

/// Buzzword count
pub fn vagueness_hits(text: &str) -> usize {
    RE_VAGUE.find_iter(text).count()
}

pub fn is_vague(text: &str) -> bool {
    vagueness_hits(text) >= 2
}

/// Respect cues: (disrespect hits, courtesy hits)
pub fn respect_cues(text: &str) -> (usize, usize) {
    (
        RE_DISRESPECT.find_iter(text).count(),
        RE_COURTESY.find_iter(text).count(),
    )
}

pub fn is_pushy(text: &str) -> bool {
    RE_PUSHY.is_match(text)
}

/// Manner readings for the behavior state
pub fn behavior_signals(text: &str) -> BehaviorSignals {
    let text = text.trim();
    let wc = word_count(text);
    if wc == 0 {
        return BehaviorSignals::default();
    }
    let w = wc as f64;
    BehaviorSignals {
        filler_density: RE_FILLER.find_iter(text).count() as f64 / w,
        imperative_density: RE_IMPERATIVE.find_iter(text).count() as f64 / w,
        question_density: text.matches('?').count() as f64 / w,
        exclamation_density: text.matches('!').count() as f64 / w,
        word_count: wc,
    }
}

/// Named scoring events implied by the utterance
pub fn scoring_cues(text: &str, previous_prospect_line: Option<&str>) -> Vec<&'static str> {
    let mut cues = Vec::new();
    if is_open_question(text) {
        cues.push("asked_open_question");
    }
    if is_follow_up(text, previous_prospect_line) {
        cues.push("asked_follow_up");
    }
    if RE_EMPATHY.is_match(text) {
        cues.push("empathy_statement");
    }
    if RE_PROOF.is_match(text) {
        cues.push("provided_proof");
    }
    if RE_VALUE.is_match(text) {
        cues.push("value_statement");
    }
    if is_pushy(text) {
        cues.push("pushy_close");
    }
    if is_vague(text) {
        cues.push("vague_pitch");
    }
    if word_count(text) > 80 {
        cues.push("monologue");
    }
    cues
}

/// Objection resolution signals present in the utterance
pub fn resolution_signals(text: &str) -> BTreeSet<ResolutionSignal> {
    let checks: [(&Regex, ResolutionSignal); 8] = [
        (&RE_RISK_REVERSAL, ResolutionSignal::RiskReversal),
        (&RE_PROOF_OF_ROI, ResolutionSignal::ProofOfRoi),
        (&RE_SOCIAL_PROOF, ResolutionSignal::SocialProof),
        (&RE_FLEXIBLE_TERMS, ResolutionSignal::FlexibleTerms),
        (&RE_URGENCY_CASE, ResolutionSignal::UrgencyCase),
        (&RE_STAKEHOLDER_PLAN, ResolutionSignal::StakeholderPlan),
        (&RE_LOW_EFFORT_SWITCH, ResolutionSignal::LowEffortSwitch),
        (&RE_EMPATHY, ResolutionSignal::Empathy),
    ];
    checks
        .iter()
        .filter(|(re, _)| re.is_match(text))
        .map(|(_, signal)| *signal)
        .collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Jaccard overlap of content words (longer than 3 chars)
fn content_overlap(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let words_a: HashSet<&str> = a
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| w.len() > 3)
        .collect();
    let words_b: HashSet<&str> = b
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| w.len() > 3)
        .collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
