//! Objections and their hidden roots

use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};

/// Named evidence that can soften a root, detected in the rep's words
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSignal {
    RiskReversal,
    ProofOfRoi,
    SocialProof,
    FlexibleTerms,
    UrgencyCase,
    StakeholderPlan,
    LowEffortSwitch,
    Empathy,
}

impl ResolutionSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSignal::RiskReversal => "risk_reversal",
            ResolutionSignal::ProofOfRoi => "proof_of_roi",
            ResolutionSignal::SocialProof => "social_proof",
            ResolutionSignal::FlexibleTerms => "flexible_terms",
            ResolutionSignal::UrgencyCase => "urgency_case",
            ResolutionSignal::StakeholderPlan => "stakeholder_plan",
            ResolutionSignal::LowEffortSwitch => "low_effort_switch",
            ResolutionSignal::Empathy => "empathy",
        }
    }
}

/// Hidden cause behind a surfaced objection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenRoot {
    pub id: String,
    /// 0.0 - 1.0
    pub intensity: f64,
    /// Prospect is aware of it (softens more easily)
    pub conscious: bool,
    /// Signals that address this root
    pub signals: Vec<ResolutionSignal>,
}

impl HiddenRoot {
    pub fn new(
        id: impl Into<String>,
        intensity: f64,
        conscious: bool,
        signals: &[ResolutionSignal],
    ) -> Self {
        Self {
            id: id.into(),
            intensity: intensity.clamp(0.0, 1.0),
            conscious,
            signals: signals.to_vec(),
        }
    }
}

/// Catalog entry for a named objection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectionTemplate {
    pub name: String,
    pub surface_text: String,
    pub roots: Vec<HiddenRoot>,
}

/// Which rule resolved an objection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    AllRootsSoftened,
    SatisfactionGradient,
    SignalsWithSatisfaction,
    SignalsWithSoftenedRoot,
}

/// Outcome of assessing an objection against the evidence so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub softened_root_ids: BTreeSet<String>,
    pub still_blocking_root_ids: BTreeSet<String>,
    pub resolved: bool,
    pub path: Option<ResolutionPath>,
}

/// An objection the prospect has raised and not yet dropped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectionInstance {
    pub name: String,
    pub surface_text: String,
    pub roots: Vec<HiddenRoot>,
    pub softened_root_ids: BTreeSet<String>,
    pub still_blocking_root_ids: BTreeSet<String>,
    /// Signals seen across every rep response while this objection was open
    pub detected_signals: BTreeSet<ResolutionSignal>,
    /// Latest externally supplied satisfaction gradient (0.0 - 1.0)
    pub satisfaction: f64,
    pub resolved: bool,
}

impl ObjectionInstance {
    /// Open a new instance: every root starts blocking
    pub fn open(template: &ObjectionTemplate) -> Self {
        Self {
            name: template.name.clone(),
            surface_text: template.surface_text.clone(),
            roots: template.roots.clone(),
            softened_root_ids: BTreeSet::new(),
            still_blocking_root_ids: template.roots.iter().map(|r| r.id.clone()).collect(),
            detected_signals: BTreeSet::new(),
            satisfaction: 0.0,
            resolved: false,
        }
    }
}
