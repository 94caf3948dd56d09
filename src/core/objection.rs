//! Objection Resolution Model: hidden roots behind a surfaced objection
//!
//! A root softens when the rep's accumulated signals address it:
//! - conscious root: any one matching signal
//! - unconscious root, intensity ≥ 0.7: two distinct matching signals
//! - other unconscious root: one matching signal
//!
//! The objection is resolved when any resolution path holds (see `assess`).

use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::core::extract;
use crate::types::{
    Assessment, HiddenRoot, ObjectionInstance, ObjectionTemplate, ResolutionPath, ResolutionSignal,
};

/// Intensity at which an unconscious root needs corroborating signals
const DEEP_ROOT_INTENSITY: f64 = 0.7;

/// Satisfaction that resolves an objection on its own
const SATISFIED: f64 = 0.9;

/// Satisfaction needed alongside two proxy signals
const SATISFIED_WITH_SIGNALS: f64 = 0.6;

/// Does the accumulated evidence soften this root?
pub fn root_softened(root: &HiddenRoot, detected: &BTreeSet<ResolutionSignal>) -> bool {
    let matches = root.signals.iter().filter(|s| detected.contains(s)).collect::<BTreeSet<_>>().len();
    if root.conscious {
        matches >= 1
    } else if root.intensity >= DEEP_ROOT_INTENSITY {
        matches >= 2
    } else {
        matches >= 1
    }
}

/// Assess roots against the detected signals and satisfaction gradient
pub fn assess(
    roots: &[HiddenRoot],
    detected: &BTreeSet<ResolutionSignal>,
    satisfaction: f64,
) -> Assessment {
    let mut softened_root_ids = BTreeSet::new();
    let mut still_blocking_root_ids = BTreeSet::new();
    for root in roots {
        if root_softened(root, detected) {
            softened_root_ids.insert(root.id.clone());
        } else {
            still_blocking_root_ids.insert(root.id.clone());
        }
    }

    let proxy_signals = detected.len();
    let path = if !roots.is_empty() && still_blocking_root_ids.is_empty() {
        Some(ResolutionPath::AllRootsSoftened)
    } else if satisfaction >= SATISFIED {
        Some(ResolutionPath::SatisfactionGradient)
    } else if proxy_signals >= 2 && satisfaction >= SATISFIED_WITH_SIGNALS {
        Some(ResolutionPath::SignalsWithSatisfaction)
    } else if proxy_signals >= 3 && !softened_root_ids.is_empty() {
        Some(ResolutionPath::SignalsWithSoftenedRoot)
    } else {
        None
    };

    Assessment {
        softened_root_ids,
        still_blocking_root_ids,
        resolved: path.is_some(),
        path,
    }
}

/// Built-in objections
pub fn catalog() -> Vec<ObjectionTemplate> {
    use ResolutionSignal::*;
    vec![
        ObjectionTemplate {
            name: "budget".to_string(),
            surface_text: "We just don't have the budget for this right now.".to_string(),
            roots: vec![
                HiddenRoot::new("cash_flow", 0.6, true, &[FlexibleTerms, ProofOfRoi]),
                HiddenRoot::new("fear_of_waste", 0.8, false, &[RiskReversal, ProofOfRoi, SocialProof]),
                HiddenRoot::new("low_priority", 0.5, false, &[UrgencyCase, ProofOfRoi]),
            ],
        },
        ObjectionTemplate {
            name: "timing".to_string(),
            surface_text: "Now's really not a good time. Maybe next quarter.".to_string(),
            roots: vec![
                HiddenRoot::new("bandwidth", 0.7, true, &[LowEffortSwitch, FlexibleTerms]),
                HiddenRoot::new("change_fatigue", 0.75, false, &[LowEffortSwitch, Empathy, RiskReversal]),
            ],
        },
        ObjectionTemplate {
            name: "authority".to_string(),
            surface_text: "I'd have to run this by my boss first.".to_string(),
            roots: vec![
                HiddenRoot::new("approval_process", 0.5, true, &[StakeholderPlan]),
                HiddenRoot::new("political_risk", 0.7, false, &[StakeholderPlan, SocialProof, RiskReversal]),
            ],
        },
        ObjectionTemplate {
            name: "status_quo".to_string(),
            surface_text: "Honestly, we're happy with what we have.".to_string(),
            roots: vec![
                HiddenRoot::new("switching_cost", 0.6, true, &[LowEffortSwitch, FlexibleTerms]),
                HiddenRoot::new("vendor_loyalty", 0.5, false, &[Empathy, SocialProof]),
                HiddenRoot::new("unseen_pain", 0.8, false, &[UrgencyCase, ProofOfRoi]),
            ],
        },
    ]
}

/// Look up a catalog objection by name
pub fn template(name: &str) -> Option<ObjectionTemplate> {
    catalog().into_iter().find(|t| t.name == name)
}

/// What one rep turn did to the open objections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectionProgress {
    /// Objections resolved by this turn
    pub newly_resolved: Vec<String>,
    /// The turn carried at least one resolution signal
    pub addressed: bool,
    /// Objections were open when the turn arrived
    pub had_open: bool,
}

/// Open objections for one session
#[derive(Debug, Default)]
pub struct ObjectionTracker {
    instances: Vec<ObjectionInstance>,
}

impl ObjectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a catalog objection; re-raising an open one returns it unchanged
    pub fn raise(&mut self, name: &str) -> Option<&ObjectionInstance> {
        match template(name) {
            Some(t) => Some(self.raise_template(&t)),
            None => {
                warn!(objection = name, "unknown objection, ignoring");
                None
            }
        }
    }

    pub fn raise_template(&mut self, template: &ObjectionTemplate) -> &ObjectionInstance {
        let existing = self
            .instances
            .iter()
            .position(|o| o.name == template.name && !o.resolved);
        let idx = match existing {
            Some(idx) => idx,
            None => {
                info!(objection = %template.name, roots = template.roots.len(), "objection raised");
                self.instances.push(ObjectionInstance::open(template));
                self.instances.len() - 1
            }
        };
        &self.instances[idx]
    }

    /// Fold a rep response (and optional satisfaction) into every open objection
    pub fn evaluate(&mut self, text: &str, satisfaction: Option<f64>) -> ObjectionProgress {
        let signals = extract::resolution_signals(text);
        let mut progress = ObjectionProgress {
            addressed: !signals.is_empty(),
            ..Default::default()
        };

        for instance in self.instances.iter_mut().filter(|o| !o.resolved) {
            progress.had_open = true;
            instance.detected_signals.extend(signals.iter().copied());
            if let Some(s) = satisfaction {
                instance.satisfaction = s.clamp(0.0, 1.0);
            }

            let assessment = assess(&instance.roots, &instance.detected_signals, instance.satisfaction);
            debug!(
                objection = %instance.name,
                softened = assessment.softened_root_ids.len(),
                blocking = assessment.still_blocking_root_ids.len(),
                "objection assessed"
            );
            instance.softened_root_ids = assessment.softened_root_ids;
            instance.still_blocking_root_ids = assessment.still_blocking_root_ids;
            if assessment.resolved {
                instance.resolved = true;
                info!(objection = %instance.name, path = ?assessment.path, "objection resolved");
                progress.newly_resolved.push(instance.name.clone());
            }
        }
        progress
    }

    pub fn instances(&self) -> &[ObjectionInstance] {
        &self.instances
    }

    pub fn open_objections(&self) -> impl Iterator<Item = &ObjectionInstance> {
        self.instances.iter().filter(|o| !o.resolved)
    }

    pub fn has_open(&self) -> bool {
        self.instances.iter().any(|o| !o.resolved)
    }

    pub fn raised_count(&self) -> u32 {
        self.instances.len() as u32
    }

    pub fn resolved_count(&self) -> u32 {
        self.instances.iter().filter(|o| o.resolved).count() as u32
    }
}

// =============================================================================
// TESTS
// =============================================================================
