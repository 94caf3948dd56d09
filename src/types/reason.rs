//! Reason codes for behavior-gate decisions
//! G-code taxonomy, one family per rule of the gate ladder

use serde::{Deserialize, Serialize};

/// Why the gate engine chose the current stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ReasonCode {
    // =========================================================================
    // G001: Terminal
    // =========================================================================
    /// Irritation crossed the hang-up threshold
    G001_IRRITATION_TERMINAL,
    /// Already done; nothing reopens the call
    G001_TERMINAL_LATCHED,

    // =========================================================================
    // G002 - G004: Required information
    // =========================================================================
    /// Rep has not given a name
    G002_NAME_REQUIRED,
    /// Rep has not said which company they are with
    G003_COMPANY_REQUIRED,
    /// Rep has not said why they are calling
    G004_PURPOSE_REQUIRED,

    // =========================================================================
    // G005: Impatience
    // =========================================================================
    /// Respect below the impatience line
    G005_RESPECT_LOW,
    /// Irritation above the impatience line
    G005_IRRITATION_HIGH,

    // =========================================================================
    // G006: Directness
    // =========================================================================
    /// Too many exchanges before the point
    G006_PURPOSELESS_EXCHANGES,
    /// Respect guarded but not yet impatient
    G006_RESPECT_GUARDED,

    // =========================================================================
    // G007: Normal
    // =========================================================================
    /// Before the first exchange
    G007_OPENING,
    /// All gates satisfied
    G007_ENGAGED,
}

impl ReasonCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::G001_IRRITATION_TERMINAL => "G001_IRRITATION_TERMINAL",
            Self::G001_TERMINAL_LATCHED => "G001_TERMINAL_LATCHED",
            Self::G002_NAME_REQUIRED => "G002_NAME_REQUIRED",
            Self::G003_COMPANY_REQUIRED => "G003_COMPANY_REQUIRED",
            Self::G004_PURPOSE_REQUIRED => "G004_PURPOSE_REQUIRED",
            Self::G005_RESPECT_LOW => "G005_RESPECT_LOW",
            Self::G005_IRRITATION_HIGH => "G005_IRRITATION_HIGH",
            Self::G006_PURPOSELESS_EXCHANGES => "G006_PURPOSELESS_EXCHANGES",
            Self::G006_RESPECT_GUARDED => "G006_RESPECT_GUARDED",
            Self::G007_OPENING => "G007_OPENING",
            Self::G007_ENGAGED => "G007_ENGAGED",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::G001_IRRITATION_TERMINAL => "Irritation at hang-up level",
            Self::G001_TERMINAL_LATCHED => "Call already ended",
            Self::G002_NAME_REQUIRED => "Caller has not introduced themselves",
            Self::G003_COMPANY_REQUIRED => "Caller affiliation unknown",
            Self::G004_PURPOSE_REQUIRED => "Reason for the call not stated",
            Self::G005_RESPECT_LOW => "Feels disrespected",
            Self::G005_IRRITATION_HIGH => "Running out of patience",
            Self::G006_PURPOSELESS_EXCHANGES => "Too long without getting to the point",
            Self::G006_RESPECT_GUARDED => "Guarded, keeping it short",
            Self::G007_OPENING => "Call just connected",
            Self::G007_ENGAGED => "Willing to talk",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
