//! Turn-Taking Authority: who holds the floor
//!
//! user → idle needs BOTH enough trailing silence and enough speaking time.
//! A breath mid-sentence (short silence) or a short "uh" (short speech)
//! never hands the floor to the prospect.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::TurnConfig;
use crate::core::queue::CandidateQueue;
use crate::core::speech_gate::{OpenOutcome, SpeechGate};
use crate::types::TurnState;

/// What a speech-activity event did to the floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TurnDecision {
    /// User holds the floor; prospect output is muted
    UserHolding,
    /// User is talking over a line that cannot be interrupted
    ProspectHolding,
    /// Thresholds not met; keep waiting
    FalseAlarm { silence_ms: u64, spoken_ms: u64 },
    /// Floor granted and a candidate is being spoken
    ProspectSpeaking { text: String },
    /// Floor granted but nothing to say yet
    FloorOpenNothingQueued,
    /// Gate already open or busy; nothing changed
    Unchanged,
    /// Prospect finished; microphone re-enabled
    Yielded,
}

#[derive(Debug)]
pub struct TurnAuthority {
    config: TurnConfig,
    gate: SpeechGate,
    turn: TurnState,
    user_started_at: Option<Instant>,
    mic_capture_enabled: bool,
    prospect_output_enabled: bool,
}

impl TurnAuthority {
    pub fn new(config: TurnConfig, gate: SpeechGate) -> Self {
        Self {
            config,
            gate,
            turn: TurnState::Idle,
            user_started_at: None,
            mic_capture_enabled: true,
            prospect_output_enabled: true,
        }
    }

    pub fn on_user_started_speaking(&mut self) -> TurnDecision {
        self.on_user_started_speaking_at(Instant::now())
    }

    /// Barge-in: close the gate, mute the prospect, hand the user the floor
    ///
    /// A non-interruptible line already playing is left to finish; the user
    /// turn is still recorded so the silence thresholds apply afterwards.
    pub fn on_user_started_speaking_at(&mut self, now: Instant) -> TurnDecision {
        let holding = self.gate.is_holding_floor();
        if !holding {
            self.gate.close();
            self.prospect_output_enabled = false;
        }
        if self.turn != TurnState::User {
            self.user_started_at = Some(now);
            debug!(from = %self.turn, holding, "user took the floor");
        }
        self.turn = TurnState::User;
        if holding {
            TurnDecision::ProspectHolding
        } else {
            TurnDecision::UserHolding
        }
    }

    pub fn on_user_stopped_speaking(
        &mut self,
        silence_ms: u64,
        queue: &mut CandidateQueue,
    ) -> TurnDecision {
        self.on_user_stopped_speaking_at(silence_ms, Instant::now(), queue)
    }

    /// Silence report; re-invoked by the caller as silence continues
    pub fn on_user_stopped_speaking_at(
        &mut self,
        silence_ms: u64,
        now: Instant,
        queue: &mut CandidateQueue,
    ) -> TurnDecision {
        if self.turn != TurnState::User {
            return TurnDecision::Unchanged;
        }
        // Speaking time is measured up to when the silence began
        let spoken_ms = self
            .user_started_at
            .map(|t| now.saturating_duration_since(t).as_millis() as u64)
            .unwrap_or(0)
            .saturating_sub(silence_ms);

        if silence_ms < self.config.silence_threshold_ms
            || spoken_ms < self.config.user_done_threshold_ms
        {
            debug!(silence_ms, spoken_ms, "user pause, not done");
            return TurnDecision::FalseAlarm {
                silence_ms,
                spoken_ms,
            };
        }

        info!(silence_ms, spoken_ms, "user yielded the floor");
        self.turn = TurnState::Idle;
        self.user_started_at = None;
        self.prospect_output_enabled = true;
        self.grant_floor(queue)
    }

    /// A candidate arrived; offer the floor if it is free
    pub fn on_candidate_ready(&mut self, queue: &mut CandidateQueue) -> TurnDecision {
        if self.turn != TurnState::Idle || self.gate.is_open() {
            return TurnDecision::Unchanged;
        }
        self.grant_floor(queue)
    }

    /// Prospect audio began; capture pauses to keep its voice out of the transcript
    ///
    /// Returns false when the user already holds the floor.
    pub fn on_prospect_started_speaking(&mut self) -> bool {
        if self.turn == TurnState::User {
            debug!("prospect audio while the user holds the floor");
            return false;
        }
        self.turn = TurnState::Prospect;
        self.mic_capture_enabled = false;
        true
    }

    /// Prospect done: back to idle, microphone on
    pub fn on_prospect_stopped_speaking(&mut self) -> TurnDecision {
        if self.turn == TurnState::Prospect {
            self.turn = TurnState::Idle;
        }
        self.mic_capture_enabled = true;
        TurnDecision::Yielded
    }

    fn grant_floor(&mut self, queue: &mut CandidateQueue) -> TurnDecision {
        match self.gate.open(queue) {
            OpenOutcome::Speaking { text, .. } => TurnDecision::ProspectSpeaking { text },
            OpenOutcome::Empty => TurnDecision::FloorOpenNothingQueued,
            OpenOutcome::AlreadyOpen | OpenOutcome::Busy => TurnDecision::Unchanged,
        }
    }

    pub fn turn(&self) -> TurnState {
        self.turn
    }

    pub fn gate(&self) -> &SpeechGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut SpeechGate {
        &mut self.gate
    }

    pub fn mic_capture_enabled(&self) -> bool {
        self.mic_capture_enabled
    }

    pub fn prospect_output_enabled(&self) -> bool {
        self.prospect_output_enabled
    }
}

// =============================================================================
// TESTS
// =============================================================================
