//! Core modules for prospect-sim

pub mod extract;
pub mod queue;
pub mod speech_gate;
pub mod turn_authority;
pub mod behavior_gate;
pub mod objection;
pub mod services;
pub mod coach;
pub mod planner;
pub mod scoring;
pub mod rubric;
pub mod offline;
pub mod session;
pub mod api;

pub use queue::CandidateQueue;
pub use speech_gate::{GateEvent, OpenOutcome, SpeechGate};
pub use turn_authority::{TurnAuthority, TurnDecision};
pub use behavior_gate::{derive_stage, update_facts, variance_seed_for, BehaviorGateEngine};
pub use objection::{ObjectionProgress, ObjectionTracker};
pub use services::{CoachService, GenerationService, RubricJudge, SpeechSink};
pub use coach::{DualPathCoachClient, FastPath, PlanResult};
pub use planner::{generate_prospect_response, ResponsePlanner};
pub use scoring::{InMemoryScoreStore, ScoreRecord, ScoreStore, ScoreUpdate, ScoringEngine};
pub use offline::{ConsoleSpeechSink, LocalCoach, ScriptedProspect, SimulatedSpeechSink};
pub use session::{
    spawn_session, SessionHandle, SessionReport, SessionServices, SessionStatus, SessionUpdate,
};
pub use api::{create_router, run_server};
