//! Call session actor
//!
//! One tokio task per call owns every piece of mutable per-call state (turn
//! authority, queue, facts, scores, objections) and is the only thing that
//! mutates it. Speech activity and transcripts arrive as commands; slow work
//! (classify + generation, strategic plans, speech playback, the rubric
//! judge) runs in spawned tasks and reports back through channels, so a slow
//! collaborator never stalls speech-activity handling.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::SessionConfig;
use crate::core::behavior_gate::{variance_seed_for, BehaviorGateEngine};
use crate::core::coach::{DualPathCoachClient, PlanResult};
use crate::core::extract;
use crate::core::objection::ObjectionTracker;
use crate::core::offline::{LocalCoach, ScriptedProspect, SimulatedSpeechSink};
use crate::core::planner::{generate_prospect_response, ResponsePlanner};
use crate::core::queue::CandidateQueue;
use crate::core::rubric;
use crate::core::scoring::{InMemoryScoreStore, ScoreRecord, ScoreStore, ScoreUpdate, ScoringEngine};
use crate::core::services::{
    ClassifyRequest, CoachService, GenerationResponse, GenerationService, HttpCoachService,
    HttpGenerationService, HttpRubricJudge, JudgeRequest, PlanRequest, RubricJudge, SpeechSink,
};
use crate::core::speech_gate::{GateEvent, SpeechGate};
use crate::core::turn_authority::{TurnAuthority, TurnDecision};
use crate::error::{ServiceError, SessionError};
use crate::types::{
    BehaviorStage, BehaviorTier, CoachReflexes, ObjectionInstance, RelationshipContext,
    RubricInput, RubricScore, SessionScores, Speaker, StageOutput, Tone, TranscriptEvent,
    TurnState,
};

const COMMAND_BUFFER: usize = 64;
const UPDATE_BUFFER: usize = 256;

// =============================================================================
// SERVICES
// =============================================================================

/// External collaborators for one session
#[derive(Clone)]
pub struct SessionServices {
    pub generator: Arc<dyn GenerationService>,
    pub coach: Arc<dyn CoachService>,
    pub judge: Option<Arc<dyn RubricJudge>>,
    pub speech: Arc<dyn SpeechSink>,
    pub scores: Arc<dyn ScoreStore>,
}

impl SessionServices {
    /// Scripted prospect, local coach, simulated playback, no judge
    pub fn offline() -> Self {
        Self {
            generator: Arc::new(ScriptedProspect::new()),
            coach: Arc::new(LocalCoach),
            judge: None,
            speech: Arc::new(SimulatedSpeechSink),
            scores: Arc::new(InMemoryScoreStore::new()),
        }
    }

    /// HTTP collaborators where an endpoint is configured, offline otherwise
    pub fn from_config(config: &SessionConfig) -> Result<Self, ServiceError> {
        let endpoints = &config.services;
        let mut services = Self::offline();
        if endpoints.generation_url.is_some() {
            services.generator = Arc::new(HttpGenerationService::from_endpoints(endpoints)?);
        }
        if endpoints.coach_url.is_some() {
            services.coach = Arc::new(HttpCoachService::from_endpoints(endpoints)?);
        }
        if endpoints.judge_url.is_some() {
            services.judge = Some(Arc::new(HttpRubricJudge::from_endpoints(endpoints)?));
        }
        Ok(services)
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSink>) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn GenerationService>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_coach(mut self, coach: Arc<dyn CoachService>) -> Self {
        self.coach = coach;
        self
    }

    pub fn with_judge(mut self, judge: Arc<dyn RubricJudge>) -> Self {
        self.judge = Some(judge);
        self
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Live update broadcast to observers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    Turn { turn: TurnState, decision: TurnDecision },
    Stage { output: StageOutput },
    CandidateQueued { text: String, priority: f64, context_version: u64 },
    ProspectSpeaking { text: String, tone: Tone },
    ProspectFinished { text: String, completed: bool },
    Scores { update: ScoreUpdate },
    ObjectionRaised { name: String, surface_text: String },
    ObjectionResolved { name: String },
    CallEnded { stage: BehaviorStage, reason: String },
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub turn: TurnState,
    pub gate_open: bool,
    pub mic_capture_enabled: bool,
    pub prospect_output_enabled: bool,
    pub stage: StageOutput,
    pub scores: SessionScores,
    pub tier: BehaviorTier,
    pub queue_size: usize,
    pub context_version: u64,
    pub open_objections: Vec<String>,
    pub plan_in_flight: bool,
    pub stale_plans_discarded: u64,
    pub cancelled_plans: u64,
    /// Most recent fast-path reading
    pub last_reflexes: Option<CoachReflexes>,
    pub transcript_lines: usize,
    pub call_ended: bool,
}

/// Everything known about a finished call
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub final_stage: StageOutput,
    pub scores: SessionScores,
    pub tier: BehaviorTier,
    pub rubric: RubricScore,
    pub stats: RubricInput,
    pub objections: Vec<ObjectionInstance>,
    pub score_record: Option<ScoreRecord>,
    pub transcript: String,
}

enum SessionCommand {
    UserStartedSpeaking {
        reply: oneshot::Sender<TurnDecision>,
    },
    UserStoppedSpeaking {
        silence_ms: u64,
        reply: oneshot::Sender<TurnDecision>,
    },
    Transcript {
        event: TranscriptEvent,
        reply: oneshot::Sender<Option<StageOutput>>,
    },
    RaiseObjection {
        name: String,
        reply: oneshot::Sender<Option<ObjectionInstance>>,
    },
    ScoreEvent {
        name: String,
        reply: oneshot::Sender<Option<ScoreUpdate>>,
    },
    SetRelationship {
        context: RelationshipContext,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    End {
        reply: oneshot::Sender<SessionReport>,
    },
}

/// Classify + generation result, tagged with the context it was prepared for
struct Prepared {
    version: u64,
    stage: BehaviorStage,
    reflexes: Option<CoachReflexes>,
    response: GenerationResponse,
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable address of a running session
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    commands: mpsc::Sender<SessionCommand>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn user_started_speaking(&self) -> Result<TurnDecision, SessionError> {
        self.request(|reply| SessionCommand::UserStartedSpeaking { reply }).await
    }

    pub async fn user_stopped_speaking(&self, silence_ms: u64) -> Result<TurnDecision, SessionError> {
        self.request(|reply| SessionCommand::UserStoppedSpeaking { silence_ms, reply })
            .await
    }

    /// Feed a transcript; returns the gate output for final user lines
    pub async fn transcript(&self, event: TranscriptEvent) -> Result<Option<StageOutput>, SessionError> {
        self.request(|reply| SessionCommand::Transcript { event, reply }).await
    }

    pub async fn raise_objection(&self, name: &str) -> Result<Option<ObjectionInstance>, SessionError> {
        let name = name.to_string();
        self.request(|reply| SessionCommand::RaiseObjection { name, reply }).await
    }

    pub async fn score_event(&self, name: &str) -> Result<Option<ScoreUpdate>, SessionError> {
        let name = name.to_string();
        self.request(|reply| SessionCommand::ScoreEvent { name, reply }).await
    }

    pub async fn set_relationship(&self, context: RelationshipContext) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::SetRelationship { context })
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    /// End the call: stops the actor and returns the report
    pub async fn end(&self) -> Result<SessionReport, SessionError> {
        self.request(|reply| SessionCommand::End { reply }).await
    }

    /// Resolves once the actor has stopped (ended or idle)
    pub async fn closed(&self) {
        self.commands.closed().await
    }
}

// =============================================================================
// ACTOR
// =============================================================================

struct Inbox {
    commands: mpsc::Receiver<SessionCommand>,
    gate_events: mpsc::UnboundedReceiver<GateEvent>,
    plan_results: mpsc::UnboundedReceiver<PlanResult>,
    prepared: mpsc::UnboundedReceiver<Prepared>,
}

/// Start a session actor
pub fn spawn_session(
    id: impl Into<String>,
    config: SessionConfig,
    services: SessionServices,
) -> SessionHandle {
    let id = id.into();
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (update_tx, _) = broadcast::channel(UPDATE_BUFFER);
    let (gate_tx, gate_rx) = mpsc::unbounded_channel();
    let (plan_tx, plan_rx) = mpsc::unbounded_channel();
    let (prepared_tx, prepared_rx) = mpsc::unbounded_channel();

    let seed = config.variance_seed.unwrap_or_else(|| variance_seed_for(&id));
    let gate = SpeechGate::new(Arc::clone(&services.speech), gate_tx);

    let actor = SessionActor {
        id: id.clone(),
        authority: TurnAuthority::new(config.turn.clone(), gate),
        queue: CandidateQueue::new(config.queue.max_size),
        behavior_gate: BehaviorGateEngine::new(config.gate.clone(), seed),
        planner: ResponsePlanner::new(id.clone(), config.planner.clone(), Arc::clone(&services.generator)),
        coach: DualPathCoachClient::new(Arc::clone(&services.coach), config.coach.clone(), plan_tx),
        scoring: ScoringEngine::new(id.clone(), config.scoring.clone(), Arc::clone(&services.scores)),
        objections: ObjectionTracker::new(),
        judge: services.judge.clone(),
        judge_timeout_ms: config.scoring.judge_timeout_ms,
        idle_timeout_ms: config.idle_timeout_ms,
        updates: update_tx.clone(),
        prepared_tx,
        open_questions: 0,
        follow_ups: 0,
        farewells_in_flight: 0,
        call_ended: false,
    };
    let inbox = Inbox {
        commands: command_rx,
        gate_events: gate_rx,
        plan_results: plan_rx,
        prepared: prepared_rx,
    };

    info!(session_id = %id, seed, "session started");
    let span = info_span!("session", session_id = %id);
    tokio::spawn(actor.run(inbox).instrument(span));

    SessionHandle {
        id,
        commands: command_tx,
        updates: update_tx,
    }
}

struct SessionActor {
    id: String,
    authority: TurnAuthority,
    queue: CandidateQueue,
    behavior_gate: BehaviorGateEngine,
    planner: ResponsePlanner,
    coach: DualPathCoachClient,
    scoring: ScoringEngine,
    objections: ObjectionTracker,
    judge: Option<Arc<dyn RubricJudge>>,
    judge_timeout_ms: u64,
    idle_timeout_ms: u64,
    updates: broadcast::Sender<SessionUpdate>,
    prepared_tx: mpsc::UnboundedSender<Prepared>,
    open_questions: u32,
    follow_ups: u32,
    /// Generations spawned after the call turned terminal, not yet prepared
    farewells_in_flight: u32,
    call_ended: bool,
}

impl SessionActor {
    async fn run(mut self, mut inbox: Inbox) {
        let idle = Duration::from_millis(self.idle_timeout_ms);
        let mut deadline = Instant::now() + idle;
        loop {
            tokio::select! {
                command = inbox.commands.recv() => match command {
                    Some(command) => {
                        deadline = Instant::now() + idle;
                        if !self.on_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    info!(idle_ms = self.idle_timeout_ms, "no commands, stopping idle session");
                    break;
                }
                Some(event) = inbox.gate_events.recv() => self.on_gate_event(event),
                Some(result) = inbox.plan_results.recv() => {
                    self.coach.on_plan_result(result);
                }
                Some(prepared) = inbox.prepared.recv() => self.on_prepared(prepared),
            }
        }
        self.authority.gate_mut().close();
        self.coach.cancel_plan();
        debug!("session actor stopped");
    }

    fn publish(&self, update: SessionUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }

    /// Returns false once the call has been ended
    fn on_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::UserStartedSpeaking { reply } => {
                let _ = reply.send(self.on_user_started());
            }
            SessionCommand::UserStoppedSpeaking { silence_ms, reply } => {
                let decision = self.authority.on_user_stopped_speaking(silence_ms, &mut self.queue);
                if !matches!(decision, TurnDecision::FalseAlarm { .. }) {
                    self.publish_turn(&decision);
                }
                let _ = reply.send(decision);
            }
            SessionCommand::Transcript { event, reply } => {
                let _ = reply.send(self.on_transcript(event));
            }
            SessionCommand::RaiseObjection { name, reply } => {
                let _ = reply.send(self.raise_objection(&name));
            }
            SessionCommand::ScoreEvent { name, reply } => {
                let update = self.scoring.apply_named(&name);
                if let Some(update) = &update {
                    self.on_score_update(update.clone());
                }
                let _ = reply.send(update);
            }
            SessionCommand::SetRelationship { context } => {
                self.behavior_gate.set_relationship(context);
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            SessionCommand::End { reply } => {
                self.end(reply);
                return false;
            }
        }
        true
    }

    fn publish_turn(&self, decision: &TurnDecision) {
        self.publish(SessionUpdate::Turn {
            turn: self.authority.turn(),
            decision: decision.clone(),
        });
    }

    /// Barge-in: new context generation and a fresh strategic plan
    fn on_user_started(&mut self) -> TurnDecision {
        let new_interval = self.authority.turn() != TurnState::User;
        let decision = self.authority.on_user_started_speaking();
        if new_interval {
            let version = self.queue.on_new_user_speech();
            debug!(version, "user speaking interval");
            self.coach.start_plan(PlanRequest {
                session_id: self.id.clone(),
                transcript: self.planner.history().render(),
                stage: self.behavior_gate.stage(),
            });
            self.publish_turn(&decision);
        }
        decision
    }

    fn on_transcript(&mut self, event: TranscriptEvent) -> Option<StageOutput> {
        let previous_prospect_line = self
            .planner
            .history()
            .last_from(Speaker::Prospect)
            .map(|l| l.text.clone());
        if !self.planner.on_transcript(&event) {
            return None;
        }
        if event.speaker != Speaker::User || self.call_ended {
            return None;
        }
        let text = event.text.trim().to_string();

        let was_terminal = self.behavior_gate.is_terminal();
        let output = self.behavior_gate.observe_user_turn(&text);
        self.publish(SessionUpdate::Stage {
            output: output.clone(),
        });

        let progress = self.objections.evaluate(&text, None);
        for name in &progress.newly_resolved {
            self.publish(SessionUpdate::ObjectionResolved { name: name.clone() });
            self.apply_score("objection_resolved");
        }
        if progress.had_open && !progress.addressed {
            self.apply_score("ignored_objection");
        }

        for cue in extract::scoring_cues(&text, previous_prospect_line.as_deref()) {
            match cue {
                "asked_open_question" => self.open_questions += 1,
                "asked_follow_up" => self.follow_ups += 1,
                _ => {}
            }
            self.apply_score(cue);
        }
        let name = self.planner.persona_name().to_lowercase();
        if !name.is_empty() && text.to_lowercase().contains(&name) {
            self.apply_score("used_prospect_name");
        }

        if was_terminal && self.farewell_underway() {
            debug!("farewell already underway, no new generation");
            return Some(output);
        }
        self.spawn_generation(&text, previous_prospect_line, output.stage);
        Some(output)
    }

    fn farewell_underway(&self) -> bool {
        self.farewells_in_flight > 0 || !self.queue.is_empty() || self.authority.gate().is_playing()
    }

    fn apply_score(&mut self, name: &str) {
        if let Some(update) = self.scoring.apply_named(name) {
            self.on_score_update(update);
        }
    }

    fn on_score_update(&mut self, update: ScoreUpdate) {
        if let Some(instructions) = &update.instructions {
            self.planner.set_tier_instructions(instructions.clone());
        }
        self.publish(SessionUpdate::Scores { update });
    }

    /// Classify then generate, off the session loop
    fn spawn_generation(&mut self, text: &str, previous_prospect_line: Option<String>, stage: BehaviorStage) {
        let version = self.queue.context_version();
        let fast_path = self.coach.fast_path();
        let generator = self.planner.generator();
        let classify = ClassifyRequest {
            session_id: self.id.clone(),
            utterance: text.to_string(),
            previous_prospect_line,
        };
        let mut request = self.planner.build_request(stage, None, self.coach.latest_plan());
        let prepared_tx = self.prepared_tx.clone();
        if stage.is_terminal() {
            self.farewells_in_flight += 1;
        }

        tokio::spawn(
            async move {
                let reflexes = fast_path.classify(&classify).await;
                request.reflexes = reflexes.clone();
                let response = generate_prospect_response(generator.as_ref(), &request).await;
                let _ = prepared_tx.send(Prepared {
                    version,
                    stage,
                    reflexes,
                    response,
                });
            }
            .in_current_span(),
        );
    }

    fn on_prepared(&mut self, prepared: Prepared) {
        let Prepared {
            version,
            stage,
            reflexes,
            response,
        } = prepared;
        if stage.is_terminal() {
            self.farewells_in_flight = self.farewells_in_flight.saturating_sub(1);
        }
        self.coach.record_reflexes(reflexes.clone());
        self.coach.record_reflexes(response.coach_metadata.clone());
        let reflexes = response.coach_metadata.clone().or(reflexes);

        if let Some(delta) = response.irritation_delta {
            let output = self.behavior_gate.apply_irritation_delta(delta);
            if output.transitioned {
                self.publish(SessionUpdate::Stage { output });
            }
        }
        // Satisfaction answers the objections already open, not one raised in this line
        if let Some(satisfaction) = response.satisfaction {
            let progress = self.objections.evaluate("", Some(satisfaction));
            for name in progress.newly_resolved {
                self.publish(SessionUpdate::ObjectionResolved { name });
                self.apply_score("objection_resolved");
            }
        }
        if let Some(name) = &response.raised_objection {
            self.raise_objection(name);
        }

        // A delta that ended the call turns this line into the farewell
        let stage = if self.behavior_gate.is_terminal() {
            BehaviorStage::Done
        } else {
            stage
        };
        let Some(candidate) = self.planner.build_candidate(&response.text, reflexes.as_ref(), stage) else {
            debug!(version, "blank generation dropped");
            return;
        };
        let text = candidate.text.clone();
        let priority = candidate.priority;
        if !self.queue.push_for_version_at(candidate, version, Instant::now()) {
            return;
        }
        self.publish(SessionUpdate::CandidateQueued {
            text,
            priority,
            context_version: version,
        });

        let decision = self.authority.on_candidate_ready(&mut self.queue);
        if matches!(decision, TurnDecision::ProspectSpeaking { .. }) {
            self.publish_turn(&decision);
        }
    }

    fn raise_objection(&mut self, name: &str) -> Option<ObjectionInstance> {
        let already_open = self.objections.open_objections().any(|o| o.name == name);
        let instance = self.objections.raise(name)?.clone();
        if !already_open {
            self.publish(SessionUpdate::ObjectionRaised {
                name: instance.name.clone(),
                surface_text: instance.surface_text.clone(),
            });
        }
        Some(instance)
    }

    /// Events of a superseded grant never touch the floor
    fn on_gate_event(&mut self, event: GateEvent) {
        let current = self.authority.gate_mut().on_event(&event);
        match event {
            GateEvent::Started { seq, text, options } => {
                if !current {
                    debug!(seq, "playback start raced a barge-in, ignoring");
                    return;
                }
                self.authority.on_prospect_started_speaking();
                self.publish(SessionUpdate::ProspectSpeaking {
                    text,
                    tone: options.tone,
                });
            }
            GateEvent::Finished { text, .. } => {
                self.planner.on_transcript(&TranscriptEvent::prospect(text.clone()));
                if current {
                    self.authority.on_prospect_stopped_speaking();
                }
                self.publish(SessionUpdate::ProspectFinished {
                    text,
                    completed: true,
                });
                if self.behavior_gate.is_terminal() && !self.call_ended {
                    self.call_ended = true;
                    let output = self.behavior_gate.current_output();
                    info!(reason = output.reason.code(), "prospect ended the call");
                    self.publish(SessionUpdate::CallEnded {
                        stage: output.stage,
                        reason: output.reason.code().to_string(),
                    });
                }
            }
            GateEvent::Aborted { text, .. } => {
                if current {
                    self.authority.on_prospect_stopped_speaking();
                }
                self.publish(SessionUpdate::ProspectFinished {
                    text,
                    completed: false,
                });
            }
            GateEvent::Cancelled { text, .. } => {
                debug!(text = %text, "utterance cancelled before speaking");
            }
            GateEvent::Failed { text, error, .. } => {
                warn!(error = %error, "speech sink failed");
                if current {
                    self.authority.on_prospect_stopped_speaking();
                }
                self.publish(SessionUpdate::ProspectFinished {
                    text,
                    completed: false,
                });
            }
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            turn: self.authority.turn(),
            gate_open: self.authority.gate().is_open(),
            mic_capture_enabled: self.authority.mic_capture_enabled(),
            prospect_output_enabled: self.authority.prospect_output_enabled(),
            stage: self.behavior_gate.current_output(),
            scores: self.scoring.scores().clone(),
            tier: self.scoring.tier(),
            queue_size: self.queue.size(),
            context_version: self.queue.context_version(),
            open_objections: self.objections.open_objections().map(|o| o.name.clone()).collect(),
            plan_in_flight: self.coach.plan_in_flight(),
            stale_plans_discarded: self.coach.stale_discarded(),
            cancelled_plans: self.coach.cancelled_plans(),
            last_reflexes: self.coach.latest_reflexes().cloned(),
            transcript_lines: self.planner.history().len(),
            call_ended: self.call_ended,
        }
    }

    fn rubric_input(&self) -> RubricInput {
        RubricInput {
            talk_ratio: self.planner.history().talk_ratio(),
            open_ended_count: self.open_questions,
            follow_up_count: self.follow_ups,
            objections_raised: self.objections.raised_count(),
            objections_resolved: self.objections.resolved_count(),
        }
    }

    /// Close out the call; the rubric is judged off the loop
    fn end(&mut self, reply: oneshot::Sender<SessionReport>) {
        self.authority.gate_mut().close();
        self.coach.cancel_plan();

        let stats = self.rubric_input();
        let transcript = self.planner.history().render();
        let request = JudgeRequest {
            session_id: self.id.clone(),
            transcript: transcript.clone(),
            stats,
        };
        let mut report = SessionReport {
            session_id: self.id.clone(),
            final_stage: self.behavior_gate.current_output(),
            scores: self.scoring.scores().clone(),
            tier: self.scoring.tier(),
            rubric: rubric::heuristic_score(&stats),
            stats,
            objections: self.objections.instances().to_vec(),
            score_record: self.scoring.finish(),
            transcript,
        };
        info!(
            stage = %report.final_stage.stage,
            tier = %report.tier,
            "session ended"
        );

        let judge = self.judge.clone();
        let timeout_ms = self.judge_timeout_ms;
        tokio::spawn(
            async move {
                report.rubric = rubric::evaluate(judge.as_deref(), &request, timeout_ms).await;
                let _ = reply.send(report);
            }
            .in_current_span(),
        );
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> SessionConfig {
        SessionConfig {
            variance_seed: Some(0.5),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_of_new_session() {
        let handle = spawn_session("s-new", config(), SessionServices::offline());
        let status = handle.status().await.unwrap();
        assert_eq!(status.turn, TurnState::Idle);
        assert_eq!(status.stage.stage, BehaviorStage::Normal);
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.tier, BehaviorTier::Neutral);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_start_advances_context() {
        let handle = spawn_session("s-ctx", config(), SessionServices::offline());
        handle.user_started_speaking().await.unwrap();
        // Still speaking: no new interval
        handle.user_started_speaking().await.unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.context_version, 1);
        assert_eq!(status.turn, TurnState::User);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_turn_demands_name() {
        let handle = spawn_session("s-name", config(), SessionServices::offline());
        let output = handle
            .transcript(TranscriptEvent::user("Hey, got a minute to chat?"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(output.stage, BehaviorStage::NeedsName);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_final_transcript_ignored() {
        let handle = spawn_session("s-partial", config(), SessionServices::offline());
        let partial = TranscriptEvent {
            text: "Hey got a".to_string(),
            speaker: Speaker::User,
            is_final: false,
        };
        assert!(handle.transcript(partial).await.unwrap().is_none());
        assert_eq!(handle.status().await.unwrap().transcript_lines, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_returns_report_and_stops() {
        let handle = spawn_session("s-end", config(), SessionServices::offline());
        handle.transcript(TranscriptEvent::user("Hi, this is Dana from Acme.")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = handle.end().await.unwrap();
        assert_eq!(report.session_id, "s-end");
        assert!(report.score_record.is_some());
        assert!(report.rubric.score >= crate::RUBRIC_FLOOR);

        assert!(matches!(handle.status().await, Err(SessionError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_objection_is_none() {
        let handle = spawn_session("s-obj", config(), SessionServices::offline());
        assert!(handle.raise_objection("astrology").await.unwrap().is_none());
        let budget = handle.raise_objection("budget").await.unwrap().unwrap();
        assert_eq!(budget.still_blocking_root_ids.len(), 3);
        assert_eq!(handle.status().await.unwrap().open_objections, vec!["budget".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_stops() {
        let config = SessionConfig {
            idle_timeout_ms: 1000,
            ..config()
        };
        let handle = spawn_session("s-idle", config, SessionServices::offline());
        tokio::time::sleep(Duration::from_millis(800)).await;
        // Any command pushes the deadline out
        handle.status().await.unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;
        handle.status().await.unwrap();

        handle.closed().await;
        assert!(matches!(handle.status().await, Err(SessionError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_floor_flags() {
        let handle = spawn_session("s-flags", config(), SessionServices::offline());
        let status = handle.status().await.unwrap();
        assert!(status.mic_capture_enabled);
        assert!(status.prospect_output_enabled);
        assert!(status.last_reflexes.is_none());

        handle.user_started_speaking().await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(!status.prospect_output_enabled);
        assert_eq!(status.cancelled_plans, 0);
    }
}
