//! Integration tests for the session actor
//!
//! Tests the full path: speech activity + transcripts → planner → queue →
//! gate → speech sink, with scoring, objections and the end-of-call report

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

use prospect_sim::core::services::{
    ClassifyRequest, GenerationRequest, GenerationResponse, JudgeRequest, JudgeVerdict, PlanRequest,
};
use prospect_sim::core::{
    spawn_session, CoachService, GenerationService, RubricJudge, SessionHandle, SessionServices,
    SessionUpdate, TurnDecision,
};
use prospect_sim::error::ServiceError;
use prospect_sim::types::{
    BehaviorStage, CoachReflexes, ConversationPhase, RubricSource, StrategicPlan, TranscriptEvent,
};
use prospect_sim::SessionConfig;

fn config() -> SessionConfig {
    SessionConfig {
        variance_seed: Some(0.5),
        ..Default::default()
    }
}

/// Returns a fixed response after a delay
struct FixedGenerator {
    response: GenerationResponse,
    delay: Duration,
}

impl FixedGenerator {
    fn text(text: &str) -> Self {
        Self::with(GenerationResponse {
            text: text.to_string(),
            ..Default::default()
        })
    }

    fn with(response: GenerationResponse) -> Self {
        Self {
            response,
            delay: Duration::ZERO,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl GenerationService for FixedGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.response.clone())
    }
}

/// Never answers within any sane budget
struct SlowCoach;

#[async_trait]
impl CoachService for SlowCoach {
    async fn classify(&self, _request: &ClassifyRequest) -> Result<CoachReflexes, ServiceError> {
        tokio::time::sleep(Duration::from_secs(300)).await;
        Ok(CoachReflexes::default())
    }

    async fn plan(&self, _request: &PlanRequest) -> Result<StrategicPlan, ServiceError> {
        tokio::time::sleep(Duration::from_secs(300)).await;
        Ok(StrategicPlan {
            suggested_phase: ConversationPhase::Opening,
            pending_trap: None,
            pressure_adjustment: 0.0,
        })
    }
}

/// Records every request it is asked to generate for
struct CapturingGenerator {
    response: GenerationResponse,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl CapturingGenerator {
    fn new(response: GenerationResponse) -> Arc<Self> {
        Arc::new(Self {
            response,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for CapturingGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.response.clone())
    }
}

/// Instant reflexes; plans take 3s
struct PlanningCoach;

#[async_trait]
impl CoachService for PlanningCoach {
    async fn classify(&self, _request: &ClassifyRequest) -> Result<CoachReflexes, ServiceError> {
        Ok(CoachReflexes::default())
    }

    async fn plan(&self, _request: &PlanRequest) -> Result<StrategicPlan, ServiceError> {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok(discovery_plan())
    }
}

fn discovery_plan() -> StrategicPlan {
    StrategicPlan {
        suggested_phase: ConversationPhase::Discovery,
        pending_trap: Some("timing".to_string()),
        pressure_adjustment: 0.25,
    }
}

struct FixedJudge(f64);

#[async_trait]
impl RubricJudge for FixedJudge {
    async fn judge(&self, _request: &JudgeRequest) -> Result<JudgeVerdict, ServiceError> {
        Ok(JudgeVerdict {
            score: self.0,
            strengths: vec!["Clear opener".to_string()],
            improvements: Vec::new(),
        })
    }
}

async fn wait_for(
    rx: &mut broadcast::Receiver<SessionUpdate>,
    pred: impl Fn(&SessionUpdate) -> bool,
) -> Option<SessionUpdate> {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match rx.recv().await {
                Ok(update) if pred(&update) => return Some(update),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// One rep turn: start speaking, final transcript, talk for 2s, go quiet
async fn rep_says(handle: &SessionHandle, text: &str) -> TurnDecision {
    handle.user_started_speaking().await.unwrap();
    handle.transcript(TranscriptEvent::user(text)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2000)).await;
    handle.user_stopped_speaking(700).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_offline_call_prospect_answers() {
    let handle = spawn_session("call-offline", config(), SessionServices::offline());
    let mut updates = handle.subscribe();

    let decision = rep_says(&handle, "Hey, got a minute to chat?").await;
    assert_eq!(
        decision,
        TurnDecision::ProspectSpeaking {
            text: "Sorry, who is this?".to_string()
        }
    );

    let finished = wait_for(&mut updates, |u| matches!(u, SessionUpdate::ProspectFinished { .. }))
        .await
        .unwrap();
    assert!(matches!(finished, SessionUpdate::ProspectFinished { completed: true, .. }));

    let status = handle.status().await.unwrap();
    assert_eq!(status.stage.stage, BehaviorStage::NeedsName);
    assert_eq!(status.transcript_lines, 2);
    assert!(!status.gate_open);
}

#[tokio::test(start_paused = true)]
async fn test_blank_generation_never_queued() {
    let services = SessionServices::offline().with_generator(Arc::new(FixedGenerator::text("   ")));
    let handle = spawn_session("call-blank", config(), services);
    let mut updates = handle.subscribe();

    assert_eq!(
        rep_says(&handle, "Hi, this is Dana from Acme.").await,
        TurnDecision::FloorOpenNothingQueued
    );
    tokio::time::sleep(Duration::from_secs(5)).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.queue_size, 0);
    while let Ok(update) = updates.try_recv() {
        assert!(
            !matches!(update, SessionUpdate::CandidateQueued { .. } | SessionUpdate::ProspectSpeaking { .. }),
            "unexpected {:?}",
            update
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_generation_two_contexts_late_is_dropped() {
    let generator = FixedGenerator::text("Late answer.").slow(Duration::from_secs(10));
    let handle = spawn_session("call-stale", config(), SessionServices::offline().with_generator(Arc::new(generator)));

    rep_says(&handle, "Hi, this is Dana from Acme.").await;
    // Two more speaking intervals before the generation lands
    handle.user_started_speaking().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2000)).await;
    handle.user_stopped_speaking(700).await.unwrap();
    handle.user_started_speaking().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.context_version, 3);
    assert_eq!(status.queue_size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_generation_one_context_late_is_kept() {
    let generator = FixedGenerator::text("Late answer.").slow(Duration::from_secs(10));
    let handle = spawn_session("call-late", config(), SessionServices::offline().with_generator(Arc::new(generator)));

    rep_says(&handle, "Hi, this is Dana from Acme.").await;
    handle.user_started_speaking().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.context_version, 2);
    assert_eq!(status.queue_size, 1);
}

#[tokio::test(start_paused = true)]
async fn test_irritation_delta_ends_call_with_farewell() {
    let generator = FixedGenerator::with(GenerationResponse {
        text: "I'm hanging up now, goodbye.".to_string(),
        irritation_delta: Some(0.95),
        ..Default::default()
    });
    let handle = spawn_session("call-done", config(), SessionServices::offline().with_generator(Arc::new(generator)));
    let mut updates = handle.subscribe();

    assert!(matches!(
        rep_says(&handle, "Listen buddy, you need to hear this.").await,
        TurnDecision::ProspectSpeaking { .. }
    ));
    wait_for(&mut updates, |u| matches!(u, SessionUpdate::ProspectSpeaking { .. }))
        .await
        .unwrap();

    // Barging in does not cut off the farewell
    handle.user_started_speaking().await.unwrap();
    let finished = wait_for(&mut updates, |u| matches!(u, SessionUpdate::ProspectFinished { .. }))
        .await
        .unwrap();
    assert!(matches!(finished, SessionUpdate::ProspectFinished { completed: true, .. }));

    let ended = wait_for(&mut updates, |u| matches!(u, SessionUpdate::CallEnded { .. }))
        .await
        .unwrap();
    assert!(matches!(ended, SessionUpdate::CallEnded { stage: BehaviorStage::Done, .. }));

    let status = handle.status().await.unwrap();
    assert!(status.call_ended);
    assert_eq!(status.stage.stage, BehaviorStage::Done);

    // Nothing the rep says after the hang-up moves the gate
    let output = handle
        .transcript(TranscriptEvent::user("Wait, sorry, one more thing."))
        .await
        .unwrap();
    assert!(output.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_objection_resolved_by_rep() {
    let handle = spawn_session("call-objection", config(), SessionServices::offline());
    let mut updates = handle.subscribe();

    let budget = handle.raise_objection("budget").await.unwrap().unwrap();
    assert_eq!(budget.roots.len(), 3);

    handle
        .transcript(TranscriptEvent::user(
            "We can start with a free trial on month-to-month terms, and most teams see 30% cost savings.",
        ))
        .await
        .unwrap();

    let resolved = wait_for(&mut updates, |u| matches!(u, SessionUpdate::ObjectionResolved { .. }))
        .await
        .unwrap();
    assert!(matches!(resolved, SessionUpdate::ObjectionResolved { ref name } if name == "budget"));

    let status = handle.status().await.unwrap();
    assert!(status.open_objections.is_empty());
    assert!(status.scores.trust > 50.0);

    let report = handle.end().await.unwrap();
    assert_eq!(report.stats.objections_raised, 1);
    assert_eq!(report.stats.objections_resolved, 1);
    assert!(report.objections[0].resolved);
}

#[tokio::test(start_paused = true)]
async fn test_ignored_objection_costs_trust() {
    let handle = spawn_session("call-ignored", config(), SessionServices::offline());
    handle.raise_objection("budget").await.unwrap();
    handle
        .transcript(TranscriptEvent::user("So anyway, when works for a demo"))
        .await
        .unwrap();

    let status = handle.status().await.unwrap();
    assert_eq!(status.scores.trust, 40.0);
    assert_eq!(status.open_objections, vec!["budget".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_rep_cues_move_scores() {
    let handle = spawn_session("call-scores", config(), SessionServices::offline());
    handle
        .transcript(TranscriptEvent::user(
            "Thanks Marcus, how does your dispatch team handle peak season?",
        ))
        .await
        .unwrap();

    let status = handle.status().await.unwrap();
    assert_eq!(status.scores.rapport, 53.0);
    assert_eq!(status.scores.interest, 55.0);

    let report = handle.end().await.unwrap();
    assert_eq!(report.stats.open_ended_count, 1);
    assert_eq!(report.rubric.source, RubricSource::Heuristic);
}

#[tokio::test(start_paused = true)]
async fn test_named_score_event() {
    let handle = spawn_session("call-named", config(), SessionServices::offline());
    let update = handle.score_event("pushy_close").await.unwrap().unwrap();
    assert_eq!(update.scores.trust, 38.0);
    assert!(update.instructions.is_some());
    assert!(handle.score_event("telepathy").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_report_uses_judge() {
    let services = SessionServices::offline().with_judge(Arc::new(FixedJudge(7.5)));
    let handle = spawn_session("call-judged", config(), services);
    handle.transcript(TranscriptEvent::user("Hi, this is Dana from Acme.")).await.unwrap();

    let report = handle.end().await.unwrap();
    assert_eq!(report.rubric.source, RubricSource::Judge);
    assert_eq!(report.rubric.score, 7.5);
    assert!(report.transcript.contains("Dana from Acme"));
    assert!(report.score_record.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_slow_coach_never_stalls_speech_events() {
    let services = SessionServices::offline().with_coach(Arc::new(SlowCoach));
    let handle = spawn_session("call-slow-coach", config(), services);

    assert_eq!(handle.user_started_speaking().await.unwrap(), TurnDecision::UserHolding);
    let status = handle.status().await.unwrap();
    assert!(status.plan_in_flight);

    // Classify times out; the prospect still answers
    let mut updates = handle.subscribe();
    handle.transcript(TranscriptEvent::user("Hey, got a minute to chat?")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2000)).await;
    handle.user_stopped_speaking(700).await.unwrap();
    let speaking = wait_for(&mut updates, |u| matches!(u, SessionUpdate::ProspectSpeaking { .. })).await;
    assert!(speaking.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_late_plan_shapes_next_turn_only() {
    let generator = CapturingGenerator::new(GenerationResponse {
        text: "Okay, go on.".to_string(),
        ..Default::default()
    });
    let services = SessionServices::offline()
        .with_generator(generator.clone())
        .with_coach(Arc::new(PlanningCoach));
    let handle = spawn_session("call-plan-order", config(), services);
    let mut updates = handle.subscribe();

    // The fast path queues a candidate before the plan lands
    handle.user_started_speaking().await.unwrap();
    handle.transcript(TranscriptEvent::user("Hi, this is Dana from Acme.")).await.unwrap();
    let queued = wait_for(&mut updates, |u| matches!(u, SessionUpdate::CandidateQueued { .. }))
        .await
        .unwrap();
    let SessionUpdate::CandidateQueued { text: queued_text, .. } = queued else {
        unreachable!()
    };
    let status = handle.status().await.unwrap();
    assert!(status.plan_in_flight);
    assert_eq!(status.queue_size, 1);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    let status = handle.status().await.unwrap();
    assert!(!status.plan_in_flight);
    assert_eq!(status.queue_size, 1);
    assert_eq!(generator.requests().len(), 1);
    assert!(generator.requests()[0].plan.is_none());

    // The queued line is spoken as it was
    let decision = handle.user_stopped_speaking(700).await.unwrap();
    assert_eq!(decision, TurnDecision::ProspectSpeaking { text: queued_text });
    wait_for(&mut updates, |u| matches!(u, SessionUpdate::ProspectFinished { .. }))
        .await
        .unwrap();

    // The plan rides along on the next generation
    handle.user_started_speaking().await.unwrap();
    handle
        .transcript(TranscriptEvent::user("I help dispatch teams cut empty miles."))
        .await
        .unwrap();
    wait_for(&mut updates, |u| matches!(u, SessionUpdate::CandidateQueued { .. }))
        .await
        .unwrap();
    assert_eq!(generator.requests()[1].plan, Some(discovery_plan()));

    // A fresh speaking interval supersedes the plan still in flight
    tokio::time::sleep(Duration::from_millis(2000)).await;
    handle.user_stopped_speaking(700).await.unwrap();
    handle.user_started_speaking().await.unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.cancelled_plans, 1);
    assert!(status.plan_in_flight);
}

#[tokio::test(start_paused = true)]
async fn test_satisfaction_applies_before_new_objection() {
    let generator = FixedGenerator::with(GenerationResponse {
        text: "Timing's fine, I guess. Money is the real problem.".to_string(),
        satisfaction: Some(1.0),
        raised_objection: Some("budget".to_string()),
        ..Default::default()
    });
    let services = SessionServices::offline().with_generator(Arc::new(generator));
    let handle = spawn_session("call-satisfied", config(), services);
    let mut updates = handle.subscribe();

    handle.raise_objection("timing").await.unwrap();
    handle
        .transcript(TranscriptEvent::user("Hi, this is Dana from Acme."))
        .await
        .unwrap();
    let resolved = wait_for(&mut updates, |u| matches!(u, SessionUpdate::ObjectionResolved { .. }))
        .await
        .unwrap();
    assert!(matches!(resolved, SessionUpdate::ObjectionResolved { ref name } if name == "timing"));
    wait_for(&mut updates, |u| matches!(u, SessionUpdate::CandidateQueued { .. }))
        .await
        .unwrap();

    let status = handle.status().await.unwrap();
    assert_eq!(status.open_objections, vec!["budget".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_talking_over_farewell_generates_nothing_new() {
    let generator = CapturingGenerator::new(GenerationResponse {
        text: "I'm done here. Goodbye.".to_string(),
        irritation_delta: Some(0.95),
        ..Default::default()
    });
    let handle = spawn_session(
        "call-one-farewell",
        config(),
        SessionServices::offline().with_generator(generator.clone()),
    );
    let mut updates = handle.subscribe();

    rep_says(&handle, "Listen buddy, you need to hear this.").await;
    wait_for(&mut updates, |u| matches!(u, SessionUpdate::ProspectSpeaking { .. }))
        .await
        .unwrap();

    handle.transcript(TranscriptEvent::user("Wait, hold on.")).await.unwrap();
    handle
        .transcript(TranscriptEvent::user("Please, just give me one minute."))
        .await
        .unwrap();
    wait_for(&mut updates, |u| matches!(u, SessionUpdate::CallEnded { .. }))
        .await
        .unwrap();

    assert_eq!(generator.requests().len(), 1);
    assert_eq!(handle.status().await.unwrap().queue_size, 0);
}
