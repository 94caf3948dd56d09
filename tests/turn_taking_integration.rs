//! Integration tests for turn taking
//!
//! Tests the path: speech activity → turn authority → speech gate → queue → sink

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use prospect_sim::config::TurnConfig;
use prospect_sim::core::{
    CandidateQueue, GateEvent, OpenOutcome, SpeechGate, SpeechSink, TurnAuthority, TurnDecision,
};
use prospect_sim::error::ServiceError;
use prospect_sim::types::{CandidateUtterance, SpeakOptions, TurnState};

/// Records utterances as they start; each takes 2s to play
#[derive(Default)]
struct RecordingSink {
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechSink for RecordingSink {
    async fn speak(&self, text: &str, _options: SpeakOptions) -> Result<(), ServiceError> {
        self.started.lock().unwrap().push(text.to_string());
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.finished.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct Rig {
    authority: TurnAuthority,
    queue: CandidateQueue,
    events: mpsc::UnboundedReceiver<GateEvent>,
    sink: Arc<RecordingSink>,
}

fn rig() -> Rig {
    let sink = Arc::new(RecordingSink::default());
    let (tx, events) = mpsc::unbounded_channel();
    let gate = SpeechGate::new(sink.clone(), tx);
    Rig {
        authority: TurnAuthority::new(TurnConfig::default(), gate),
        queue: CandidateQueue::new(5),
        events,
        sink,
    }
}

impl Rig {
    /// User speaks for `spoken_ms`, then reports `silence_ms` of silence
    fn user_turn(&mut self, spoken_ms: u64, silence_ms: u64) -> TurnDecision {
        let t0 = Instant::now();
        self.authority.on_user_started_speaking_at(t0);
        let now = t0 + Duration::from_millis(spoken_ms + silence_ms);
        self.authority.on_user_stopped_speaking_at(silence_ms, now, &mut self.queue)
    }

    /// Receive the next gate event and fold it in like the session does
    async fn next_event(&mut self) -> GateEvent {
        let event = self.events.recv().await.unwrap();
        self.fold(&event);
        event
    }

    /// Returns false when the event belonged to a superseded grant
    fn fold(&mut self, event: &GateEvent) -> bool {
        if !self.authority.gate_mut().on_event(event) {
            return false;
        }
        match event {
            GateEvent::Started { .. } => {
                self.authority.on_prospect_started_speaking();
            }
            GateEvent::Cancelled { .. } => {}
            _ => {
                self.authority.on_prospect_stopped_speaking();
            }
        }
        true
    }
}

#[tokio::test(start_paused = true)]
async fn test_short_speech_never_opens_gate() {
    let mut r = rig();
    r.queue.push(CandidateUtterance::new("Who is this?", 0.5));

    // Plenty of silence, but only 400ms of speech
    let decision = r.user_turn(400, 2000);
    assert_eq!(
        decision,
        TurnDecision::FalseAlarm {
            silence_ms: 2000,
            spoken_ms: 400
        }
    );
    assert!(!r.authority.gate().is_open());
    assert_eq!(r.authority.turn(), TurnState::User);
    assert_eq!(r.queue.size(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_breath_mid_sentence_never_opens_gate() {
    let mut r = rig();
    r.queue.push(CandidateUtterance::new("Who is this?", 0.5));
    let decision = r.user_turn(3000, 300);
    assert!(matches!(decision, TurnDecision::FalseAlarm { .. }));
    assert!(!r.authority.prospect_output_enabled());
}

#[tokio::test(start_paused = true)]
async fn test_floor_handed_over_and_back() {
    let mut r = rig();
    r.queue.push(CandidateUtterance::new("Who is this?", 0.5));

    let decision = r.user_turn(1800, 700);
    assert_eq!(
        decision,
        TurnDecision::ProspectSpeaking {
            text: "Who is this?".to_string()
        }
    );
    assert!(r.authority.gate().is_open());
    assert!(r.authority.prospect_output_enabled());

    assert!(matches!(r.next_event().await, GateEvent::Started { .. }));
    assert_eq!(r.authority.turn(), TurnState::Prospect);
    assert!(!r.authority.mic_capture_enabled());

    assert!(matches!(r.next_event().await, GateEvent::Finished { .. }));
    assert_eq!(r.authority.turn(), TurnState::Idle);
    assert!(r.authority.mic_capture_enabled());
    assert!(!r.authority.gate().is_open());
    assert_eq!(*r.sink.finished.lock().unwrap(), vec!["Who is this?".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_floor_open_with_nothing_queued() {
    let mut r = rig();
    assert_eq!(r.user_turn(1500, 800), TurnDecision::FloorOpenNothingQueued);
    assert!(!r.authority.gate().is_open());
    assert_eq!(r.authority.turn(), TurnState::Idle);

    // A late candidate takes the free floor
    r.queue.push(CandidateUtterance::new("Sorry, who?", 0.5));
    let decision = r.authority.on_candidate_ready(&mut r.queue);
    assert!(matches!(decision, TurnDecision::ProspectSpeaking { .. }));
    // The floor is taken now
    r.queue.push(CandidateUtterance::new("Hello?", 0.5));
    assert_eq!(r.authority.on_candidate_ready(&mut r.queue), TurnDecision::Unchanged);
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_cancels_pre_delay() {
    let mut r = rig();
    r.queue.push(CandidateUtterance::new("Well, let me think.", 0.5).with_pre_delay_ms(800));
    assert!(matches!(r.user_turn(2000, 700), TurnDecision::ProspectSpeaking { .. }));

    // User starts again before the pre-delay elapses
    r.authority.on_user_started_speaking();
    assert!(matches!(r.next_event().await, GateEvent::Cancelled { .. }));
    assert!(r.sink.started.lock().unwrap().is_empty());
    assert!(!r.authority.gate().is_open());
    assert_eq!(r.authority.turn(), TurnState::User);
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_aborts_speech() {
    let mut r = rig();
    r.queue.push(CandidateUtterance::new("So the thing about our carriers is...", 0.5));
    r.user_turn(2000, 700);
    assert!(matches!(r.next_event().await, GateEvent::Started { .. }));

    r.authority.on_user_started_speaking();
    assert!(matches!(r.next_event().await, GateEvent::Aborted { .. }));
    assert!(r.sink.finished.lock().unwrap().is_empty());
    assert!(r.authority.mic_capture_enabled());
}

#[tokio::test(start_paused = true)]
async fn test_farewell_plays_through_barge_in() {
    let mut r = rig();
    let farewell = CandidateUtterance::new("I'm done here. Goodbye.", 1.0)
        .with_abortable(false)
        .with_interruptible(false);
    r.queue.push(farewell);
    r.user_turn(2000, 700);
    assert!(matches!(r.next_event().await, GateEvent::Started { .. }));

    assert_eq!(r.authority.on_user_started_speaking(), TurnDecision::ProspectHolding);
    assert!(r.authority.gate().is_playing());
    assert!(r.authority.prospect_output_enabled());
    assert!(matches!(r.next_event().await, GateEvent::Finished { .. }));
    assert_eq!(r.sink.finished.lock().unwrap().len(), 1);
    // The user's turn survives the held line
    assert_eq!(r.authority.turn(), TurnState::User);
    assert!(!r.authority.gate().is_open());
}

#[tokio::test(start_paused = true)]
async fn test_started_racing_barge_in_does_not_steal_floor() {
    let mut r = rig();
    r.queue.push(CandidateUtterance::new("So what we do is...", 0.5));
    r.user_turn(2000, 700);

    // Playback began, but the user barges in before the session sees it
    let started = r.events.recv().await.unwrap();
    assert!(matches!(started, GateEvent::Started { .. }));
    let t0 = Instant::now();
    assert_eq!(r.authority.on_user_started_speaking_at(t0), TurnDecision::UserHolding);

    assert!(!r.fold(&started));
    assert_eq!(r.authority.turn(), TurnState::User);
    let aborted = r.events.recv().await.unwrap();
    assert!(matches!(aborted, GateEvent::Aborted { .. }));
    assert!(r.fold(&aborted));
    assert_eq!(r.authority.turn(), TurnState::User);

    // The user's stop still hands the floor back
    r.queue.push(CandidateUtterance::new("Sorry, go ahead.", 0.5));
    let decision = r.authority.on_user_stopped_speaking_at(
        700,
        t0 + Duration::from_millis(2500),
        &mut r.queue,
    );
    assert_eq!(
        decision,
        TurnDecision::ProspectSpeaking {
            text: "Sorry, go ahead.".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_open_is_noop() {
    let mut r = rig();
    r.queue.push(CandidateUtterance::new("First.", 0.9));
    r.queue.push(CandidateUtterance::new("Second.", 0.1));

    let gate = r.authority.gate_mut();
    assert!(matches!(gate.open(&mut r.queue), OpenOutcome::Speaking { .. }));
    assert_eq!(gate.open(&mut r.queue), OpenOutcome::AlreadyOpen);
    assert_eq!(gate.guard_hits(), 1);
    assert_eq!(r.queue.size(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_speech_drops_two_generation_old_candidates() {
    let mut r = rig();
    r.queue.push(CandidateUtterance::new("From the first context.", 0.5));

    r.authority.on_user_started_speaking();
    assert_eq!(r.queue.on_new_user_speech(), 1);
    assert_eq!(r.queue.size(), 1, "one generation behind is kept");

    assert_eq!(r.queue.on_new_user_speech(), 2);
    assert!(r.queue.is_empty());

    // A generation result prepared for context 0 arrives late
    let late = CandidateUtterance::new("Too late.", 0.9);
    assert!(!r.queue.push_for_version_at(late, 0, Instant::now()));
    assert!(r.queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_expired_candidate_is_not_spoken() {
    let mut r = rig();
    r.queue.push(CandidateUtterance::new("Stale thought.", 0.9).with_expiry_ms(1000));
    tokio::time::advance(Duration::from_millis(1500)).await;
    assert_eq!(r.user_turn(1500, 700), TurnDecision::FloorOpenNothingQueued);
}
