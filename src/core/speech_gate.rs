//! Speech Gate: the only path from the candidate queue to the speaker
//!
//! One utterance per grant. The pre-delay and the playback run in a spawned
//! task; closing the gate cancels a pending pre-delay and aborts playback
//! only when the utterance is abortable. Progress comes back as `GateEvent`s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::queue::CandidateQueue;
use crate::core::services::SpeechSink;
use crate::types::{CandidateUtterance, SpeakOptions};

/// Progress of one granted utterance, tagged with its grant sequence
#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    /// Pre-delay elapsed, playback began
    Started { seq: u64, text: String, options: SpeakOptions },
    Finished { seq: u64, text: String },
    /// Playback cut off by a closing gate
    Aborted { seq: u64, text: String },
    /// Closed during the pre-delay; nothing was spoken
    Cancelled { seq: u64, text: String },
    /// Speech sink reported an error
    Failed { seq: u64, text: String, error: String },
}

impl GateEvent {
    pub fn seq(&self) -> u64 {
        match self {
            GateEvent::Started { seq, .. }
            | GateEvent::Finished { seq, .. }
            | GateEvent::Aborted { seq, .. }
            | GateEvent::Cancelled { seq, .. }
            | GateEvent::Failed { seq, .. } => *seq,
        }
    }

    /// Last event for its utterance
    pub fn is_final(&self) -> bool {
        !matches!(self, GateEvent::Started { .. })
    }
}

/// Result of `open()`
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    /// Gate was already open; nothing changed
    AlreadyOpen,
    /// A non-abortable utterance is still playing
    Busy,
    /// Nothing to say; the gate closed itself
    Empty,
    /// An utterance was pulled and is on its way
    Speaking { seq: u64, text: String },
}

struct InFlight {
    seq: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
    started: Arc<AtomicBool>,
    abortable: bool,
    interruptible: bool,
}

pub struct SpeechGate {
    sink: Arc<dyn SpeechSink>,
    events: mpsc::UnboundedSender<GateEvent>,
    open: bool,
    current: Option<InFlight>,
    next_seq: u64,
    /// Redundant opens seen by this gate (log throttle)
    guard_hits: u64,
}

impl SpeechGate {
    pub fn new(sink: Arc<dyn SpeechSink>, events: mpsc::UnboundedSender<GateEvent>) -> Self {
        Self {
            sink,
            events,
            open: false,
            current: None,
            next_seq: 0,
            guard_hits: 0,
        }
    }

    /// Open the gate and pull the best candidate
    pub fn open(&mut self, queue: &mut CandidateQueue) -> OpenOutcome {
        if self.open {
            self.guard_hits += 1;
            if self.guard_hits == 1 || self.guard_hits % 10 == 0 {
                warn!(hits = self.guard_hits, "open() on an already open gate");
            }
            return OpenOutcome::AlreadyOpen;
        }
        if self.is_playing() {
            debug!("gate busy with non-abortable speech");
            return OpenOutcome::Busy;
        }

        match queue.pop_highest_priority() {
            None => {
                debug!("gate opened on empty queue, closing");
                self.open = false;
                OpenOutcome::Empty
            }
            Some(candidate) => {
                self.open = true;
                let seq = self.next_seq;
                self.next_seq += 1;
                let text = candidate.text.clone();
                self.spawn_speech(seq, candidate);
                OpenOutcome::Speaking { seq, text }
            }
        }
    }

    /// Close the gate: cancel a pending pre-delay, abort abortable playback
    pub fn close(&mut self) {
        if let Some(flight) = &self.current {
            let started = flight.started.load(Ordering::SeqCst);
            if started && !flight.abortable {
                debug!(seq = flight.seq, "closing gate, letting non-abortable speech finish");
            }
            flight.token.cancel();
        }
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// An utterance task is still running
    pub fn is_playing(&self) -> bool {
        self.current
            .as_ref()
            .map(|f| !f.handle.is_finished())
            .unwrap_or(false)
    }

    /// A started, non-interruptible utterance keeps the floor through a barge-in
    pub fn is_holding_floor(&self) -> bool {
        self.current
            .as_ref()
            .map(|f| !f.interruptible && f.started.load(Ordering::SeqCst) && !f.handle.is_finished())
            .unwrap_or(false)
    }

    /// Fold a gate event back in; returns false for events of a superseded grant
    ///
    /// Final events for the current grant close the gate. A `Started` that
    /// raced a close is stale unless the utterance plays on regardless.
    pub fn on_event(&mut self, event: &GateEvent) -> bool {
        let Some((seq, abortable)) = self.current.as_ref().map(|f| (f.seq, f.abortable)) else {
            return false;
        };
        if seq != event.seq() {
            debug!(seq = event.seq(), current = seq, "stale gate event");
            return false;
        }
        if event.is_final() {
            self.current = None;
            self.open = false;
            return true;
        }
        self.open || !abortable
    }

    pub fn guard_hits(&self) -> u64 {
        self.guard_hits
    }

    fn spawn_speech(&mut self, seq: u64, candidate: CandidateUtterance) {
        let token = CancellationToken::new();
        let started = Arc::new(AtomicBool::new(false));
        let abortable = candidate.abortable;
        let interruptible = candidate.interruptible;
        let options = candidate.speak_options();
        let text = candidate.text;
        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        let task_token = token.clone();
        let task_started = Arc::clone(&started);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    let _ = events.send(GateEvent::Cancelled { seq, text });
                    return;
                }
                _ = tokio::time::sleep(Duration::from_millis(options.pre_delay_ms)) => {}
            }

            task_started.store(true, Ordering::SeqCst);
            let _ = events.send(GateEvent::Started {
                seq,
                text: text.clone(),
                options,
            });

            let result = if abortable {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        let _ = events.send(GateEvent::Aborted { seq, text });
                        return;
                    }
                    result = sink.speak(&text, options) => result,
                }
            } else {
                sink.speak(&text, options).await
            };

            let event = match result {
                Ok(()) => GateEvent::Finished { seq, text },
                Err(e) => GateEvent::Failed {
                    seq,
                    text,
                    error: e.to_string(),
                },
            };
            let _ = events.send(event);
        });

        self.current = Some(InFlight {
            seq,
            token,
            handle,
            started,
            abortable,
            interruptible,
        });
    }
}

impl std::fmt::Debug for SpeechGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechGate")
            .field("open", &self.open)
            .field("in_flight", &self.current.as_ref().map(|c| c.seq))
            .field("guard_hits", &self.guard_hits)
            .finish()
    }
}

impl Drop for SpeechGate {
    fn drop(&mut self) {
        if let Some(flight) = &self.current {
            flight.token.cancel();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
