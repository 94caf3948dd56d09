//! Dual-Path Coach Client
//!
//! Fast path: one classify call per final user turn, short timeout, no retry.
//! Failure means "no reflexes", never an error for the caller.
//!
//! Slow path: at most one strategic plan in flight. Starting a new plan
//! cancels the previous one; any result from a superseded plan generation
//! is discarded when it arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CoachConfig;
use crate::core::services::{ClassifyRequest, CoachService, PlanRequest};
use crate::error::ServiceError;
use crate::types::{CoachReflexes, StrategicPlan};

/// Plan outcome tagged with the plan generation that produced it
#[derive(Debug)]
pub struct PlanResult {
    pub generation: u64,
    pub plan: Result<StrategicPlan, ServiceError>,
}

/// Cloneable handle for running the fast path off the session loop
#[derive(Clone)]
pub struct FastPath {
    service: Arc<dyn CoachService>,
    timeout_ms: u64,
}

impl FastPath {
    /// Classify within the timeout; `None` on any failure
    pub async fn classify(&self, request: &ClassifyRequest) -> Option<CoachReflexes> {
        let budget = Duration::from_millis(self.timeout_ms);
        match tokio::time::timeout(budget, self.service.classify(request)).await {
            Ok(Ok(reflexes)) => Some(reflexes),
            Ok(Err(e)) => {
                warn!(session_id = %request.session_id, error = %e, "classify failed, continuing without reflexes");
                None
            }
            Err(_) => {
                warn!(session_id = %request.session_id, timeout_ms = self.timeout_ms, "classify timed out");
                None
            }
        }
    }
}

struct PlanFlight {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct DualPathCoachClient {
    service: Arc<dyn CoachService>,
    config: CoachConfig,
    results: mpsc::UnboundedSender<PlanResult>,
    generation: u64,
    in_flight: Option<PlanFlight>,
    latest_plan: Option<StrategicPlan>,
    latest_reflexes: Option<CoachReflexes>,
    stale_discarded: u64,
    cancelled: u64,
}

impl DualPathCoachClient {
    pub fn new(
        service: Arc<dyn CoachService>,
        config: CoachConfig,
        results: mpsc::UnboundedSender<PlanResult>,
    ) -> Self {
        Self {
            service,
            config,
            results,
            generation: 0,
            in_flight: None,
            latest_plan: None,
            latest_reflexes: None,
            stale_discarded: 0,
            cancelled: 0,
        }
    }

    pub fn fast_path(&self) -> FastPath {
        FastPath {
            service: Arc::clone(&self.service),
            timeout_ms: self.config.classify_timeout_ms,
        }
    }

    /// Remember the latest reflexes (from classify or generation metadata)
    pub fn record_reflexes(&mut self, reflexes: Option<CoachReflexes>) {
        if reflexes.is_some() {
            self.latest_reflexes = reflexes;
        }
    }

    /// Start a strategic plan, superseding any plan still in flight
    pub fn start_plan(&mut self, request: PlanRequest) -> u64 {
        self.cancel_plan();
        self.generation += 1;
        let generation = self.generation;

        let token = CancellationToken::new();
        let task_token = token.clone();
        let service = Arc::clone(&self.service);
        let results = self.results.clone();
        let timeout_ms = self.config.plan_timeout_ms;

        let handle = tokio::spawn(async move {
            let plan = tokio::select! {
                _ = task_token.cancelled() => Err(ServiceError::Cancelled),
                outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), service.plan(&request)) => {
                    outcome.unwrap_or(Err(ServiceError::Timeout(timeout_ms)))
                }
            };
            let _ = results.send(PlanResult { generation, plan });
        });

        debug!(generation, "strategic plan started");
        self.in_flight = Some(PlanFlight {
            generation,
            token,
            handle,
        });
        generation
    }

    /// Cancel the plan in flight, if any
    pub fn cancel_plan(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            flight.token.cancel();
            flight.handle.abort();
            self.cancelled += 1;
            debug!(generation = flight.generation, "strategic plan cancelled");
        }
    }

    /// Fold a plan result in; returns true if it became the latest plan
    pub fn on_plan_result(&mut self, result: PlanResult) -> bool {
        if result.generation != self.generation {
            self.stale_discarded += 1;
            debug!(
                generation = result.generation,
                current = self.generation,
                "discarding stale plan"
            );
            return false;
        }
        if self
            .in_flight
            .as_ref()
            .map(|f| f.generation == result.generation)
            .unwrap_or(false)
        {
            self.in_flight = None;
        }
        match result.plan {
            Ok(plan) => {
                debug!(generation = result.generation, phase = ?plan.suggested_phase, "strategic plan ready");
                self.latest_plan = Some(plan);
                true
            }
            Err(ServiceError::Cancelled) => false,
            Err(e) => {
                warn!(generation = result.generation, error = %e, "strategic plan failed");
                false
            }
        }
    }

    /// Plan for the next generation call (sticky until replaced)
    pub fn latest_plan(&self) -> Option<&StrategicPlan> {
        self.latest_plan.as_ref()
    }

    pub fn latest_reflexes(&self) -> Option<&CoachReflexes> {
        self.latest_reflexes.as_ref()
    }

    pub fn plan_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn plan_generation(&self) -> u64 {
        self.generation
    }

    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded
    }

    pub fn cancelled_plans(&self) -> u64 {
        self.cancelled
    }
}

impl Drop for DualPathCoachClient {
    fn drop(&mut self) {
        self.cancel_plan();
    }
}

// =============================================================================
// TESTS
// =============================================================================
