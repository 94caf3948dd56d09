//! HTTP + WebSocket API for prospect-sim
//!
//! Endpoints:
//! - POST /session/new - Start a call session
//! - GET /session/{id} - Session status
//! - POST /session/{id}/speech - User speech activity (started / stopped)
//! - POST /session/{id}/transcript - Transcript event
//! - POST /session/{id}/objection - Raise a catalog objection
//! - POST /session/{id}/score - Apply a named scoring event
//! - POST /session/{id}/end - End the call, returns the report
//! - WS /ws/{id} - Live session updates
//! - GET /health - Health check

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::core::session::{
    spawn_session, SessionHandle, SessionReport, SessionServices, SessionStatus, SessionUpdate,
};
use crate::core::scoring::ScoreUpdate;
use crate::core::turn_authority::TurnDecision;
use crate::error::SessionError;
use crate::types::{ObjectionInstance, RelationshipContext, Speaker, StageOutput, TranscriptEvent};

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, SessionHandle>>,
    pub config: SessionConfig,
}

impl AppState {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    async fn handle(&self, id: &str) -> Result<SessionHandle, StatusCode> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(StatusCode::NOT_FOUND)
    }
}

/// Create new session request
#[derive(Debug, Default, Deserialize)]
pub struct NewSessionRequest {
    /// Fixed variance seed in [0, 1]
    pub seed: Option<f64>,
    pub relationship: Option<RelationshipContext>,
}

/// Create new session response
#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
}

/// Speech-activity event from the voice pipeline
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SpeechRequest {
    Started,
    Stopped { silence_ms: u64 },
}

/// Transcript event
#[derive(Debug, Deserialize)]
pub struct TranscriptRequest {
    pub text: String,
    #[serde(default = "default_speaker")]
    pub speaker: Speaker,
    #[serde(default = "default_final")]
    pub is_final: bool,
}

fn default_speaker() -> Speaker {
    Speaker::User
}

fn default_final() -> bool {
    true
}

/// Transcript response; `stage` is present for final user lines
#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub accepted: bool,
    pub stage: Option<StageOutput>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectionRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub event: String,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
}

/// Create the API router
pub fn create_router(config: SessionConfig) -> Router {
    let state = Arc::new(AppState::new(config));

    Router::new()
        .route("/health", get(health))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session))
        .route("/session/:id/speech", post(speech))
        .route("/session/:id/transcript", post(transcript))
        .route("/session/:id/objection", post(raise_objection))
        .route("/session/:id/score", post(score_event))
        .route("/session/:id/end", post(end_session))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

fn status_for(err: SessionError) -> StatusCode {
    match err {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Closed => StatusCode::GONE,
    }
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: sessions.len(),
    })
}

/// Create new session
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, StatusCode> {
    let mut config = state.config.clone();
    if req.seed.is_some() {
        config.variance_seed = req.seed;
    }
    config.validate().map_err(|e| {
        warn!(error = %e, "rejected session config");
        StatusCode::BAD_REQUEST
    })?;
    let services = SessionServices::from_config(&config).map_err(|e| {
        warn!(error = %e, "cannot build session services");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let handle = spawn_session(session_id.clone(), config, services);
    if let Some(relationship) = req.relationship {
        handle.set_relationship(relationship).await.map_err(status_for)?;
    }

    let mut sessions = state.sessions.write().await;
    sessions.insert(session_id.clone(), handle.clone());
    info!(session_id = %session_id, active = sessions.len(), "session created");
    drop(sessions);
    tokio::spawn(evict_when_stopped(Arc::clone(&state), handle));

    Ok(Json(NewSessionResponse {
        websocket_url: format!("/ws/{}", session_id),
        session_id,
    }))
}

/// Drop the registry entry once the actor stops on its own
async fn evict_when_stopped(state: Arc<AppState>, handle: SessionHandle) {
    handle.closed().await;
    let mut sessions = state.sessions.write().await;
    if sessions.remove(handle.id()).is_some() {
        info!(session_id = %handle.id(), active = sessions.len(), "stopped session evicted");
    }
}

/// Get session status
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatus>, StatusCode> {
    let handle = state.handle(&id).await?;
    handle.status().await.map(Json).map_err(status_for)
}

/// Speech activity
async fn speech(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SpeechRequest>,
) -> Result<Json<TurnDecision>, StatusCode> {
    let handle = state.handle(&id).await?;
    let decision = match req {
        SpeechRequest::Started => handle.user_started_speaking().await,
        SpeechRequest::Stopped { silence_ms } => handle.user_stopped_speaking(silence_ms).await,
    };
    decision.map(Json).map_err(status_for)
}

/// Transcript event
async fn transcript(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TranscriptRequest>,
) -> Result<Json<TranscriptResponse>, StatusCode> {
    let handle = state.handle(&id).await?;
    let accepted = req.is_final && !req.text.trim().is_empty();
    let event = TranscriptEvent {
        text: req.text,
        speaker: req.speaker,
        is_final: req.is_final,
    };
    let stage = handle.transcript(event).await.map_err(status_for)?;
    Ok(Json(TranscriptResponse { accepted, stage }))
}

/// Raise a catalog objection; unknown names are 422
async fn raise_objection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ObjectionRequest>,
) -> Result<Json<ObjectionInstance>, StatusCode> {
    let handle = state.handle(&id).await?;
    handle
        .raise_objection(&req.name)
        .await
        .map_err(status_for)?
        .map(Json)
        .ok_or(StatusCode::UNPROCESSABLE_ENTITY)
}

/// Apply a named scoring event; unknown names are 422
async fn score_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ScoreRequest>,
) -> Result<Json<ScoreUpdate>, StatusCode> {
    let handle = state.handle(&id).await?;
    handle
        .score_event(&req.event)
        .await
        .map_err(status_for)?
        .map(Json)
        .ok_or(StatusCode::UNPROCESSABLE_ENTITY)
}

/// End the call and drop the session
async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionReport>, StatusCode> {
    let handle = state
        .sessions
        .write()
        .await
        .remove(&id)
        .ok_or(StatusCode::NOT_FOUND)?;
    let report = handle.end().await.map_err(status_for)?;
    info!(session_id = %id, score = report.rubric.score, "session closed");
    Ok(Json(report))
}

/// WebSocket handler for live updates
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let rx = state.handle(&id).await?.subscribe();

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Forward session updates until either side goes away
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<SessionUpdate>) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(update) => {
                    let json = serde_json::to_string(&update).unwrap_or_default();
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket observer lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket receive error");
                    break;
                }
            },
        }
    }
    let _ = sender.close().await;
}

/// Run the API server
pub async fn run_server(addr: &str, config: SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(config);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("prospect-sim API server running on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  GET  /health                  - Health check");
    println!("  POST /session/new             - Start a call session");
    println!("  GET  /session/:id             - Session status");
    println!("  POST /session/:id/speech      - Speech activity (started / stopped)");
    println!("  POST /session/:id/transcript  - Transcript event");
    println!("  POST /session/:id/objection   - Raise an objection");
    println!("  POST /session/:id/score       - Apply a scoring event");
    println!("  POST /session/:id/end         - End the call");
    println!("  WS   /ws/:id                  - Live updates");
    println!();

    axum::serve(listener, app).await?;
    Ok(())
}
