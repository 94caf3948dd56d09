//! External collaborators: traits, wire contracts, HTTP clients
//!
//! Every collaborator sits behind a narrow async trait so the session can
//! run against HTTP services, the offline stand-ins in `core::offline`, or
//! test doubles.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ServiceEndpoints;
use crate::error::ServiceError;
use crate::types::{
    BehaviorStage, BehaviorState, CoachReflexes, RubricInput, SpeakOptions, StageDirective,
    StrategicPlan, TierInstructions,
};

// =============================================================================
// WIRE CONTRACTS
// =============================================================================

/// Everything the generation service needs for one prospect turn
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub session_id: String,
    /// Rendered "Rep: ... / Prospect: ..." history
    pub transcript: String,
    pub persona: String,
    pub behavior_state: BehaviorState,
    pub stage: BehaviorStage,
    pub directive: StageDirective,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflexes: Option<CoachReflexes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<StrategicPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<TierInstructions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationResponse {
    pub text: String,
    pub coach_metadata: Option<CoachReflexes>,
    /// Signed change to the prospect's irritation
    pub irritation_delta: Option<f64>,
    /// Satisfaction with the rep's handling of open objections (0.0 - 1.0)
    pub satisfaction: Option<f64>,
    /// Catalog objection the prospect raised in this response
    pub raised_objection: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifyRequest {
    pub session_id: String,
    pub utterance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_prospect_line: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanRequest {
    pub session_id: String,
    pub transcript: String,
    pub stage: BehaviorStage,
}

#[derive(Debug, Clone, Serialize)]
pub struct JudgeRequest {
    pub session_id: String,
    pub transcript: String,
    pub stats: RubricInput,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeVerdict {
    pub score: f64,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

// =============================================================================
// TRAITS
// =============================================================================

/// Produces the prospect's next line
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, ServiceError>;
}

/// Fast reflex classification and slow strategic planning
#[async_trait]
pub trait CoachService: Send + Sync {
    async fn classify(&self, request: &ClassifyRequest) -> Result<CoachReflexes, ServiceError>;
    async fn plan(&self, request: &PlanRequest) -> Result<StrategicPlan, ServiceError>;
}

/// Post-call rubric grader
#[async_trait]
pub trait RubricJudge: Send + Sync {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, ServiceError>;
}

/// Audio output. Dropping the returned future aborts playback.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn speak(&self, text: &str, options: SpeakOptions) -> Result<(), ServiceError>;
}

// =============================================================================
// HTTP
// =============================================================================

fn build_client(timeout_ms: u64) -> Result<Client, ServiceError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    Ok(Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_millis(timeout_ms))
        .build()?)
}

async fn post_json<Req, Resp>(client: &Client, url: &str, body: &Req) -> Result<Resp, ServiceError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    debug!(url, "POST");
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::RequestFailed(format!("{} returned {}", url, status)));
    }
    Ok(response.json::<Resp>().await?)
}

/// Generation over HTTP: `POST {base}/generate`
pub struct HttpGenerationService {
    client: Client,
    base_url: String,
}

impl HttpGenerationService {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout_ms)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// From configured endpoints; `NotConfigured` when no URL is set
    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Result<Self, ServiceError> {
        let url = endpoints
            .generation_url
            .as_deref()
            .ok_or(ServiceError::NotConfigured("generation"))?;
        Self::new(url, endpoints.request_timeout_ms)
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        post_json(&self.client, &format!("{}/generate", self.base_url), request).await
    }
}

/// Coach over HTTP: `POST {base}/classify`, `POST {base}/plan`
pub struct HttpCoachService {
    client: Client,
    base_url: String,
}

impl HttpCoachService {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout_ms)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Result<Self, ServiceError> {
        let url = endpoints
            .coach_url
            .as_deref()
            .ok_or(ServiceError::NotConfigured("coach"))?;
        Self::new(url, endpoints.request_timeout_ms)
    }
}

#[async_trait]
impl CoachService for HttpCoachService {
    async fn classify(&self, request: &ClassifyRequest) -> Result<CoachReflexes, ServiceError> {
        post_json(&self.client, &format!("{}/classify", self.base_url), request).await
    }

    async fn plan(&self, request: &PlanRequest) -> Result<StrategicPlan, ServiceError> {
        post_json(&self.client, &format!("{}/plan", self.base_url), request).await
    }
}

/// Rubric judge over HTTP: `POST {base}/judge`
pub struct HttpRubricJudge {
    client: Client,
    base_url: String,
}

impl HttpRubricJudge {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout_ms)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_endpoints(endpoints: &ServiceEndpoints) -> Result<Self, ServiceError> {
        let url = endpoints
            .judge_url
            .as_deref()
            .ok_or(ServiceError::NotConfigured("judge"))?;
        Self::new(url, endpoints.request_timeout_ms)
    }
}

#[async_trait]
impl RubricJudge for HttpRubricJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, ServiceError> {
        post_json(&self.client, &format!("{}/judge", self.base_url), request).await
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_response_optional_fields() {
        let r: GenerationResponse = serde_json::from_str(r#"{"text": "Who is this?"}"#).unwrap();
        assert_eq!(r.text, "Who is this?");
        assert!(r.coach_metadata.is_none());
        assert!(r.irritation_delta.is_none());

        let r: GenerationResponse = serde_json::from_str(
            r#"{"text": "Fine.", "irritation_delta": -0.1, "raised_objection": "budget",
                "coach_metadata": {"question_type": "open"}}"#,
        )
        .unwrap();
        assert_eq!(r.irritation_delta, Some(-0.1));
        assert_eq!(r.raised_objection.as_deref(), Some("budget"));
        assert!(r.coach_metadata.is_some());
    }

    #[test]
    fn test_request_omits_absent_hints() {
        let request = GenerationRequest {
            session_id: "s".to_string(),
            transcript: String::new(),
            persona: "Marcus".to_string(),
            behavior_state: BehaviorState::default(),
            stage: BehaviorStage::NeedsName,
            directive: BehaviorStage::NeedsName.directive(),
            reflexes: None,
            plan: None,
            tier: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stage"], "needs_name");
        assert_eq!(json["directive"]["demand"], "name");
        assert!(json.get("reflexes").is_none());
    }

    #[test]
    fn test_from_endpoints_requires_url() {
        let endpoints = ServiceEndpoints::default();
        assert!(matches!(
            HttpGenerationService::from_endpoints(&endpoints),
            Err(ServiceError::NotConfigured("generation"))
        ));
        assert!(HttpCoachService::from_endpoints(&endpoints).is_err());
        assert!(HttpRubricJudge::from_endpoints(&endpoints).is_err());
    }
}
