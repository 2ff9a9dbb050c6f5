//! Record-service REST client.
//!
//! The record service is the durable side of the system: session records,
//! violation storage, per-assessment proctoring policies. This client is the
//! only component that talks to it; everything else goes through the
//! registry or the signaling channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Response;
use tracing::debug;

use vigil_core::ids::{AssessmentId, SessionToken};
use vigil_core::policy::MonitoringPolicy;
use vigil_core::session::SessionSummary;
use vigil_core::violation::Violation;
use vigil_monitor::reporter::ViolationStore;
use vigil_monitor::{MonitorError, StoreError};

/// Dashboard-side failures.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// The request never completed (connect, timeout, body decode).
    #[error("record service request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The record service answered with a non-success status.
    #[error("record service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// A registry operation failed.
    #[error(transparent)]
    Registry(#[from] vigil_registry::RegistryError),
    /// A transport-link operation failed.
    #[error(transparent)]
    Transport(#[from] vigil_transport::TransportError),
    /// A monitoring operation failed.
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

/// HTTP client for the record service.
pub struct RecordServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl RecordServiceClient {
    /// Client against `base_url` (no trailing slash) with a request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, DashboardError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// `GET /active-sessions` — every session currently worth watching.
    pub async fn active_sessions(&self) -> Result<Vec<SessionSummary>, DashboardError> {
        let resp = self
            .http
            .get(format!("{}/active-sessions", self.base_url))
            .send()
            .await?;
        let summaries: Vec<SessionSummary> = Self::ok(resp).await?.json().await?;
        debug!(count = summaries.len(), "fetched active sessions");
        Ok(summaries)
    }

    /// `POST /sessions/{token}/join` — register the observer's interest.
    pub async fn join_session(&self, token: &SessionToken) -> Result<(), DashboardError> {
        let resp = self
            .http
            .post(format!("{}/sessions/{}/join", self.base_url, token))
            .send()
            .await?;
        let _ = Self::ok(resp).await?;
        Ok(())
    }

    /// `POST /violations` — persist one violation record.
    pub async fn post_violation(&self, violation: &Violation) -> Result<(), DashboardError> {
        let resp = self
            .http
            .post(format!("{}/violations", self.base_url))
            .json(violation)
            .send()
            .await?;
        let _ = Self::ok(resp).await?;
        Ok(())
    }

    /// `GET /proctoring-policy/{assessment}` — the assessment's policy.
    pub async fn proctoring_policy(
        &self,
        assessment: &AssessmentId,
    ) -> Result<MonitoringPolicy, DashboardError> {
        let resp = self
            .http
            .get(format!("{}/proctoring-policy/{}", self.base_url, assessment))
            .send()
            .await?;
        Ok(Self::ok(resp).await?.json().await?)
    }

    async fn ok(resp: Response) -> Result<Response, DashboardError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(DashboardError::Status { status, body })
    }
}

#[async_trait]
impl ViolationStore for RecordServiceClient {
    async fn persist(&self, violation: &Violation) -> Result<(), StoreError> {
        self.post_violation(violation)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use vigil_core::violation::ViolationKind;

    async fn client(server: &MockServer) -> RecordServiceClient {
        RecordServiceClient::new(server.uri()).unwrap()
    }

    #[tokio::test]
    async fn active_sessions_parses_summaries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/active-sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "token": "tok-1",
                "candidateId": "cand-1",
                "assessmentId": "assess-1",
                "startedAt": "2026-08-29T10:00:00Z",
                "riskScore": 15,
                "violationCount": 3,
                "isLive": true
            }])))
            .mount(&server)
            .await;

        let summaries = client(&server).await.active_sessions().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].token.as_str(), "tok-1");
        assert_eq!(summaries[0].risk_score, 15);
        assert!(summaries[0].is_live);
    }

    #[tokio::test]
    async fn non_success_status_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/active-sessions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client(&server).await.active_sessions().await.unwrap_err();
        assert_matches!(err, DashboardError::Status { status: 503, ref body } if body == "maintenance");
    }

    #[tokio::test]
    async fn join_session_posts_to_the_token_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/tok-1/join"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .join_session(&SessionToken::new("tok-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_violation_sends_the_wire_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/violations"))
            .and(body_partial_json(json!({
                "sessionToken": "tok-1",
                "type": "mobile_phone_detected",
                "severity": "critical"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let violation = Violation::new(
            SessionToken::new("tok-1"),
            ViolationKind::MobilePhoneDetected,
            "mobile phone in frame",
            json!({"label": "mobile_phone"}),
        );
        client(&server).await.post_violation(&violation).await.unwrap();
    }

    #[tokio::test]
    async fn proctoring_policy_fills_defaults_for_partial_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/proctoring-policy/assess-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "requireFullscreen": false,
                "minCameraLevel": 35
            })))
            .mount(&server)
            .await;

        let policy = client(&server)
            .await
            .proctoring_policy(&AssessmentId::new("assess-1"))
            .await
            .unwrap();
        assert!(!policy.require_fullscreen);
        assert_eq!(policy.min_camera_level, 35);
        assert!(policy.enable_face_detection);
    }

    #[tokio::test]
    async fn store_failure_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/violations"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let violation = Violation::new(
            SessionToken::new("tok-1"),
            ViolationKind::LowAttention,
            "test",
            serde_json::Value::Null,
        );
        let store: &dyn ViolationStore = &client(&server).await;
        let err = store.persist(&violation).await.unwrap_err();
        assert_matches!(err, StoreError::Unavailable(_));
    }
}
