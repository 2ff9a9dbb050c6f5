//! Shared server state.

use std::collections::HashMap;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;

use vigil_core::config::EngineConfig;
use vigil_core::ids::AssessmentId;
use vigil_core::policy::MonitoringPolicy;
use vigil_registry::SessionRegistry;
use vigil_signaling::hub::SignalingHub;

/// Everything the route handlers and the socket loop share.
pub struct AppState {
    /// Engine configuration.
    pub config: EngineConfig,
    /// The authoritative session registry.
    pub registry: Arc<SessionRegistry>,
    /// Signaling fan-out.
    pub hub: Arc<SignalingHub>,
    /// Per-assessment monitoring policies. Assessments without an entry get
    /// the default policy.
    policies: Mutex<HashMap<AssessmentId, MonitoringPolicy>>,
    /// Renders the `/metrics` endpoint.
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Assemble the shared state.
    pub fn new(
        config: EngineConfig,
        registry: Arc<SessionRegistry>,
        hub: Arc<SignalingHub>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config,
            registry,
            hub,
            policies: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Register an assessment's monitoring policy.
    pub fn set_policy(&self, assessment: AssessmentId, policy: MonitoringPolicy) {
        let _ = self.policies.lock().insert(assessment, policy);
    }

    /// The policy for an assessment, defaulted when none is registered.
    pub fn policy(&self, assessment: &AssessmentId) -> MonitoringPolicy {
        self.policies
            .lock()
            .get(assessment)
            .cloned()
            .unwrap_or_default()
    }
}
