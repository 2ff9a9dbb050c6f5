//! Violation reporting.
//!
//! Ordering contract: the registry is updated and the violation broadcast
//! to the session room before persistence is attempted. Observers see the
//! violation in real time even when the record service is down; persistence
//! retries in the background with jittered backoff and, after the final
//! failure, the violation survives in the registry's recent ring.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use vigil_core::violation::Violation;
use vigil_registry::SessionRegistry;
use vigil_signaling::hub::SignalSink;
use vigil_signaling::message::SignalMessage;

use crate::errors::{MonitorError, StoreError};

/// Durable violation storage, implemented by the record-service client.
#[async_trait::async_trait]
pub trait ViolationStore: Send + Sync {
    /// Persist one violation.
    async fn persist(&self, violation: &Violation) -> Result<(), StoreError>;
}

/// Fans one violation out to the registry, the signaling room, and the store.
pub struct ViolationReporter {
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn SignalSink>,
    store: Arc<dyn ViolationStore>,
    retry_max: u32,
    retry_backoff: Duration,
}

impl ViolationReporter {
    /// Reporter persisting through `store` with up to `retry_max` attempts,
    /// `retry_backoff` apart (plus jitter).
    pub fn new(
        registry: Arc<SessionRegistry>,
        sink: Arc<dyn SignalSink>,
        store: Arc<dyn ViolationStore>,
        retry_max: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            registry,
            sink,
            store,
            retry_max,
            retry_backoff,
        }
    }

    /// Report one violation: record locally, broadcast, then persist in the
    /// background. Returns the persistence task handle so callers that need
    /// determinism (shutdown, tests) can await it.
    pub async fn report(&self, violation: Violation) -> Result<JoinHandle<()>, MonitorError> {
        self.registry.record_violation(&violation)?;
        counter!(
            "violations_total",
            "kind" => violation.kind.as_str(),
        )
        .increment(1);

        // Broadcast before persistence. A signaling failure is logged, not
        // fatal: the violation is already in the registry.
        let token = violation.session_token.clone();
        if let Err(e) = self
            .sink
            .publish(
                &token,
                SignalMessage::ProctoringViolation {
                    violation: violation.clone(),
                },
            )
            .await
        {
            warn!(error = %e, "failed to broadcast violation");
        }

        let store = Arc::clone(&self.store);
        let retry_max = self.retry_max;
        let backoff = self.retry_backoff;
        Ok(tokio::spawn(async move {
            persist_with_retry(store.as_ref(), &violation, retry_max, backoff).await;
        }))
    }
}

/// Try `persist` up to `retry_max` times with linear jittered backoff. The
/// final failure is logged and dropped; the in-memory copy is the fallback.
async fn persist_with_retry(
    store: &dyn ViolationStore,
    violation: &Violation,
    retry_max: u32,
    backoff: Duration,
) {
    let mut last_err: Option<StoreError> = None;
    for attempt in 1..=retry_max.max(1) {
        match store.persist(violation).await {
            Ok(()) => return,
            Err(e) => {
                warn!(
                    kind = violation.kind.as_str(),
                    attempt,
                    error = %e,
                    "violation persistence attempt failed"
                );
                last_err = Some(e);
                if attempt < retry_max {
                    tokio::time::sleep(backoff * attempt + jitter(backoff)).await;
                }
            }
        }
    }
    counter!("violation_persist_failures_total").increment(1);
    error!(
        token = %violation.session_token,
        kind = violation.kind.as_str(),
        error = %last_err.map_or_else(String::new, |e| e.to_string()),
        "violation persistence abandoned after retries"
    );
}

fn jitter(backoff: Duration) -> Duration {
    let cap = backoff.as_millis().max(1) as u64;
    Duration::from_millis(rand::rng().random_range(0..cap))
}
