//! Per-session monitoring loops.
//!
//! One task per monitored session, ticking on a fixed interval: sample,
//! classify, rate-limit, report, refresh the registry's live status. A tick
//! overrunning the interval delays the next tick rather than stacking.
//!
//! Start is idempotent per token. Stop cancels the task and awaits it, so
//! when [`MonitoringLoop::stop`] returns no further tick for that session
//! can run and the sampler has been released.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_core::config::EngineConfig;
use vigil_core::ids::SessionToken;
use vigil_core::policy::MonitoringPolicy;
use vigil_registry::{RegistryError, SessionRegistry};

use crate::classifier::{ClassifierState, classify};
use crate::errors::MonitorError;
use crate::rate_limit::RateLimiter;
use crate::reporter::ViolationReporter;
use crate::sampler::ComplianceSampler;

struct RunningSession {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Starts and stops per-session monitoring tasks.
pub struct MonitoringLoop {
    config: EngineConfig,
    registry: Arc<SessionRegistry>,
    reporter: Arc<ViolationReporter>,
    running: Mutex<HashMap<SessionToken, RunningSession>>,
}

impl MonitoringLoop {
    /// Loop manager ticking at the configured interval.
    pub fn new(
        config: EngineConfig,
        registry: Arc<SessionRegistry>,
        reporter: Arc<ViolationReporter>,
    ) -> Self {
        Self {
            config,
            registry,
            reporter,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Start monitoring a session. Returns `Ok(false)` if a loop for this
    /// token is already running. The sampler's devices are acquired before
    /// the task starts; an acquisition failure fails the whole start and
    /// leaves nothing running.
    pub async fn start(
        &self,
        token: SessionToken,
        policy: MonitoringPolicy,
        sampler: Arc<dyn ComplianceSampler>,
    ) -> Result<bool, MonitorError> {
        if self.running.lock().contains_key(&token) {
            return Ok(false);
        }
        if self.registry.get(&token).is_none() {
            return Err(RegistryError::UnknownSession(token).into());
        }

        sampler.acquire().await?;

        let cancel = CancellationToken::new();
        let mut running = self.running.lock();
        // Re-check under the lock; a concurrent start may have won the race
        // while we were acquiring devices.
        if running.contains_key(&token) {
            drop(running);
            sampler.release().await;
            return Ok(false);
        }

        let handle = tokio::spawn(run_session(
            token.clone(),
            policy,
            sampler,
            self.config.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.reporter),
            cancel.clone(),
        ));
        let _ = running.insert(token.clone(), RunningSession { cancel, handle });
        gauge!("monitor_loops_active").set(running.len() as f64);
        drop(running);

        info!(token = %token, "monitoring started");
        Ok(true)
    }

    /// Stop a session's loop and wait for its task to finish.
    pub async fn stop(&self, token: &SessionToken) -> Result<(), MonitorError> {
        let entry = {
            let mut running = self.running.lock();
            let entry = running.remove(token);
            gauge!("monitor_loops_active").set(running.len() as f64);
            entry
        };
        let Some(entry) = entry else {
            return Err(MonitorError::NotRunning(token.clone()));
        };
        entry.cancel.cancel();
        if let Err(e) = entry.handle.await {
            warn!(token = %token, error = %e, "monitoring task panicked");
        }
        info!(token = %token, "monitoring stopped");
        Ok(())
    }

    /// Stop every running loop, awaiting each task.
    pub async fn stop_all(&self) {
        let entries: Vec<(SessionToken, RunningSession)> = {
            let mut running = self.running.lock();
            let drained = running.drain().collect();
            gauge!("monitor_loops_active").set(0.0);
            drained
        };
        for (token, entry) in entries {
            entry.cancel.cancel();
            if let Err(e) = entry.handle.await {
                warn!(token = %token, error = %e, "monitoring task panicked");
            }
        }
    }

    /// Whether a loop is running for this token.
    pub fn is_running(&self, token: &SessionToken) -> bool {
        self.running.lock().contains_key(token)
    }

    /// Number of running loops.
    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }
}

async fn run_session(
    token: SessionToken,
    policy: MonitoringPolicy,
    sampler: Arc<dyn ComplianceSampler>,
    config: EngineConfig,
    registry: Arc<SessionRegistry>,
    reporter: Arc<ViolationReporter>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut state = ClassifierState::default();
    let mut limiter = RateLimiter::new(config.rate_limit_window());

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                tick(&token, &policy, sampler.as_ref(), &registry, &reporter,
                    &mut state, &mut limiter).await;
            }
        }
    }
    sampler.release().await;
}

async fn tick(
    token: &SessionToken,
    policy: &MonitoringPolicy,
    sampler: &dyn ComplianceSampler,
    registry: &SessionRegistry,
    reporter: &ViolationReporter,
    state: &mut ClassifierState,
    limiter: &mut RateLimiter,
) {
    let snapshot = match sampler.sample(policy).await {
        Ok(s) => s,
        Err(e) => {
            // Skip this tick entirely; the next one retries.
            warn!(token = %token, error = %e, "sampling failed");
            return;
        }
    };

    let outcome = classify(token, &snapshot, policy, state);
    for violation in outcome.violations {
        if limiter.admit(&violation) {
            if let Err(e) = reporter.report(violation).await {
                warn!(token = %token, error = %e, "failed to report violation");
            }
        }
    }
    for kind in outcome.resolved {
        registry.resolve_violation(token, kind);
        limiter.clear(kind);
    }
    registry.set_live_status(token, snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use assert_matches::assert_matches;

    use vigil_core::ids::{AssessmentId, CandidateId};
    use vigil_core::snapshot::DetectionReadings;
    use vigil_core::violation::ViolationKind;
    use vigil_signaling::hub::SignalSink;

    use crate::errors::SamplerError;
    use crate::reporter::ViolationStore;
    use crate::reporter::test_support::{FlakyStore, RecordingSink};
    use crate::sampler::test_support::{FixedProbe, ScriptedDetection};
    use crate::sampler::{DeviceSampler, EnvironmentReading};

    struct Harness {
        monitor: MonitoringLoop,
        registry: Arc<SessionRegistry>,
        sink: Arc<RecordingSink>,
    }

    fn harness() -> Harness {
        let config = EngineConfig {
            tick_interval_ms: 100,
            rate_limit_window_ms: 1_000,
            ..EngineConfig::default()
        };
        let registry = Arc::new(SessionRegistry::new(50));
        let sink = Arc::new(RecordingSink::default());
        let reporter = Arc::new(ViolationReporter::new(
            Arc::clone(&registry),
            Arc::clone(&sink) as Arc<dyn SignalSink>,
            Arc::new(FlakyStore::new(0)) as Arc<dyn ViolationStore>,
            1,
            Duration::from_millis(1),
        ));
        Harness {
            monitor: MonitoringLoop::new(config, Arc::clone(&registry), reporter),
            registry,
            sink,
        }
    }

    fn open(h: &Harness, raw: &str) -> SessionToken {
        let t = SessionToken::new(raw);
        let _ = h.registry.open(
            t.clone(),
            CandidateId::new("cand-1"),
            AssessmentId::new("assess-1"),
        );
        t
    }

    fn reading(is_fullscreen: bool) -> EnvironmentReading {
        EnvironmentReading {
            is_fullscreen,
            camera_level: 80,
            microphone_level: 50,
            speaker_level: 40,
        }
    }

    fn compliant_sampler() -> Arc<dyn ComplianceSampler> {
        Arc::new(DeviceSampler::new(
            FixedProbe::ok(reading(true)),
            ScriptedDetection::always(DetectionReadings::attentive()),
        ))
    }

    async fn run_ticks(n: u32) {
        // Paused clock: sleeping past n intervals runs exactly those ticks.
        tokio::time::sleep(Duration::from_millis(u64::from(n) * 100 + 10)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_per_token() {
        let h = harness();
        let t = open(&h, "tok-1");
        assert!(h.monitor.start(t.clone(), MonitoringPolicy::default(), compliant_sampler())
            .await
            .unwrap());
        assert!(!h
            .monitor
            .start(t.clone(), MonitoringPolicy::default(), compliant_sampler())
            .await
            .unwrap());
        assert_eq!(h.monitor.running_count(), 1);
        h.monitor.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_session_cannot_start() {
        let h = harness();
        let err = h
            .monitor
            .start(
                SessionToken::new("ghost"),
                MonitoringPolicy::default(),
                compliant_sampler(),
            )
            .await
            .unwrap_err();
        assert_matches!(err, MonitorError::Registry(RegistryError::UnknownSession(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn device_failure_fails_start_with_remediation() {
        let h = harness();
        let t = open(&h, "tok-1");
        let probe = FixedProbe {
            fail_acquire: true,
            ..FixedProbe::ok(reading(true))
        };
        let sampler = Arc::new(DeviceSampler::new(
            probe,
            ScriptedDetection::always(DetectionReadings::attentive()),
        ));
        let err = h
            .monitor
            .start(t.clone(), MonitoringPolicy::default(), sampler)
            .await
            .unwrap_err();
        assert_matches!(err, MonitorError::Sampler(SamplerError::DeviceAccess { .. }));
        assert!(!h.monitor.is_running(&t));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_report_violations_and_update_live_status() {
        let h = harness();
        let t = open(&h, "tok-1");
        let policy = MonitoringPolicy {
            require_fullscreen: true,
            ..MonitoringPolicy::default()
        };
        let sampler = Arc::new(DeviceSampler::new(
            FixedProbe::ok(reading(false)),
            ScriptedDetection::always(DetectionReadings::attentive()),
        ));
        assert!(h.monitor.start(t.clone(), policy, sampler).await.unwrap());

        run_ticks(2).await;
        h.monitor.stop(&t).await.unwrap();

        let session = h.registry.get(&t).unwrap();
        assert!(session.violation_count >= 1);
        assert!(session.live_status.is_some());
        assert!(!session.live_status.unwrap().is_fullscreen);
        assert!(
            h.sink
                .published
                .lock()
                .iter()
                .any(|(_, m)| m.kind() == "proctoring-violation")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_condition_is_rate_limited() {
        let h = harness();
        let t = open(&h, "tok-1");
        let policy = MonitoringPolicy {
            require_fullscreen: true,
            ..MonitoringPolicy::default()
        };
        let sampler = Arc::new(DeviceSampler::new(
            FixedProbe::ok(reading(false)),
            ScriptedDetection::always(DetectionReadings::attentive()),
        ));
        assert!(h.monitor.start(t.clone(), policy, sampler).await.unwrap());

        // Five ticks inside one 1s window: one emission.
        run_ticks(5).await;
        h.monitor.stop(&t).await.unwrap();

        let published = h.sink.published.lock();
        let fullscreen_events = published
            .iter()
            .filter(|(_, m)| m.kind() == "proctoring-violation")
            .count();
        assert_eq!(fullscreen_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn detection_failure_keeps_environment_checks_running() {
        let h = harness();
        let t = open(&h, "tok-1");
        let policy = MonitoringPolicy {
            require_fullscreen: true,
            ..MonitoringPolicy::default()
        };
        // Detection always fails; the environment probe reports a fullscreen
        // exit that must still be caught.
        let sampler = Arc::new(DeviceSampler::new(
            FixedProbe::ok(reading(false)),
            ScriptedDetection::new(vec![Err(SamplerError::Detection("model crashed".into()))]),
        ));
        assert!(h.monitor.start(t.clone(), policy, sampler).await.unwrap());

        run_ticks(2).await;
        h.monitor.stop(&t).await.unwrap();

        let session = h.registry.get(&t).unwrap();
        let kinds = h.registry.active_kinds(&t);
        assert!(kinds.contains(&ViolationKind::FullscreenExited));
        assert!(!kinds.contains(&ViolationKind::NoFaceDetected));
        assert!(session.live_status.unwrap().detection.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_clears_active_kind_after_clean_tick() {
        let h = harness();
        let t = open(&h, "tok-1");
        let policy = MonitoringPolicy {
            require_fullscreen: true,
            ..MonitoringPolicy::default()
        };
        let probe = FixedProbe::ok(reading(true));
        // First the condition, then recovery by direct registry injection:
        // simulate with a violating snapshot recorded manually.
        h.registry
            .record_violation(&vigil_core::violation::Violation::new(
                t.clone(),
                ViolationKind::FullscreenExited,
                "left fullscreen",
                serde_json::Value::Null,
            ))
            .unwrap();
        assert!(h.registry.active_kinds(&t).contains(&ViolationKind::FullscreenExited));

        let sampler = Arc::new(DeviceSampler::new(
            probe,
            ScriptedDetection::always(DetectionReadings::attentive()),
        ));
        assert!(h.monitor.start(t.clone(), policy, sampler).await.unwrap());
        run_ticks(2).await;
        h.monitor.stop(&t).await.unwrap();

        // Clean fullscreen ticks resolved the active key.
        assert!(!h.registry.active_kinds(&t).contains(&ViolationKind::FullscreenExited));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_deterministic_and_releases_devices() {
        let h = harness();
        let t = open(&h, "tok-1");
        let probe = FixedProbe::ok(reading(true));
        let released = Arc::clone(&probe.released);
        let sampler = Arc::new(DeviceSampler::new(
            probe,
            ScriptedDetection::always(DetectionReadings::attentive()),
        ));
        assert!(h
            .monitor
            .start(t.clone(), MonitoringPolicy::default(), sampler)
            .await
            .unwrap());
        run_ticks(1).await;

        h.monitor.stop(&t).await.unwrap();
        assert!(released.load(Ordering::SeqCst));
        assert!(!h.monitor.is_running(&t));

        let before = h.sink.published.lock().len();
        run_ticks(3).await;
        assert_eq!(h.sink.published.lock().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_unknown_loop_errors() {
        let h = harness();
        let err = h.monitor.stop(&SessionToken::new("ghost")).await.unwrap_err();
        assert_matches!(err, MonitorError::NotRunning(_));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_stops_everything() {
        let h = harness();
        for raw in ["tok-1", "tok-2", "tok-3"] {
            let t = open(&h, raw);
            assert!(h
                .monitor
                .start(t, MonitoringPolicy::default(), compliant_sampler())
                .await
                .unwrap());
        }
        assert_eq!(h.monitor.running_count(), 3);
        h.monitor.stop_all().await;
        assert_eq!(h.monitor.running_count(), 0);
    }
}
