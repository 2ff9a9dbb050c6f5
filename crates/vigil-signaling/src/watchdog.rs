//! Grace-period watchdog.
//!
//! When a monitored client's signaling connection vanishes, its sessions are
//! not touched immediately — brief drops are normal. The watchdog scans the
//! hub's vacancy set and, once a room has been empty past the configured
//! grace period, hands the token to a pause callback. It only ever pauses;
//! escalation to `ended` is an explicit decision elsewhere.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vigil_core::ids::SessionToken;

use crate::hub::SignalingHub;

/// Scan cadence. Grace precision is bounded by this, which is fine — the
/// grace period itself is measured in seconds.
const SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// Watches the hub for rooms that lost their monitored client for longer
/// than the grace period.
pub struct GraceWatchdog {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl GraceWatchdog {
    /// Spawn the watchdog. `on_expired` runs once per expired session token.
    pub fn spawn<F>(hub: Arc<SignalingHub>, grace: Duration, on_expired: F) -> Self
    where
        F: Fn(SessionToken) + Send + Sync + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SCAN_INTERVAL);
            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for token in hub.take_expired_rooms(grace) {
                            info!(token = %token, "signaling grace period expired, pausing session");
                            on_expired(token);
                        }
                    }
                }
            }
        });
        Self { cancel, handle }
    }

    /// Stop the watchdog and wait for its task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}
