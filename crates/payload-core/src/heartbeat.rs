//! # Heartbeat Registry
//!
//! Tracks the last pulse seen from every service and answers liveness and
//! discovery queries against a staleness window.
//!
//! Entries are never deleted. A service whose last pulse is older than the
//! window is simply not reported as online.

use crate::clock::{SystemTimeSource, TimeSource};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared_types::HeartbeatPulse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Liveness registry fed by heartbeat pulses.
pub struct HeartbeatRegistry {
    /// service id -> latest `observed_at` seen
    last_seen: RwLock<HashMap<String, DateTime<Utc>>>,
    /// Window used by queries that don't take one.
    default_window: Duration,
    clock: Arc<dyn TimeSource>,
    /// Woken on every recorded pulse.
    pulses: Notify,
}

impl HeartbeatRegistry {
    /// Registry on the system clock.
    pub fn new(default_window: Duration) -> Self {
        Self::with_time_source(default_window, Arc::new(SystemTimeSource))
    }

    /// Registry on an injected clock.
    pub fn with_time_source(default_window: Duration, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            last_seen: RwLock::new(HashMap::new()),
            default_window,
            clock,
            pulses: Notify::new(),
        }
    }

    /// Record a pulse.
    ///
    /// Pulses may arrive out of order; the most recent `observed_at` wins,
    /// so replaying an older pulse never moves a service backwards. A pulse
    /// stamped ahead of the local clock is recorded as seen now.
    pub fn record(&self, pulse: HeartbeatPulse) {
        let now = self.clock.now();
        let observed_at = if pulse.observed_at > now {
            debug!(
                service_id = %pulse.service_id,
                observed_at = %pulse.observed_at,
                "Heartbeat stamped in the future, clamping to now"
            );
            now
        } else {
            pulse.observed_at
        };

        {
            let mut entries = self.last_seen.write();
            let slot = entries
                .entry(pulse.service_id.clone())
                .or_insert(observed_at);
            if observed_at > *slot {
                *slot = observed_at;
            }
        }

        trace!(service_id = %pulse.service_id, observed_at = %observed_at, "Heartbeat recorded");
        self.pulses.notify_waiters();
    }

    /// True iff `service_id` has pulsed and its last pulse is no older than `window`.
    pub fn is_online(&self, service_id: &str, window: Duration) -> bool {
        let now = self.clock.now();
        self.last_seen
            .read()
            .get(service_id)
            .is_some_and(|seen| within(now, *seen, window))
    }

    /// All services online under `window`, sorted by id.
    pub fn list_online(&self, window: Duration) -> Vec<String> {
        let now = self.clock.now();
        let mut online: Vec<String> = self
            .last_seen
            .read()
            .iter()
            .filter(|(_, seen)| within(now, **seen, window))
            .map(|(id, _)| id.clone())
            .collect();
        online.sort();
        online
    }

    /// [`list_online`](Self::list_online) with the default window.
    pub fn list_online_default(&self) -> Vec<String> {
        self.list_online(self.default_window)
    }

    /// Online services whose id contains `pattern`, sorted by id.
    ///
    /// Prefix lookups are a special case (`"hostsvc-"`). Uses the default
    /// window.
    pub fn filter_by_pattern(&self, pattern: &str) -> Vec<String> {
        let mut matches = self.list_online_default();
        matches.retain(|id| id.contains(pattern));
        matches
    }

    /// Wait until some service matching `pattern` is online.
    ///
    /// Returns the first matching id (sorted order), or `None` when
    /// `timeout` passes first. A timeout too large to place on the clock
    /// waits without a deadline.
    pub async fn wait_for_service(&self, pattern: &str, timeout: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now().checked_add(timeout);

        loop {
            // Register interest before checking so a pulse recorded in
            // between is not missed.
            let notified = self.pulses.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(found) = self.filter_by_pattern(pattern).into_iter().next() {
                debug!(pattern = pattern, service_id = %found, "Service discovered");
                return Some(found);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        debug!(pattern = pattern, "No matching service before deadline");
                        return None;
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Latest pulse time recorded for `service_id`, stale or not.
    pub fn last_seen(&self, service_id: &str) -> Option<DateTime<Utc>> {
        self.last_seen.read().get(service_id).copied()
    }

    /// Window used by [`list_online_default`](Self::list_online_default)
    /// and [`filter_by_pattern`](Self::filter_by_pattern).
    pub fn default_window(&self) -> Duration {
        self.default_window
    }

    /// Number of services ever seen.
    pub fn len(&self) -> usize {
        self.last_seen.read().len()
    }

    /// True if no pulse has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.last_seen.read().is_empty()
    }
}

/// `now - seen <= window`. `seen` is only ahead of `now` if the clock
/// stepped back, which counts as fresh.
fn within(now: DateTime<Utc>, seen: DateTime<Utc>, window: Duration) -> bool {
    match now.signed_duration_since(seen).to_std() {
        Ok(age) => age <= window,
        Err(_) => true,
    }
}
