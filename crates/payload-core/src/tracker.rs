//! # Correlation Tracker
//!
//! Holds outstanding requests keyed by correlation id and joins each inbound
//! response to the call that is waiting for it.
//!
//! Flow:
//! 1. Caller calls `register()` and gets a fresh id plus a [`WaitHandle`]
//! 2. Caller publishes the request carrying that id
//! 3. The inbound path calls `resolve()` with the response
//! 4. Caller awaits the handle until the response lands or the deadline passes
//!
//! Every pending entry ends in exactly one [`Settlement`]. Whoever removes
//! the entry from the live set (resolve, deadline, cancel or sweep) decides
//! which one; the others find it gone.

use crate::clock::millis;
use crate::settled::{SettledCache, Settlement};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use shared_types::{CorrelationId, DirectMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound on how far out a deadline is placed.
const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Errors returned to a waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// No response arrived before the deadline.
    #[error("No response for {correlation_id} within {timeout:?}")]
    TimedOut {
        correlation_id: CorrelationId,
        timeout: Duration,
    },
}

/// What happened to an inbound response handed to [`CorrelationTracker::resolve`].
///
/// None of these are errors. Late and duplicate deliveries are expected when
/// responses race deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolveOutcome {
    /// Delivered to the waiting caller.
    Completed,
    /// No pending request has this id, or its caller gave up. Dropped.
    UnknownCorrelation,
    /// The request already settled this way. Dropped.
    DuplicateResolution(Settlement),
}

/// A pending request waiting for its response.
struct PendingRequest {
    /// Channel to hand the response over
    sender: oneshot::Sender<DirectMessage>,
    /// When the request was registered
    created_at: Instant,
    /// When the caller stops waiting
    deadline: Instant,
}

/// Statistics for the tracker
#[derive(Debug, Default)]
pub struct TrackerStats {
    /// Total requests registered
    pub registered: AtomicU64,
    /// Total requests completed by a response
    pub completed: AtomicU64,
    /// Total requests that hit their deadline
    pub timed_out: AtomicU64,
    /// Total requests abandoned by their caller
    pub cancelled: AtomicU64,
    /// Inbound responses dropped as unknown or duplicate
    pub dropped: AtomicU64,
}

impl TrackerStats {
    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> TrackerStatsSnapshot {
        TrackerStatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`TrackerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStatsSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub dropped: u64,
}

struct TrackerInner {
    /// Live set: correlation id -> pending request
    pending: DashMap<CorrelationId, PendingRequest>,
    /// Recently settled ids
    settled: SettledCache,
    stats: TrackerStats,
}

impl TrackerInner {
    /// Remove `id` from the live set, settling it as `settlement`.
    ///
    /// The settlement is recorded while the entry is still locked, so a
    /// concurrent resolve never sees the id as neither pending nor settled.
    /// Returns `None` if something else already removed it.
    fn settle(&self, id: &CorrelationId, settlement: Settlement) -> Option<PendingRequest> {
        let Entry::Occupied(entry) = self.pending.entry(*id) else {
            return None;
        };
        self.settled.insert(*id, settlement);
        let (_, request) = entry.remove_entry();

        match settlement {
            Settlement::Completed => &self.stats.completed,
            Settlement::TimedOut => &self.stats.timed_out,
            Settlement::Cancelled => &self.stats.cancelled,
        }
        .fetch_add(1, Ordering::Relaxed);
        Some(request)
    }
}

/// Correlation tracker.
///
/// Cheap to clone; clones share the same live set.
#[derive(Clone)]
pub struct CorrelationTracker {
    inner: Arc<TrackerInner>,
}

impl CorrelationTracker {
    /// Create a tracker that remembers settled ids for `settled_retention`.
    pub fn new(settled_retention: Duration) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                pending: DashMap::new(),
                settled: SettledCache::new(settled_retention),
                stats: TrackerStats::default(),
            }),
        }
    }

    /// Register a pending request with a deadline `timeout` from now.
    ///
    /// Returns a fresh correlation id, unique among all pending entries, and
    /// the handle to wait on.
    pub fn register(&self, timeout: Duration) -> (CorrelationId, WaitHandle) {
        let (tx, rx) = oneshot::channel();
        let created_at = Instant::now();
        let deadline = created_at + timeout.min(MAX_TIMEOUT);

        let request = PendingRequest {
            sender: tx,
            created_at,
            deadline,
        };

        let correlation_id = loop {
            let candidate = CorrelationId::new();
            match self.inner.pending.entry(candidate) {
                Entry::Vacant(slot) => {
                    slot.insert(request);
                    break candidate;
                }
                Entry::Occupied(_) => {
                    warn!(correlation_id = %candidate, "Correlation id collision, regenerating");
                }
            }
        };

        self.inner.stats.registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            correlation_id = %correlation_id,
            timeout_ms = millis(timeout),
            "Registered pending request"
        );

        let handle = WaitHandle {
            correlation_id,
            timeout,
            deadline,
            receiver: Some(rx),
            inner: self.inner.clone(),
        };

        (correlation_id, handle)
    }

    /// Deliver a response to the request waiting on `correlation_id`.
    ///
    /// First resolution wins. Anything arriving after the request settled is
    /// dropped and reported through the returned outcome.
    pub fn resolve(&self, correlation_id: CorrelationId, response: DirectMessage) -> ResolveOutcome {
        let waiter_gone = self
            .inner
            .pending
            .get(&correlation_id)
            .map(|pending| pending.sender.is_closed());

        let settlement = match waiter_gone {
            Some(true) => Settlement::Cancelled,
            _ => Settlement::Completed,
        };

        let Some(pending) = self.inner.settle(&correlation_id, settlement) else {
            self.inner.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return match self.inner.settled.get(&correlation_id) {
                Some(Settlement::Cancelled) | None => {
                    debug!(
                        correlation_id = %correlation_id,
                        message_name = %response.message_name,
                        "Response for unknown correlation id dropped"
                    );
                    ResolveOutcome::UnknownCorrelation
                }
                Some(settlement) => {
                    debug!(
                        correlation_id = %correlation_id,
                        settled = %settlement,
                        "Response for already settled request dropped"
                    );
                    ResolveOutcome::DuplicateResolution(settlement)
                }
            };
        };

        if settlement == Settlement::Cancelled {
            self.inner.stats.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %correlation_id,
                "Pending request receiver dropped"
            );
            return ResolveOutcome::UnknownCorrelation;
        }

        let response_time = pending.created_at.elapsed();
        // The receiver can only vanish here if the waiter is dropped
        // mid-delivery; the request is settled either way.
        let _ = pending.sender.send(response);

        debug!(
            correlation_id = %correlation_id,
            response_time_ms = millis(response_time),
            "Completed pending request"
        );
        ResolveOutcome::Completed
    }

    /// Wait for the response to `handle`'s request.
    ///
    /// # Errors
    ///
    /// - `TrackerError::TimedOut` - The deadline passed first
    pub async fn wait(&self, handle: WaitHandle) -> Result<DirectMessage, TrackerError> {
        handle.wait().await
    }

    /// Abandon `handle`'s request.
    ///
    /// Returns true if the request was still pending. A response arriving
    /// later is treated as unknown.
    pub fn cancel(&self, handle: WaitHandle) -> bool {
        handle.cancel()
    }

    /// Remove requests whose deadline has passed, then purge settlements
    /// older than the retention window.
    ///
    /// Backstop for handles nobody awaits. Waiters on swept entries see
    /// `TimedOut`. Returns the number of pending requests removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<CorrelationId> = self
            .inner
            .pending
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| *entry.key())
            .collect();

        let mut removed = 0;
        for id in expired {
            if self.inner.settle(&id, Settlement::TimedOut).is_some() {
                warn!(correlation_id = %id, "Removing expired pending request");
                removed += 1;
            }
        }

        // No live-set entry is held here
        let purged = self.inner.settled.purge_expired();
        if purged > 0 {
            debug!(purged = purged, "Purged expired settlements");
        }
        removed
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Check if a correlation id is pending
    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.inner.pending.contains_key(correlation_id)
    }

    /// Number of settlements remembered, including expired ones not yet purged.
    pub fn settled_count(&self) -> usize {
        self.inner.settled.len()
    }

    /// How `correlation_id` settled, if it did so recently.
    pub fn settlement_of(&self, correlation_id: &CorrelationId) -> Option<Settlement> {
        self.inner.settled.get(correlation_id)
    }

    /// Get statistics
    pub fn stats(&self) -> &TrackerStats {
        &self.inner.stats
    }
}

impl Default for CorrelationTracker {
    fn default() -> Self {
        Self::new(SettledCache::DEFAULT_RETENTION)
    }
}

/// The caller's side of a pending request.
///
/// Dropping the handle before the request settles cancels it.
pub struct WaitHandle {
    correlation_id: CorrelationId,
    timeout: Duration,
    deadline: Instant,
    receiver: Option<oneshot::Receiver<DirectMessage>>,
    inner: Arc<TrackerInner>,
}

impl WaitHandle {
    /// Correlation id this handle waits on.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// When this handle stops waiting.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the response or the deadline, whichever comes first.
    ///
    /// # Errors
    ///
    /// - `TrackerError::TimedOut` - The deadline passed first
    pub async fn wait(mut self) -> Result<DirectMessage, TrackerError> {
        let timed_out = TrackerError::TimedOut {
            correlation_id: self.correlation_id,
            timeout: self.timeout,
        };
        let Some(mut receiver) = self.receiver.take() else {
            return Err(timed_out);
        };

        match tokio::time::timeout_at(self.deadline, &mut receiver).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped: the sweep settled us as timed out
            Ok(Err(_)) => Err(timed_out),
            Err(_) => {
                if self
                    .inner
                    .settle(&self.correlation_id, Settlement::TimedOut)
                    .is_some()
                {
                    debug!(
                        correlation_id = %self.correlation_id,
                        timeout_ms = millis(self.timeout),
                        "Pending request timed out"
                    );
                    return Err(timed_out);
                }
                // Lost the race: resolve or the sweep removed the entry
                // first and decides the outcome.
                receiver.await.map_err(|_| timed_out)
            }
        }
    }

    /// Abandon the request. Returns true if it was still pending.
    pub fn cancel(self) -> bool {
        let cancelled = self
            .inner
            .settle(&self.correlation_id, Settlement::Cancelled)
            .is_some();
        if cancelled {
            debug!(correlation_id = %self.correlation_id, "Pending request cancelled");
        }
        cancelled
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        // No-op once the request has settled
        if self
            .inner
            .settle(&self.correlation_id, Settlement::Cancelled)
            .is_some()
        {
            debug!(correlation_id = %self.correlation_id, "Wait handle dropped, request cancelled");
        }
    }
}

/// Background task that sweeps expired requests every `interval`.
pub async fn sweeper_task(tracker: CorrelationTracker, interval: Duration) {
    let mut sweep_interval = tokio::time::interval(interval);
    sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep_interval.tick().await;
        let removed = tracker.remove_expired();
        if removed > 0 {
            debug!(removed = removed, "Swept expired pending requests");
        }
    }
}
