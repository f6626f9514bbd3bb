//! # Settled Correlation Cache
//!
//! Remembers how recently finished requests ended, for a bounded time, so a
//! late or duplicate response can be told apart from one that never had a
//! pending request.
//!
//! Entries stop being reported once the retention window passes and are
//! dropped by [`SettledCache::purge_expired`], which the tracker's sweep
//! calls. Inserts never scan the map.

use dashmap::DashMap;
use serde::Serialize;
use shared_types::CorrelationId;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Terminal state of a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Settlement {
    /// A matching response was delivered.
    Completed,
    /// The deadline passed first.
    TimedOut,
    /// The caller gave up first.
    Cancelled,
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Settlement::Completed => write!(f, "completed"),
            Settlement::TimedOut => write!(f, "timed_out"),
            Settlement::Cancelled => write!(f, "cancelled"),
        }
    }
}

struct Entry {
    settlement: Settlement,
    settled_at: Instant,
}

/// Time-bounded map of correlation id to [`Settlement`].
///
/// Sharded, so ids in different shards never contend.
pub struct SettledCache {
    entries: DashMap<CorrelationId, Entry>,
    retention: Duration,
}

impl SettledCache {
    /// Default retention.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(120);

    /// Create a cache keeping entries for `retention`.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
        }
    }

    /// Record how `id` settled.
    ///
    /// The first settlement sticks; a terminal state is never overwritten.
    pub fn insert(&self, id: CorrelationId, settlement: Settlement) {
        self.entries.entry(id).or_insert(Entry {
            settlement,
            settled_at: Instant::now(),
        });
    }

    /// How `id` settled, if it did so within the retention window.
    pub fn get(&self, id: &CorrelationId) -> Option<Settlement> {
        let now = Instant::now();
        self.entries
            .get(id)
            .filter(|entry| now.duration_since(entry.settled_at) <= self.retention)
            .map(|entry| entry.settlement)
    }

    /// Drop entries older than the retention window. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.settled_at) <= self.retention);
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SettledCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETENTION)
    }
}
