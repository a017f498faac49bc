//! Introspection snapshots and the metric sink interface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use crate::fetcher::Freshness;
use crate::state::{State, Transition};

/// How a guarded call ended, from the breaker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The operation succeeded.
    Success,
    /// The operation failed with a countable error, or was abandoned.
    Failure,
    /// The operation failed with an error the classifier does not count.
    Ignored,
}

impl CallOutcome {
    /// Short lowercase label, suitable for metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Failure => "failure",
            CallOutcome::Ignored => "ignored",
        }
    }
}

/// Trait for metrics sinks that can receive breaker and fetcher events.
///
/// Sinks are invoked after the breaker's lock is released.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a state transition.
    ///
    /// Transitions are delivered after the breaker's lock is released, so
    /// concurrent transitions may arrive out of order. Track the current
    /// state through [`record_state`](Self::record_state) instead.
    fn record_transition(&self, transition: Transition);

    /// Records the breaker's state as of `generation`.
    ///
    /// `generation` increases with every state entry and reset. A report
    /// with a generation lower than one already seen is stale.
    fn record_state(&self, _state: State, _generation: u64) {}

    /// Records a call that was admitted and has finished.
    fn record_call(&self, outcome: CallOutcome, duration: Duration);

    /// Records a call rejected without invoking the operation.
    fn record_rejection(&self);

    /// Records the outcome of a fetch.
    fn record_fetch(&self, freshness: Freshness);
}

/// A null metrics sink that discards all events.
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_transition(&self, _transition: Transition) {}
    fn record_call(&self, _outcome: CallOutcome, _duration: Duration) {}
    fn record_rejection(&self) {}
    fn record_fetch(&self, _freshness: Freshness) {}
}

/// A consistent snapshot of a breaker's state and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStats {
    /// Current state.
    pub state: State,
    /// Countable failures since the breaker last entered closed or half-open.
    pub consecutive_failures: u64,
    /// Successful trials since the breaker entered half-open.
    pub consecutive_successes: u64,
    /// Lifetime countable failures (including abandoned calls).
    pub total_failures: u64,
    /// Lifetime successes.
    pub total_successes: u64,
    /// Lifetime failures the classifier did not count.
    pub total_ignored: u64,
    /// Lifetime calls rejected while open.
    pub total_rejected: u64,
    /// Number of closed → open trips.
    pub times_opened: u64,
    /// Monotonic time of the most recent recorded failure.
    pub last_failure_at: Option<Instant>,
    /// Wall-clock time of the most recent recorded failure.
    pub last_failure_time: Option<SystemTime>,
    /// Monotonic time the breaker last entered open.
    pub last_opened_at: Option<Instant>,
    /// Wall-clock time the breaker last entered open.
    pub last_opened_time: Option<SystemTime>,
}

impl Default for BreakerStats {
    fn default() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_failures: 0,
            total_successes: 0,
            total_ignored: 0,
            total_rejected: 0,
            times_opened: 0,
            last_failure_at: None,
            last_failure_time: None,
            last_opened_at: None,
            last_opened_time: None,
        }
    }
}

impl BreakerStats {
    /// Fraction of counted calls that failed; 0.0 before any call.
    pub fn error_rate(&self) -> f64 {
        let total = self.total_failures + self.total_successes;
        if total == 0 {
            return 0.0;
        }

        self.total_failures as f64 / total as f64
    }
}

/// Per-fetcher outcome counters.
#[derive(Debug, Default)]
pub(crate) struct FetchCounters {
    fresh: AtomicU64,
    stale: AtomicU64,
    unavailable: AtomicU64,
}

impl FetchCounters {
    pub(crate) fn record(&self, freshness: Freshness) {
        let counter = match freshness {
            Freshness::Fresh => &self.fresh,
            Freshness::Stale => &self.stale,
            Freshness::Unavailable => &self.unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, cached_entries: usize, breaker: BreakerStats) -> FetchStats {
        FetchStats {
            fresh: self.fresh.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            cached_entries,
            breaker,
        }
    }
}

/// Snapshot of a fetcher's outcome counters, for a metrics or health endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchStats {
    /// Fetches answered by the live dependency.
    pub fresh: u64,
    /// Fetches answered from the cache.
    pub stale: u64,
    /// Fetches with neither a live answer nor a cached value.
    pub unavailable: u64,
    /// Number of keys currently cached.
    pub cached_entries: usize,
    /// The guarding breaker's snapshot.
    pub breaker: BreakerStats,
}

impl FetchStats {
    /// Total fetches served.
    pub fn total(&self) -> u64 {
        self.fresh + self.stale + self.unavailable
    }
}
