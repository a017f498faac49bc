//! Policy engine for circuit breaker trip and close decisions.

use crate::metrics::BreakerStats;

/// A policy that determines when to trip and close a circuit breaker.
///
/// Both methods see the counters after the current outcome has been applied.
pub trait BreakerPolicy: Send + Sync + 'static {
    /// Called after a countable failure while closed. Returning true opens
    /// the circuit.
    fn should_trip(&self, stats: &BreakerStats) -> bool;

    /// Called after a successful half-open trial. Returning true closes the
    /// circuit.
    fn should_close(&self, stats: &BreakerStats) -> bool;
}

/// Consecutive-count policy: trips after `failure_threshold` consecutive
/// countable failures and closes after `success_threshold` consecutive
/// successful trials.
#[derive(Debug, Clone, Copy)]
pub struct DefaultPolicy {
    failure_threshold: u64,
    success_threshold: u64,
}

impl DefaultPolicy {
    /// Creates a new default policy.
    pub fn new(failure_threshold: u64, success_threshold: u64) -> Self {
        Self {
            failure_threshold,
            success_threshold,
        }
    }

    /// Consecutive failures that trip the circuit.
    pub fn failure_threshold(&self) -> u64 {
        self.failure_threshold
    }

    /// Consecutive half-open successes that close the circuit.
    pub fn success_threshold(&self) -> u64 {
        self.success_threshold
    }
}

impl BreakerPolicy for DefaultPolicy {
    fn should_trip(&self, stats: &BreakerStats) -> bool {
        stats.consecutive_failures >= self.failure_threshold
    }

    fn should_close(&self, stats: &BreakerStats) -> bool {
        stats.consecutive_successes >= self.success_threshold
    }
}
