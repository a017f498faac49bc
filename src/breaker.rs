//! Core circuit breaker implementation.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::classifier::FailureClassifier;
use crate::clock::Clock;
use crate::config::BreakerBuilder;
use crate::error::{BreakerError, BreakerResult};
use crate::hook::HookRegistry;
use crate::metrics::{BreakerStats, CallOutcome, MetricSink};
use crate::policy::{BreakerPolicy, DefaultPolicy};
use crate::state::{recompute_state, State, Transition};

/// Mutable breaker state. Every admission and every outcome is applied to it
/// in a single critical section.
#[derive(Debug, Default)]
struct Core {
    stats: BreakerStats,
    trial_in_flight: bool,
    /// Bumped on every state entry and on reset. Outcomes of calls admitted
    /// under an older generation only touch lifetime totals.
    generation: u64,
}

impl Core {
    fn refresh(&mut self, now: Instant, recovery_timeout: Duration) -> Option<Transition> {
        let next = recompute_state(
            self.stats.state,
            self.stats.last_failure_at,
            now,
            recovery_timeout,
        );
        if next == self.stats.state {
            return None;
        }

        Some(self.enter(next))
    }

    fn enter(&mut self, to: State) -> Transition {
        let from = self.stats.state;
        self.stats.state = to;
        self.stats.consecutive_successes = 0;
        if to == State::Open {
            // Every path into open stamps the failure time first.
            self.stats.last_opened_at = self.stats.last_failure_at;
            self.stats.last_opened_time = self.stats.last_failure_time;
        } else {
            self.stats.consecutive_failures = 0;
        }
        self.trial_in_flight = false;
        self.generation = self.generation.wrapping_add(1);

        Transition { from, to }
    }
}

/// Inner state of the circuit breaker, shared between handles.
struct BreakerInner<E, P> {
    core: Mutex<Core>,
    policy: P,
    recovery_timeout: Duration,
    classifier: Arc<dyn FailureClassifier<E>>,
    clock: Arc<dyn Clock>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

impl<E, P: BreakerPolicy> BreakerInner<E, P> {
    /// Applies a finished call's outcome. Returns the transition it caused.
    fn apply(&self, core: &mut Core, generation: u64, outcome: CallOutcome) -> Option<Transition> {
        match outcome {
            CallOutcome::Success => core.stats.total_successes += 1,
            CallOutcome::Failure => core.stats.total_failures += 1,
            CallOutcome::Ignored => core.stats.total_ignored += 1,
        }
        if core.generation != generation {
            return None;
        }

        match (outcome, core.stats.state) {
            (CallOutcome::Success, State::Closed) => {
                core.stats.consecutive_failures = 0;
                None
            }
            (CallOutcome::Success, State::HalfOpen) => {
                core.stats.consecutive_successes += 1;
                self.policy
                    .should_close(&core.stats)
                    .then(|| core.enter(State::Closed))
            }
            (CallOutcome::Failure, state) => {
                core.stats.consecutive_failures += 1;
                core.stats.last_failure_at = Some(self.clock.now());
                core.stats.last_failure_time = Some(self.clock.system_time());
                match state {
                    State::Closed if self.policy.should_trip(&core.stats) => {
                        core.stats.times_opened += 1;
                        Some(core.enter(State::Open))
                    }
                    State::HalfOpen => Some(core.enter(State::Open)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// A circuit breaker guarding calls to one downstream dependency.
///
/// Handles are cheap to clone and share the same state.
pub struct CircuitBreaker<E, P = DefaultPolicy>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    inner: Arc<BreakerInner<E, P>>,
}

impl<E> CircuitBreaker<E, DefaultPolicy>
where
    E: std::error::Error + 'static,
{
    /// Creates a new builder for customizing a circuit breaker.
    pub fn builder() -> BreakerBuilder<E, DefaultPolicy> {
        BreakerBuilder::new()
    }
}

impl<E, P> CircuitBreaker<E, P>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    pub(crate) fn new(
        policy: P,
        recovery_timeout: Duration,
        classifier: Arc<dyn FailureClassifier<E>>,
        clock: Arc<dyn Clock>,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        let inner = BreakerInner {
            core: Mutex::new(Core::default()),
            policy,
            recovery_timeout,
            classifier,
            clock,
            metric_sink,
            hooks,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Gets the current state, applying any pending open → half-open move.
    pub fn state(&self) -> State {
        self.stats().state
    }

    /// Gets a consistent snapshot of the state and counters.
    pub fn stats(&self) -> BreakerStats {
        let now = self.inner.clock.now();
        let (transition, stats, generation) = {
            let mut core = self.inner.core.lock();
            let transition = core.refresh(now, self.inner.recovery_timeout);
            (transition, core.stats, core.generation)
        };

        if let Some(transition) = transition {
            self.announce(transition, &stats, generation);
        }
        stats
    }

    /// The breaker's policy.
    pub fn policy(&self) -> &P {
        &self.inner.policy
    }

    /// Minimum time the breaker stays open before admitting a trial call.
    pub fn recovery_timeout(&self) -> Duration {
        self.inner.recovery_timeout
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub(crate) fn metric_sink(&self) -> &Arc<dyn MetricSink> {
        &self.inner.metric_sink
    }

    /// Executes a function wrapped by the circuit breaker.
    ///
    /// Returns [`BreakerError::Open`] without invoking `f` while the circuit
    /// is open or a half-open trial is already in flight. Otherwise `f` runs
    /// exactly once and its error, if any, is returned as
    /// [`BreakerError::Operation`].
    pub fn call<F, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let permit = self.acquire()?;
        let result = f();
        permit.settle(&result);

        result.map_err(BreakerError::Operation)
    }

    /// Forces the breaker back to closed and zeroes every counter.
    pub fn reset(&self) {
        let (transition, stats, generation) = {
            let mut core = self.inner.core.lock();
            let from = core.stats.state;
            core.stats = BreakerStats::default();
            core.trial_in_flight = false;
            core.generation = core.generation.wrapping_add(1);
            let transition = (from != State::Closed).then_some(Transition {
                from,
                to: State::Closed,
            });
            (transition, core.stats, core.generation)
        };

        info!("circuit breaker reset");
        if let Some(transition) = transition {
            self.announce(transition, &stats, generation);
        }
    }

    /// Forces the breaker open. The recovery timeout starts now.
    ///
    /// Returns false if it was already open.
    pub fn force_open(&self) -> bool {
        let now = self.inner.clock.now();
        let wall = self.inner.clock.system_time();
        let (transition, stats, generation) = {
            let mut core = self.inner.core.lock();
            if core.stats.state == State::Open {
                return false;
            }
            core.stats.last_failure_at = Some(now);
            core.stats.last_failure_time = Some(wall);
            let transition = core.enter(State::Open);
            (transition, core.stats, core.generation)
        };

        self.announce(transition, &stats, generation);
        true
    }

    /// Decides whether a call may run.
    fn acquire(&self) -> Result<Permit<'_, E, P>, BreakerError<E>> {
        let now = self.inner.clock.now();
        let (trial, transition, stats, generation) = {
            let mut core = self.inner.core.lock();
            let transition = core.refresh(now, self.inner.recovery_timeout);
            let trial = match core.stats.state {
                State::Closed => Some(false),
                State::HalfOpen if !core.trial_in_flight => {
                    core.trial_in_flight = true;
                    Some(true)
                }
                State::HalfOpen | State::Open => {
                    core.stats.total_rejected += 1;
                    None
                }
            };
            (trial, transition, core.stats, core.generation)
        };

        if let Some(transition) = transition {
            self.announce(transition, &stats, generation);
        }

        match trial {
            Some(trial) => Ok(Permit {
                breaker: self,
                generation,
                trial,
                started: Instant::now(),
                settled: false,
            }),
            None => {
                debug!(state = %stats.state, "circuit breaker rejected call");
                self.inner.metric_sink.record_rejection();
                self.inner.hooks.execute_rejected_hook();
                Err(BreakerError::Open)
            }
        }
    }

    /// Records a finished (or abandoned) call.
    fn record(&self, generation: u64, trial: bool, outcome: CallOutcome, duration: Duration) {
        let (transition, stats, current) = {
            let mut core = self.inner.core.lock();
            if trial && core.generation == generation {
                core.trial_in_flight = false;
            }
            let transition = self.inner.apply(&mut core, generation, outcome);
            (transition, core.stats, core.generation)
        };

        self.inner.metric_sink.record_call(outcome, duration);
        match outcome {
            CallOutcome::Success => self.inner.hooks.execute_success_hook(),
            CallOutcome::Failure => self.inner.hooks.execute_failure_hook(),
            CallOutcome::Ignored => {}
        }
        if let Some(transition) = transition {
            self.announce(transition, &stats, current);
        }
    }

    fn announce(&self, transition: Transition, stats: &BreakerStats, generation: u64) {
        match transition.to {
            State::Open => warn!(
                from = %transition.from,
                consecutive_failures = stats.consecutive_failures,
                times_opened = stats.times_opened,
                "circuit breaker opened"
            ),
            State::HalfOpen => info!(from = %transition.from, "circuit breaker half-open"),
            State::Closed => info!(from = %transition.from, "circuit breaker closed"),
        }

        self.inner.metric_sink.record_transition(transition);
        self.inner.metric_sink.record_state(stats.state, generation);
        self.inner.hooks.execute_transition_hook(transition);
    }
}

/// Admission for one guarded call. Dropping it unsettled, because the
/// operation panicked or its future was dropped, records a countable failure.
struct Permit<'a, E, P>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    breaker: &'a CircuitBreaker<E, P>,
    generation: u64,
    trial: bool,
    started: Instant,
    settled: bool,
}

impl<E, P> Permit<'_, E, P>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    fn settle<T>(mut self, result: &Result<T, E>) {
        // The classifier is user code; until it returns, a panic must still
        // reach `Drop` as an abandoned call.
        let outcome = match result {
            Ok(_) => CallOutcome::Success,
            Err(e) if self.breaker.inner.classifier.is_countable(e) => CallOutcome::Failure,
            Err(_) => CallOutcome::Ignored,
        };
        self.settled = true;
        self.breaker
            .record(self.generation, self.trial, outcome, self.started.elapsed());
    }
}

impl<E, P> Drop for Permit<'_, E, P>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    fn drop(&mut self) {
        if !self.settled {
            warn!(trial = self.trial, "guarded call abandoned before completion");
            self.breaker.record(
                self.generation,
                self.trial,
                CallOutcome::Failure,
                self.started.elapsed(),
            );
        }
    }
}

// Handles share one breaker.
impl<E, P> Clone for CircuitBreaker<E, P>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, P> fmt::Debug for CircuitBreaker<E, P>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.inner.core.lock().stats;
        f.debug_struct("CircuitBreaker")
            .field("state", &stats.state)
            .field("consecutive_failures", &stats.consecutive_failures)
            .field("recovery_timeout", &self.inner.recovery_timeout)
            .finish()
    }
}

#[cfg(feature = "async")]
impl<E, P> CircuitBreaker<E, P>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    /// Executes an async function wrapped by the circuit breaker.
    ///
    /// Dropping the returned future after the operation started counts as a
    /// failure.
    pub async fn call_async<F, Fut, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let permit = self.acquire()?;
        let result = f().await;
        permit.settle(&result);

        result.map_err(BreakerError::Operation)
    }
}
