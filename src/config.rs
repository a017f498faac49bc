//! Configuration for circuit breakers.

use std::sync::Arc;
use std::time::Duration;

use crate::breaker::CircuitBreaker;
use crate::classifier::{CountAll, FailureClassifier, PredicateClassifier};
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::policy::{BreakerPolicy, DefaultPolicy};

/// Default consecutive failures that trip the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 5;
/// Default consecutive half-open successes that close the circuit.
pub const DEFAULT_SUCCESS_THRESHOLD: u64 = 2;
/// Default time the circuit stays open before a trial call.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Builder for creating circuit breakers with custom configurations.
pub struct BreakerBuilder<E, P = DefaultPolicy>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    failure_threshold: u64,
    success_threshold: u64,
    recovery_timeout: Duration,
    policy: Option<P>,
    classifier: Arc<dyn FailureClassifier<E>>,
    clock: Arc<dyn Clock>,
    metric_sink: Arc<dyn MetricSink>,
    hook_registry: Arc<HookRegistry>,
}

impl<E> Default for BreakerBuilder<E, DefaultPolicy>
where
    E: std::error::Error + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> BreakerBuilder<E, DefaultPolicy>
where
    E: std::error::Error + 'static,
{
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            policy: None,
            classifier: Arc::new(CountAll),
            clock: Arc::new(SystemClock),
            metric_sink: Arc::new(NullMetricSink),
            hook_registry: Arc::new(HookRegistry::new()),
        }
    }

    /// Builds a circuit breaker with the default consecutive-count policy.
    pub fn build(self) -> Result<CircuitBreaker<E>, ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::ZeroSuccessThreshold);
        }

        let policy = DefaultPolicy::new(self.failure_threshold, self.success_threshold);
        Ok(CircuitBreaker::new(
            policy,
            self.recovery_timeout,
            self.classifier,
            self.clock,
            self.metric_sink,
            self.hook_registry,
        ))
    }
}

impl<E, P> BreakerBuilder<E, P>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    /// Sets the number of consecutive countable failures that trip the circuit.
    pub fn failure_threshold(mut self, count: u64) -> Self {
        self.failure_threshold = count;
        self
    }

    /// Sets the number of consecutive half-open successes that close the circuit.
    pub fn success_threshold(mut self, count: u64) -> Self {
        self.success_threshold = count;
        self
    }

    /// Sets how long the circuit stays open before admitting a trial call.
    pub fn recovery_timeout(mut self, duration: Duration) -> Self {
        self.recovery_timeout = duration;
        self
    }

    /// Sets the classifier deciding which failures count.
    pub fn classifier<C: FailureClassifier<E>>(mut self, classifier: C) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Counts only the failures for which `predicate` returns true.
    pub fn count_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.classifier(PredicateClassifier::new(predicate))
    }

    /// Sets the time source.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets a metric sink for the circuit breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a hook registry for the circuit breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hook_registry = Arc::new(hooks);
        self
    }

    /// Replaces the trip/close policy. Thresholds set on the builder are
    /// ignored by custom policies.
    pub fn policy<Q: BreakerPolicy>(self, policy: Q) -> BreakerBuilder<E, Q> {
        BreakerBuilder {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            recovery_timeout: self.recovery_timeout,
            policy: Some(policy),
            classifier: self.classifier,
            clock: self.clock,
            metric_sink: self.metric_sink,
            hook_registry: self.hook_registry,
        }
    }

    /// Builds a circuit breaker with the policy passed to [`policy`](Self::policy).
    pub fn build_with_policy(self) -> Result<CircuitBreaker<E, P>, ConfigError> {
        let policy = self.policy.ok_or(ConfigError::MissingPolicy)?;

        Ok(CircuitBreaker::new(
            policy,
            self.recovery_timeout,
            self.classifier,
            self.clock,
            self.metric_sink,
            self.hook_registry,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn rejects_zero_thresholds() {
        let err = BreakerBuilder::<Boom>::new()
            .failure_threshold(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroFailureThreshold);

        let err = BreakerBuilder::<Boom>::new()
            .success_threshold(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroSuccessThreshold);
    }

    #[test]
    fn defaults_match_documented_values() {
        let breaker = BreakerBuilder::<Boom>::new().build().unwrap();
        assert_eq!(breaker.policy().failure_threshold(), DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(breaker.policy().success_threshold(), DEFAULT_SUCCESS_THRESHOLD);
        assert_eq!(breaker.recovery_timeout(), DEFAULT_RECOVERY_TIMEOUT);
    }

    /// Trips on any failure and closes on the first trial success.
    struct Eager;

    impl BreakerPolicy for Eager {
        fn should_trip(&self, stats: &crate::BreakerStats) -> bool {
            stats.consecutive_failures >= 1
        }

        fn should_close(&self, stats: &crate::BreakerStats) -> bool {
            stats.consecutive_successes >= 1
        }
    }

    #[test]
    fn custom_policy_replaces_thresholds() {
        let breaker = BreakerBuilder::<Boom>::new()
            .failure_threshold(10)
            .policy(Eager)
            .build_with_policy()
            .unwrap();

        let _ = breaker.call(|| Err::<(), _>(Boom));
        assert_eq!(breaker.state(), crate::State::Open);
    }

    #[test]
    fn build_with_policy_requires_a_policy() {
        let err = BreakerBuilder::<Boom>::new()
            .build_with_policy()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingPolicy);
    }
}
