//! Prometheus metric sink.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::fetcher::Freshness;
use crate::metrics::{CallOutcome, MetricSink};
use crate::state::{State, Transition};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CallLabels {
    dependency: String,
    outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TransitionLabels {
    dependency: String,
    from: String,
    to: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FetchLabels {
    dependency: String,
    freshness: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct DependencyLabels {
    dependency: String,
}

/// A [`MetricSink`] exporting to a `prometheus_client` registry.
///
/// Every series carries a `dependency` label, so one registry can hold the
/// sinks of several breakers.
#[derive(Clone)]
pub struct PrometheusSink {
    dependency: String,
    calls: Family<CallLabels, Counter>,
    rejections: Family<DependencyLabels, Counter>,
    transitions: Family<TransitionLabels, Counter>,
    fetches: Family<FetchLabels, Counter>,
    state: Family<DependencyLabels, Gauge>,
    /// Generation of the last state written to `state`.
    state_generation: Arc<Mutex<u64>>,
    call_duration: Histogram,
}

impl PrometheusSink {
    /// Creates a sink for `dependency` and registers its metrics.
    pub fn new(dependency: impl Into<String>, registry: &mut Registry) -> Self {
        let sink = Self {
            dependency: dependency.into(),
            calls: Family::default(),
            rejections: Family::default(),
            transitions: Family::default(),
            fetches: Family::default(),
            state: Family::default(),
            state_generation: Arc::new(Mutex::new(0)),
            call_duration: Histogram::new(exponential_buckets(0.001, 2.0, 14)),
        };

        let registry = registry.sub_registry_with_prefix("breaker");
        registry.register(
            "calls",
            "Guarded calls by outcome",
            sink.calls.clone(),
        );
        registry.register(
            "rejections",
            "Calls rejected while the circuit was open",
            sink.rejections.clone(),
        );
        registry.register(
            "transitions",
            "Circuit state transitions",
            sink.transitions.clone(),
        );
        registry.register(
            "fetches",
            "Fetches by freshness of the returned value",
            sink.fetches.clone(),
        );
        registry.register(
            "state",
            "Current state: 0 closed, 1 open, 2 half-open",
            sink.state.clone(),
        );
        registry.register(
            "call_duration_seconds",
            "Duration of admitted calls",
            sink.call_duration.clone(),
        );

        sink.state.get_or_create(&sink.dependency_labels()).set(0);
        sink
    }

    fn dependency_labels(&self) -> DependencyLabels {
        DependencyLabels {
            dependency: self.dependency.clone(),
        }
    }
}

fn state_value(state: State) -> i64 {
    match state {
        State::Closed => 0,
        State::Open => 1,
        State::HalfOpen => 2,
    }
}

impl MetricSink for PrometheusSink {
    fn record_transition(&self, transition: Transition) {
        self.transitions
            .get_or_create(&TransitionLabels {
                dependency: self.dependency.clone(),
                from: transition.from.as_str().to_string(),
                to: transition.to.as_str().to_string(),
            })
            .inc();
    }

    fn record_state(&self, state: State, generation: u64) {
        let mut seen = self.state_generation.lock();
        if generation <= *seen {
            return;
        }
        *seen = generation;
        self.state
            .get_or_create(&self.dependency_labels())
            .set(state_value(state));
    }

    fn record_call(&self, outcome: CallOutcome, duration: Duration) {
        self.calls
            .get_or_create(&CallLabels {
                dependency: self.dependency.clone(),
                outcome: outcome.as_str().to_string(),
            })
            .inc();
        self.call_duration.observe(duration.as_secs_f64());
    }

    fn record_rejection(&self) {
        self.rejections.get_or_create(&self.dependency_labels()).inc();
    }

    fn record_fetch(&self, freshness: Freshness) {
        self.fetches
            .get_or_create(&FetchLabels {
                dependency: self.dependency.clone(),
                freshness: freshness.as_str().to_string(),
            })
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn exports_labelled_series() {
        let mut registry = Registry::default();
        let sink = PrometheusSink::new("product-service", &mut registry);

        sink.record_call(CallOutcome::Failure, Duration::from_millis(3));
        sink.record_transition(Transition {
            from: State::Closed,
            to: State::Open,
        });
        sink.record_state(State::Open, 1);
        sink.record_fetch(Freshness::Stale);

        let mut out = String::new();
        encode(&mut out, &registry).unwrap();

        assert!(out.contains(r#"breaker_calls_total{dependency="product-service",outcome="failure"} 1"#));
        assert!(out.contains(r#"breaker_state{dependency="product-service"} 1"#));
        assert!(out.contains(r#"freshness="stale""#));
    }

    #[test]
    fn state_gauge_ignores_reports_from_older_generations() {
        let mut registry = Registry::default();
        let sink = PrometheusSink::new("product-service", &mut registry);

        // Half-open (generation 2) is delivered before the open that preceded it.
        sink.record_state(State::HalfOpen, 2);
        sink.record_state(State::Open, 1);

        let mut out = String::new();
        encode(&mut out, &registry).unwrap();
        assert!(out.contains(r#"breaker_state{dependency="product-service"} 2"#));
    }
}
