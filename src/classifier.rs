//! Failure classification.
//!
//! Only failures a classifier marks as *countable* move the breaker's
//! counters. Everything else (malformed input, a 4xx from the dependency)
//! is passed back to the caller untouched.

use std::marker::PhantomData;

/// Decides whether an operation error reflects dependency health.
pub trait FailureClassifier<E>: Send + Sync + 'static {
    /// Returns true if `error` should count toward the breaker's thresholds.
    fn is_countable(&self, error: &E) -> bool;
}

/// Counts every failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountAll;

impl<E> FailureClassifier<E> for CountAll {
    fn is_countable(&self, _error: &E) -> bool {
        true
    }
}

/// Classifies failures with a predicate.
pub struct PredicateClassifier<F> {
    predicate: F,
}

impl<F> PredicateClassifier<F> {
    /// Wraps `predicate`; it returns true for countable errors.
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> FailureClassifier<E> for PredicateClassifier<F>
where
    F: Fn(&E) -> bool + Send + Sync + 'static,
{
    fn is_countable(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// Implemented by error types that know whether they indicate an unhealthy
/// dependency.
pub trait Countable {
    /// Returns true for transport failures, timeouts and 5xx-equivalents.
    fn is_countable(&self) -> bool;
}

/// Defers classification to the error's own [`Countable`] impl.
pub struct SelfClassified<E>(PhantomData<fn(&E)>);

impl<E> SelfClassified<E> {
    /// Creates the classifier.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<E> Default for SelfClassified<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> FailureClassifier<E> for SelfClassified<E>
where
    E: Countable + 'static,
{
    fn is_countable(&self, error: &E) -> bool {
        error.is_countable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum FetchError {
        Timeout,
        NotFound,
    }

    impl Countable for FetchError {
        fn is_countable(&self) -> bool {
            matches!(self, FetchError::Timeout)
        }
    }

    #[test]
    fn predicate_classifier_uses_closure() {
        let classifier = PredicateClassifier::new(|status: &u16| *status >= 500);
        assert!(classifier.is_countable(&503));
        assert!(!classifier.is_countable(&404));
    }

    #[test]
    fn self_classified_defers_to_error() {
        let classifier = SelfClassified::<FetchError>::new();
        assert!(classifier.is_countable(&FetchError::Timeout));
        assert!(!classifier.is_countable(&FetchError::NotFound));
        assert!(FailureClassifier::<FetchError>::is_countable(
            &CountAll,
            &FetchError::NotFound
        ));
    }
}
