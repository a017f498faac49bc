//! Degrading fetch path.
//!
//! A [`ResilientFetcher`] asks its upstream through a [`CircuitBreaker`]. A
//! live answer is cached and returned as [`FetchOutcome::Fresh`]. When the
//! call fails or is rejected, the last cached value comes back as
//! [`FetchOutcome::Stale`] with its age, or [`FetchOutcome::Unavailable`] if
//! the key was never fetched. `fetch` itself never fails.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::cache::StaleCache;
use crate::error::BreakerResult;
use crate::metrics::{FetchCounters, FetchStats};
use crate::policy::{BreakerPolicy, DefaultPolicy};

/// A blocking source of values, typically a bounded-timeout network call.
///
/// Implemented for any `Fn(&K) -> Result<V, E>` closure.
pub trait Upstream<K, V, E>: Send + Sync {
    /// Fetches the live value for `key`.
    fn fetch(&self, key: &K) -> Result<V, E>;
}

impl<K, V, E, F> Upstream<K, V, E> for F
where
    F: Fn(&K) -> Result<V, E> + Send + Sync,
{
    fn fetch(&self, key: &K) -> Result<V, E> {
        self(key)
    }
}

/// An asynchronous source of values.
#[cfg(feature = "async")]
pub trait AsyncUpstream<K, V, E>: Send + Sync {
    /// Fetches the live value for `key`.
    fn fetch<'a>(&'a self, key: &'a K) -> futures::future::BoxFuture<'a, Result<V, E>>;
}

/// Which path answered a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Freshness {
    /// Answered by the live dependency.
    Fresh,
    /// Answered from the cache.
    Stale,
    /// No live answer and nothing cached.
    Unavailable,
}

impl Freshness {
    /// Short lowercase label, suitable for metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "FRESH"),
            Freshness::Stale => write!(f, "STALE"),
            Freshness::Unavailable => write!(f, "UNAVAILABLE"),
        }
    }
}

/// The result of a fetch, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<V> {
    /// The live value.
    Fresh(V),
    /// The last successfully fetched value.
    Stale {
        /// The cached value.
        value: V,
        /// Time since the value was fetched.
        age: Duration,
    },
    /// No value could be produced.
    Unavailable,
}

impl<V> FetchOutcome<V> {
    /// Which path produced this outcome.
    pub fn freshness(&self) -> Freshness {
        match self {
            FetchOutcome::Fresh(_) => Freshness::Fresh,
            FetchOutcome::Stale { .. } => Freshness::Stale,
            FetchOutcome::Unavailable => Freshness::Unavailable,
        }
    }

    /// The value, fresh or stale.
    pub fn value(&self) -> Option<&V> {
        match self {
            FetchOutcome::Fresh(value) | FetchOutcome::Stale { value, .. } => Some(value),
            FetchOutcome::Unavailable => None,
        }
    }

    /// Consumes the outcome, returning the value if there is one.
    pub fn into_value(self) -> Option<V> {
        match self {
            FetchOutcome::Fresh(value) | FetchOutcome::Stale { value, .. } => Some(value),
            FetchOutcome::Unavailable => None,
        }
    }

    /// Age of a stale value.
    pub fn cache_age(&self) -> Option<Duration> {
        match self {
            FetchOutcome::Stale { age, .. } => Some(*age),
            _ => None,
        }
    }

    /// Returns true unless the value is fresh.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, FetchOutcome::Fresh(_))
    }
}

/// Outcomes of a multi-key fetch, in request order.
#[derive(Debug, Clone)]
pub struct Batch<K, V> {
    items: SmallVec<[(K, FetchOutcome<V>); 8]>,
}

impl<K, V> Batch<K, V> {
    /// Returns true if any item is stale or unavailable.
    pub fn is_degraded(&self) -> bool {
        self.items.iter().any(|(_, outcome)| outcome.is_degraded())
    }

    /// Number of items that ended with `freshness`.
    pub fn count(&self, freshness: Freshness) -> usize {
        self.items
            .iter()
            .filter(|(_, outcome)| outcome.freshness() == freshness)
            .count()
    }

    /// The outcome for `key`, if it was requested.
    pub fn get(&self, key: &K) -> Option<&FetchOutcome<V>>
    where
        K: PartialEq,
    {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, outcome)| outcome)
    }

    /// Iterates over `(key, outcome)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = &(K, FetchOutcome<V>)> {
        self.items.iter()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if no keys were requested.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K, V> FromIterator<(K, FetchOutcome<V>)> for Batch<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, FetchOutcome<V>)>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<K, V> IntoIterator for Batch<K, V> {
    type Item = (K, FetchOutcome<V>);
    type IntoIter = smallvec::IntoIter<[(K, FetchOutcome<V>); 8]>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Fetches through a circuit breaker and falls back to the last known good
/// value.
///
/// One fetcher per dependency. The breaker handle may be shared with other
/// code calling the same dependency.
pub struct ResilientFetcher<U, K, V, E, P = DefaultPolicy>
where
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    upstream: U,
    breaker: CircuitBreaker<E, P>,
    cache: StaleCache<K, V>,
    counters: FetchCounters,
}

impl<U, K, V, E, P> ResilientFetcher<U, K, V, E, P>
where
    K: Eq + Hash + Clone,
    V: Clone,
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    /// Creates a fetcher with an empty cache.
    pub fn new(upstream: U, breaker: CircuitBreaker<E, P>) -> Self {
        Self {
            upstream,
            breaker,
            cache: StaleCache::new(),
            counters: FetchCounters::default(),
        }
    }

    /// The guarding breaker.
    pub fn breaker(&self) -> &CircuitBreaker<E, P> {
        &self.breaker
    }

    /// The last-known-good cache, read-only.
    pub fn cache(&self) -> &StaleCache<K, V> {
        &self.cache
    }

    /// The upstream source.
    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Outcome counters, cache size and breaker snapshot.
    pub fn stats(&self) -> FetchStats {
        self.counters
            .snapshot(self.cache.len(), self.breaker.stats())
    }

    fn resolve(&self, key: &K, result: BreakerResult<V, E>) -> FetchOutcome<V> {
        let now = self.breaker.clock().now();
        let outcome = match result {
            Ok(value) => {
                self.cache.insert(key.clone(), value.clone(), now);
                FetchOutcome::Fresh(value)
            }
            Err(err) => {
                let outcome = match self.cache.get(key) {
                    Some(entry) => FetchOutcome::Stale {
                        age: entry.age(now),
                        value: entry.value,
                    },
                    None => FetchOutcome::Unavailable,
                };
                if err.is_open() {
                    debug!(
                        freshness = outcome.freshness().as_str(),
                        "circuit open, serving degraded value"
                    );
                } else {
                    warn!(
                        error = %err,
                        freshness = outcome.freshness().as_str(),
                        "upstream fetch failed, serving degraded value"
                    );
                }
                outcome
            }
        };

        let freshness = outcome.freshness();
        self.counters.record(freshness);
        self.breaker.metric_sink().record_fetch(freshness);
        outcome
    }
}

impl<U, K, V, E, P> ResilientFetcher<U, K, V, E, P>
where
    U: Upstream<K, V, E>,
    K: Eq + Hash + Clone,
    V: Clone,
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    /// Fetches `key`: a single guarded attempt, then the cache.
    pub fn fetch(&self, key: &K) -> FetchOutcome<V> {
        let result = self
            .breaker
            .call(|| Upstream::fetch(&self.upstream, key));
        self.resolve(key, result)
    }

    /// Fetches every key independently. One failing key never fails the
    /// batch; it degrades its own item.
    pub fn fetch_all<I>(&self, keys: I) -> Batch<K, V>
    where
        I: IntoIterator<Item = K>,
    {
        keys.into_iter()
            .map(|key| {
                let outcome = self.fetch(&key);
                (key, outcome)
            })
            .collect()
    }
}

#[cfg(feature = "async")]
impl<U, K, V, E, P> ResilientFetcher<U, K, V, E, P>
where
    U: AsyncUpstream<K, V, E>,
    K: Eq + Hash + Clone,
    V: Clone,
    P: BreakerPolicy,
    E: std::error::Error + 'static,
{
    /// Async variant of [`fetch`](Self::fetch).
    pub async fn fetch_async(&self, key: &K) -> FetchOutcome<V> {
        let result = self
            .breaker
            .call_async(|| AsyncUpstream::fetch(&self.upstream, key))
            .await;
        self.resolve(key, result)
    }

    /// Async variant of [`fetch_all`](Self::fetch_all); keys are fetched
    /// concurrently.
    pub async fn fetch_all_async<I>(&self, keys: I) -> Batch<K, V>
    where
        I: IntoIterator<Item = K>,
    {
        let keys: Vec<K> = keys.into_iter().collect();
        let outcomes =
            futures::future::join_all(keys.iter().map(|key| self.fetch_async(key))).await;

        keys.into_iter().zip(outcomes).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_accessors() {
        let fresh = FetchOutcome::Fresh(5);
        let stale = FetchOutcome::Stale {
            value: 4,
            age: Duration::from_secs(9),
        };
        let missing: FetchOutcome<i32> = FetchOutcome::Unavailable;

        assert_eq!(fresh.value(), Some(&5));
        assert!(!fresh.is_degraded());
        assert_eq!(stale.cache_age(), Some(Duration::from_secs(9)));
        assert_eq!(stale.clone().into_value(), Some(4));
        assert!(stale.is_degraded());
        assert_eq!(missing.freshness(), Freshness::Unavailable);
        assert_eq!(missing.value(), None);
    }

    #[test]
    fn batch_is_degraded_if_any_item_is() {
        let batch: Batch<&str, i32> = vec![
            ("a", FetchOutcome::Fresh(1)),
            ("b", FetchOutcome::Unavailable),
        ]
        .into_iter()
        .collect();

        assert!(batch.is_degraded());
        assert_eq!(batch.count(Freshness::Fresh), 1);
        assert_eq!(batch.get(&"b"), Some(&FetchOutcome::Unavailable));
        assert_eq!(batch.len(), 2);
    }
}
