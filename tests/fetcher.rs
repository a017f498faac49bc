use resilient_fetch::{
    CircuitBreaker, Clock, Countable, FetchOutcome, Freshness, MockClock, ResilientFetcher,
    SelfClassified, State, Upstream,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Product {
    name: String,
    price: f64,
}

#[derive(Debug)]
enum CatalogError {
    Timeout,
    NotFound(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Timeout => write!(f, "product service timed out"),
            CatalogError::NotFound(id) => write!(f, "product {} not found", id),
        }
    }
}

impl std::error::Error for CatalogError {}

impl Countable for CatalogError {
    fn is_countable(&self) -> bool {
        matches!(self, CatalogError::Timeout)
    }
}

/// In-memory stand-in for the product service.
struct Catalog {
    products: HashMap<String, Product>,
    healthy: AtomicBool,
    calls: AtomicUsize,
}

impl Catalog {
    fn new() -> Self {
        let mut products = HashMap::new();
        for (id, name, price) in [("p1", "Laptop", 999.0), ("p2", "Mouse", 25.0), ("p3", "Desk", 300.0)] {
            products.insert(
                id.to_string(),
                Product {
                    name: name.to_string(),
                    price,
                },
            );
        }

        Self {
            products,
            healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Upstream<String, Product, CatalogError> for Catalog {
    fn fetch(&self, key: &String) -> Result<Product, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(CatalogError::Timeout);
        }
        self.products
            .get(key)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(key.clone()))
    }
}

fn fetcher(clock: &MockClock) -> ResilientFetcher<Catalog, String, Product, CatalogError> {
    let breaker = CircuitBreaker::<CatalogError>::builder()
        .failure_threshold(3)
        .success_threshold(2)
        .recovery_timeout(Duration::from_secs(30))
        .classifier(SelfClassified::new())
        .clock(clock.clone())
        .build()
        .unwrap();

    ResilientFetcher::new(Catalog::new(), breaker)
}

fn id(s: &str) -> String {
    s.to_string()
}

#[test]
fn test_fresh_fetch_populates_cache() {
    let clock = MockClock::new();
    let fetcher = fetcher(&clock);

    let outcome = fetcher.fetch(&id("p1"));
    assert_eq!(outcome.freshness(), Freshness::Fresh);
    assert_eq!(outcome.value().unwrap().name, "Laptop");
    assert_eq!(outcome.value().unwrap().price, 999.0);

    let entry = fetcher.cache().get(&id("p1")).unwrap();
    assert_eq!(entry.fetched_at, clock.now());
}

#[test]
fn test_stale_fallback_reports_age_from_last_success() {
    let clock = MockClock::new();
    let fetcher = fetcher(&clock);

    assert!(!fetcher.fetch(&id("p1")).is_degraded());
    clock.advance_secs(5);
    fetcher.upstream().set_healthy(false);

    for elapsed in [5u64, 6, 7, 8, 9] {
        match fetcher.fetch(&id("p1")) {
            FetchOutcome::Stale { value, age } => {
                assert_eq!(value.name, "Laptop");
                assert_eq!(age, Duration::from_secs(elapsed));
            }
            other => panic!("expected stale, got {:?}", other),
        }
        clock.advance_secs(1);
    }

    // Three timeouts tripped the breaker; the rest were rejected.
    assert_eq!(fetcher.breaker().state(), State::Open);
    assert_eq!(fetcher.upstream().calls(), 4);
}

#[test]
fn test_never_fetched_key_is_unavailable() {
    let clock = MockClock::new();
    let fetcher = fetcher(&clock);

    fetcher.upstream().set_healthy(false);
    for _ in 0..5 {
        assert_eq!(fetcher.fetch(&id("p2")), FetchOutcome::Unavailable);
    }
    assert_eq!(fetcher.breaker().state(), State::Open);
    assert!(fetcher.cache().is_empty());
}

#[test]
fn test_not_found_degrades_without_tripping() {
    let clock = MockClock::new();
    let fetcher = fetcher(&clock);

    for _ in 0..10 {
        assert_eq!(fetcher.fetch(&id("missing")), FetchOutcome::Unavailable);
    }

    let stats = fetcher.breaker().stats();
    assert_eq!(stats.state, State::Closed);
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.total_ignored, 10);
}

#[test]
fn test_recovery_refreshes_cache() {
    let clock = MockClock::new();
    let fetcher = fetcher(&clock);

    fetcher.fetch(&id("p1"));
    fetcher.upstream().set_healthy(false);
    for _ in 0..3 {
        fetcher.fetch(&id("p1"));
    }
    assert_eq!(fetcher.breaker().state(), State::Open);

    clock.advance_secs(31);
    fetcher.upstream().set_healthy(true);

    let outcome = fetcher.fetch(&id("p1"));
    assert_eq!(outcome.freshness(), Freshness::Fresh);
    assert_eq!(fetcher.breaker().state(), State::HalfOpen);
    let entry = fetcher.cache().get(&id("p1")).unwrap();
    assert_eq!(entry.age(clock.now()), Duration::ZERO);

    fetcher.fetch(&id("p2"));
    assert_eq!(fetcher.breaker().state(), State::Closed);
}

#[test]
fn test_fetch_all_degrades_per_item() {
    let clock = MockClock::new();
    let fetcher = fetcher(&clock);

    fetcher.fetch(&id("p1"));
    fetcher.upstream().set_healthy(false);

    let batch = fetcher.fetch_all(vec![id("p1"), id("p2"), id("p3")]);
    assert_eq!(batch.len(), 3);
    assert!(batch.is_degraded());
    assert_eq!(batch.get(&id("p1")).unwrap().freshness(), Freshness::Stale);
    assert_eq!(batch.count(Freshness::Unavailable), 2);

    fetcher.upstream().set_healthy(true);
    fetcher.breaker().reset();
    let batch = fetcher.fetch_all(vec![id("p1"), id("p2")]);
    assert!(!batch.is_degraded());
}

#[test]
fn test_stats_count_outcomes() {
    let clock = MockClock::new();
    let fetcher = fetcher(&clock);

    fetcher.fetch(&id("p1"));
    fetcher.fetch(&id("p2"));
    fetcher.upstream().set_healthy(false);
    fetcher.fetch(&id("p1"));
    fetcher.fetch(&id("p3"));

    let stats = fetcher.stats();
    assert_eq!((stats.fresh, stats.stale, stats.unavailable), (2, 1, 1));
    assert_eq!(stats.cached_entries, 2);
    assert_eq!(stats.breaker.total_failures, 2);
}

#[test]
fn test_closure_upstream() {
    let clock = MockClock::new();
    let breaker = CircuitBreaker::<CatalogError>::builder()
        .clock(clock.clone())
        .build()
        .unwrap();
    let fetcher = ResilientFetcher::new(
        |key: &u32| {
            if *key == 0 {
                Err(CatalogError::Timeout)
            } else {
                Ok(key * 10)
            }
        },
        breaker,
    );

    assert_eq!(fetcher.fetch(&4), FetchOutcome::Fresh(40));
    assert_eq!(fetcher.fetch(&0), FetchOutcome::Unavailable);
}

#[test]
fn test_concurrent_fetches_of_one_key_see_only_produced_values() {
    const THREADS: usize = 8;
    const FETCHES: usize = 200;

    let version = AtomicU64::new(0);
    let produced = Mutex::new(HashSet::new());
    let breaker = CircuitBreaker::<CatalogError>::builder()
        .failure_threshold(u64::MAX)
        .build()
        .unwrap();
    let fetcher = ResilientFetcher::new(
        |_: &String| {
            // Every third attempt sees the service down.
            let n = version.fetch_add(1, Ordering::SeqCst);
            if n % 3 == 0 {
                return Err(CatalogError::Timeout);
            }
            produced.lock().insert(n);
            Ok(n)
        },
        breaker,
    );

    let seen = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    (0..FETCHES)
                        .map(|_| fetcher.fetch(&id("p1")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    let produced = produced.lock();
    assert_eq!(seen.len(), THREADS * FETCHES);
    for outcome in &seen {
        if let Some(value) = outcome.value() {
            assert!(produced.contains(value), "{} was never produced", value);
        }
    }

    let stats = fetcher.stats();
    assert_eq!(stats.cached_entries, 1);
    assert_eq!(stats.fresh as usize, produced.len());
    assert_eq!(
        (stats.fresh + stats.stale + stats.unavailable) as usize,
        THREADS * FETCHES
    );
    let cached = fetcher.cache().get(&id("p1")).unwrap().value;
    assert!(produced.contains(&cached));
}
