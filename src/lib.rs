//! # resilient-fetch
//!
//! A failure-isolation and degradation layer for calls to a slow or failing
//! downstream dependency: a circuit breaker guarding the outbound call,
//! composed with a staleness-aware cache so callers degrade instead of
//! failing.
//!
//! ## Circuit breaker
//!
//! ```text
//! Closed ──[failure_threshold consecutive failures]──> Open
//!   ▲                                                   │
//!   │                                                   │ [recovery_timeout elapsed]
//!   │                                                   ▼
//!   └──[success_threshold consecutive successes]── HalfOpen
//!                        [any failure] ───────────────> Open
//! ```
//!
//! State is recomputed lazily on each call or read; there is no background
//! timer. While half-open, exactly one trial call is in flight at a time and
//! concurrent callers are rejected. Only failures a [`FailureClassifier`]
//! marks as countable move the counters.
//!
//! ## Basic usage
//!
//! ```rust
//! use resilient_fetch::{BreakerError, CircuitBreaker, FetchOutcome, ResilientFetcher};
//! use std::fmt;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct ServiceError(String);
//!
//! impl fmt::Display for ServiceError {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         write!(f, "service error: {}", self.0)
//!     }
//! }
//!
//! impl std::error::Error for ServiceError {}
//!
//! let breaker = CircuitBreaker::<ServiceError>::builder()
//!     .failure_threshold(3)
//!     .success_threshold(2)
//!     .recovery_timeout(Duration::from_secs(30))
//!     .build()
//!     .expect("valid configuration");
//!
//! // Guard a call directly...
//! match breaker.call(|| Ok::<_, ServiceError>("pong")) {
//!     Ok(reply) => println!("reply: {}", reply),
//!     Err(BreakerError::Open) => println!("circuit open, call skipped"),
//!     Err(BreakerError::Operation(err)) => println!("call failed: {}", err),
//! }
//!
//! // ...or let a fetcher fall back to the last known good value.
//! let fetcher = ResilientFetcher::new(
//!     |id: &u32| Ok::<_, ServiceError>(format!("product {}", id)),
//!     breaker,
//! );
//! match fetcher.fetch(&7) {
//!     FetchOutcome::Fresh(name) => println!("live: {}", name),
//!     FetchOutcome::Stale { value, age } => println!("cached {:?} ago: {}", age, value),
//!     FetchOutcome::Unavailable => println!("no data"),
//! }
//! ```
//!
//! ## Features
//!
//! - `async` - `call_async`, [`AsyncUpstream`] and async fetches
//! - `prometheus` - [`PrometheusSink`] for `prometheus-client`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod cache;
mod classifier;
mod clock;
mod config;
mod error;
mod fetcher;
mod hook;
mod metrics;
mod policy;
pub mod prelude;
#[cfg(feature = "prometheus")]
mod prometheus;
mod state;

// Re-exports
pub use breaker::CircuitBreaker;
pub use cache::{CacheEntry, StaleCache};
pub use classifier::{CountAll, Countable, FailureClassifier, PredicateClassifier, SelfClassified};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{
    BreakerBuilder, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT, DEFAULT_SUCCESS_THRESHOLD,
};
pub use error::{BreakerError, BreakerResult, ConfigError};
#[cfg(feature = "async")]
pub use fetcher::AsyncUpstream;
pub use fetcher::{Batch, FetchOutcome, Freshness, ResilientFetcher, Upstream};
pub use hook::HookRegistry;
pub use metrics::{BreakerStats, CallOutcome, FetchStats, MetricSink, NullMetricSink};
pub use policy::{BreakerPolicy, DefaultPolicy};
#[cfg(feature = "prometheus")]
pub use prometheus::PrometheusSink;
pub use state::{recompute_state, State, Transition};
