//! Re-exports the types most callers need.
//!
//! # Example
//! ```rust,no_run
//! use resilient_fetch::prelude::*;
//! ```

pub use crate::breaker::CircuitBreaker;
pub use crate::classifier::{Countable, FailureClassifier};
pub use crate::error::{BreakerError, BreakerResult};
pub use crate::fetcher::{FetchOutcome, Freshness, ResilientFetcher, Upstream};
pub use crate::metrics::BreakerStats;
pub use crate::state::State;
