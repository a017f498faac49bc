//! Circuit breaker states and the lazy open → half-open recomputation.

use std::fmt;
use std::time::{Duration, Instant};

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Circuit is closed and operations are allowed.
    Closed,

    /// Circuit is open and operations are rejected.
    Open,

    /// Circuit is admitting a single trial operation to test recovery.
    HalfOpen,
}

impl State {
    /// Short lowercase label, suitable for metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "CLOSED"),
            State::Open => write!(f, "OPEN"),
            State::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// A state change observed by a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the change.
    pub from: State,
    /// State after the change.
    pub to: State,
}

/// Recomputes the breaker state from elapsed time.
///
/// The only time-driven edge is `Open -> HalfOpen`, taken once
/// `now - last_failure_at >= recovery_timeout`. Every other state is returned
/// unchanged. Breakers call this at the top of every call and state read
/// instead of running a background timer.
pub fn recompute_state(
    current: State,
    last_failure_at: Option<Instant>,
    now: Instant,
    recovery_timeout: Duration,
) -> State {
    match (current, last_failure_at) {
        (State::Open, Some(at)) if now.saturating_duration_since(at) >= recovery_timeout => {
            State::HalfOpen
        }
        (state, _) => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn open_stays_open_before_timeout() {
        let at = Instant::now();
        let now = at + Duration::from_secs(10);
        assert_eq!(recompute_state(State::Open, Some(at), now, TIMEOUT), State::Open);
    }

    #[test]
    fn open_moves_to_half_open_at_timeout_boundary() {
        let at = Instant::now();
        assert_eq!(
            recompute_state(State::Open, Some(at), at + TIMEOUT, TIMEOUT),
            State::HalfOpen
        );
        assert_eq!(
            recompute_state(State::Open, Some(at), at + Duration::from_secs(31), TIMEOUT),
            State::HalfOpen
        );
    }

    #[test]
    fn closed_and_half_open_are_not_time_driven() {
        let at = Instant::now();
        let later = at + Duration::from_secs(3600);
        assert_eq!(recompute_state(State::Closed, Some(at), later, TIMEOUT), State::Closed);
        assert_eq!(
            recompute_state(State::HalfOpen, Some(at), later, TIMEOUT),
            State::HalfOpen
        );
    }

    #[test]
    fn display_uses_upper_snake_case() {
        assert_eq!(State::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!(State::HalfOpen.as_str(), "half-open");
    }
}
