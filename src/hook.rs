//! Hook registry for circuit breaker events.

use crate::state::{State, Transition};
use parking_lot::RwLock;
use std::sync::Arc;

type HookFn = Arc<dyn Fn() + Send + Sync + 'static>;
type TransitionHookFn = Arc<dyn Fn(Transition) + Send + Sync + 'static>;

/// A registry for circuit breaker event hooks.
///
/// Hooks run on the calling thread after the breaker's lock has been
/// released, so they may read the breaker's state.
pub struct HookRegistry {
    on_transition: RwLock<Option<TransitionHookFn>>,
    on_open: RwLock<Option<HookFn>>,
    on_close: RwLock<Option<HookFn>>,
    on_half_open: RwLock<Option<HookFn>>,
    on_success: RwLock<Option<HookFn>>,
    on_failure: RwLock<Option<HookFn>>,
    on_rejected: RwLock<Option<HookFn>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            on_transition: RwLock::new(None),
            on_open: RwLock::new(None),
            on_close: RwLock::new(None),
            on_half_open: RwLock::new(None),
            on_success: RwLock::new(None),
            on_failure: RwLock::new(None),
            on_rejected: RwLock::new(None),
        }
    }

    /// Sets the hook to call on every state transition.
    pub fn set_on_transition<F>(&self, f: F)
    where
        F: Fn(Transition) + Send + Sync + 'static,
    {
        *self.on_transition.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the circuit opens.
    pub fn set_on_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::store(&self.on_open, f);
    }

    /// Sets the hook to call when the circuit closes.
    pub fn set_on_close<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::store(&self.on_close, f);
    }

    /// Sets the hook to call when the recovery timeout elapses and trial
    /// calls are admitted.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::store(&self.on_half_open, f);
    }

    /// Sets the hook to call after each successful guarded call.
    pub fn set_on_success<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::store(&self.on_success, f);
    }

    /// Sets the hook to call when a call fails with a countable error or is
    /// abandoned.
    pub fn set_on_failure<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::store(&self.on_failure, f);
    }

    /// Sets the hook to call when a call is rejected without running.
    pub fn set_on_rejected<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::store(&self.on_rejected, f);
    }

    /// Executes the hooks registered for a state transition.
    pub fn execute_transition_hook(&self, transition: Transition) {
        // Clone out of the lock so a hook may re-register hooks.
        let hook = self.on_transition.read().clone();
        if let Some(hook) = hook {
            hook(transition);
        }

        let slot = match transition.to {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        Self::run(slot);
    }

    /// Executes the success hook.
    pub fn execute_success_hook(&self) {
        Self::run(&self.on_success);
    }

    /// Executes the failure hook.
    pub fn execute_failure_hook(&self) {
        Self::run(&self.on_failure);
    }

    /// Executes the rejection hook.
    pub fn execute_rejected_hook(&self) {
        Self::run(&self.on_rejected);
    }

    fn store<F>(slot: &RwLock<Option<HookFn>>, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *slot.write() = Some(Arc::new(f));
    }

    fn run(slot: &RwLock<Option<HookFn>>) {
        let hook = slot.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}
