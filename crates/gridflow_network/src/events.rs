// SPDX-License-Identifier: MIT OR Apache-2.0
//! Observer registration for module execution signals.
//!
//! Observers subscribe with a callback and get back a token; unsubscribing
//! with the token removes the callback. Emission calls every live observer
//! in subscription order.

use crate::module::ModuleId;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cancellation token returned by [`Signal::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A multi-observer signal.
pub struct Signal<T> {
    inner: Mutex<SignalInner<T>>,
}

struct SignalInner<T> {
    next_token: u64,
    observers: Vec<(u64, Callback<T>)>,
}

impl<T> Signal<T> {
    /// A signal with no observers.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SignalInner {
                next_token: 0,
                observers: Vec::new(),
            }),
        }
    }

    /// Register an observer; the returned token cancels it.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let mut inner = self.inner.lock();
        let token = inner.next_token;
        inner.next_token += 1;
        inner.observers.push((token, Arc::new(callback)));
        Subscription(token)
    }

    /// Remove an observer; returns whether it was still registered.
    pub fn unsubscribe(&self, token: Subscription) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.observers.len();
        inner.observers.retain(|(t, _)| *t != token.0);
        inner.observers.len() != before
    }

    /// Invoke every observer with `value`.
    ///
    /// The registry lock is released before any callback runs, so an
    /// observer may subscribe, unsubscribe (itself included), or emit from
    /// inside its callback.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .inner
            .lock()
            .observers
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The execution signals a module exposes.
#[derive(Default)]
pub struct ModuleEvents {
    /// Fired when `execute` starts.
    pub execute_begins: Signal<ModuleId>,
    /// Fired when `execute` finishes, on both success and failure.
    pub execute_ends: Signal<ModuleId>,
    /// Fired by the module's `error` log channel, identifying the module.
    pub error: Signal<ModuleId>,
}
