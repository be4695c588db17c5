//! Named async gate
//!
//! A registry of deferred actions keyed by condition name. `wait` stores an
//! action behind a predicate, `notify` re-checks the predicate and runs the
//! action once it holds. Nothing here blocks a thread: "waiting" only means the
//! action is parked until someone calls `notify`.
//!
//! Only one waiter per name is kept. Registering a second waiter under a name
//! that already has one replaces the first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;

/// Predicate re-evaluated on every notify
pub type Predicate = Box<dyn Fn() -> bool + Send>;

/// Action run at most once when the predicate holds
pub type Action = Box<dyn FnOnce() + Send>;

struct Waiter {
    seq: u64,
    predicate: Predicate,
    action: Action,
}

static PROCESS_GATE: Lazy<Arc<AsyncGate>> = Lazy::new(|| Arc::new(AsyncGate::new()));

/// Single-slot-per-name condition registry
pub struct AsyncGate {
    waiters: Mutex<HashMap<String, Waiter>>,
    next_seq: AtomicU64,
}

impl Default for AsyncGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AsyncGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncGate").field("pending", &self.pending()).finish()
    }
}

impl AsyncGate {
    /// Create an empty gate
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// The gate shared by every loader in the process that opts into it
    pub fn process_wide() -> Arc<AsyncGate> {
        PROCESS_GATE.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Waiter>> {
        // Actions never run under the lock, so a poisoned map is still consistent
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `action` now if `predicate` holds, otherwise park it under `name`.
    ///
    /// Returns true if the action ran immediately.
    pub fn wait<P, A>(&self, name: &str, predicate: P, action: A) -> bool
    where
        P: Fn() -> bool + Send + 'static,
        A: FnOnce() + Send + 'static,
    {
        if predicate() {
            action();
            return true;
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .lock()
            .insert(
                name.to_string(),
                Waiter {
                    seq,
                    predicate: Box::new(predicate),
                    action: Box::new(action),
                },
            )
            .is_some();
        if replaced {
            log::warn!("Gate '{}': pending waiter replaced by a new registration", name);
        }

        // A notify may have landed between the first check and the insert
        self.run_if_ready(name, Some(seq))
    }

    /// Re-check the waiter parked under `name` and run it if ready.
    ///
    /// Returns true if an action ran.
    pub fn notify(&self, name: &str) -> bool {
        self.run_if_ready(name, None)
    }

    /// Drop the waiter parked under `name` without running it.
    ///
    /// Returns true if a waiter was removed.
    pub fn remove(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    /// Returns true if a waiter is parked under `name`
    pub fn is_pending(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Names with a parked waiter, sorted
    pub fn pending(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn run_if_ready(&self, name: &str, only_seq: Option<u64>) -> bool {
        let waiter = {
            let mut waiters = self.lock();
            match waiters.get(name) {
                Some(w) if only_seq.is_none_or(|seq| w.seq == seq) => waiters.remove(name),
                _ => None,
            }
        };
        let Some(waiter) = waiter else {
            return false;
        };

        if (waiter.predicate)() {
            (waiter.action)();
            return true;
        }

        // Not ready: put it back unless someone registered a newer waiter meanwhile
        let mut waiters = self.lock();
        waiters.entry(name.to_string()).or_insert(waiter);
        false
    }
}
