//! App record
//!
//! Handle to a loaded app. Returned synchronously by `load_app`, populated
//! once a runtime is built, and torn down by the caller through `invalidate`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::id::generate_record_id;
use crate::runtime::RuntimeInstance;

struct RecordInner {
    id: String,
    runtime: Mutex<Option<Arc<dyn RuntimeInstance>>>,
    invalidated: AtomicBool,
}

/// Shared handle to one loaded app; clones refer to the same record
#[derive(Clone)]
pub struct AppRecord {
    inner: Arc<RecordInner>,
}

impl std::fmt::Debug for AppRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRecord")
            .field("id", &self.inner.id)
            .field("loaded", &self.is_loaded())
            .field("invalidated", &self.is_invalidated())
            .finish()
    }
}

impl Default for AppRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl AppRecord {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RecordInner {
                id: generate_record_id(),
                runtime: Mutex::new(None),
                invalidated: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn RuntimeInstance>>> {
        self.inner.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach the built runtime. A record invalidated before the runtime
    /// arrived destroys it instead of keeping it.
    pub(crate) fn set_runtime(&self, runtime: Arc<dyn RuntimeInstance>) {
        if self.is_invalidated() {
            log::info!("App record {} was invalidated before its runtime arrived", self.inner.id);
            runtime.destroy();
            return;
        }
        *self.slot() = Some(runtime);
    }

    /// Runtime held by this record, if loaded and not invalidated
    pub fn runtime(&self) -> Option<Arc<dyn RuntimeInstance>> {
        self.slot().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.slot().is_some()
    }

    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(Ordering::SeqCst)
    }

    /// Destroy the runtime and release it. Safe to call more than once.
    pub fn invalidate(&self) {
        self.inner.invalidated.store(true, Ordering::SeqCst);
        let runtime = self.slot().take();
        if let Some(runtime) = runtime {
            log::info!("Invalidating app record {}", self.inner.id);
            runtime.destroy();
        }
    }
}
