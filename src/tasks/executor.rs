//! Task executor
//!
//! The task service used by registered tasks. An invocation for an app whose
//! runtime is up goes straight to it. Otherwise the app is loaded headlessly
//! and invocations queue until the load finishes: they are delivered in order
//! on success and dropped on failure.
//!
//! Every app gets its own `HeadlessAppLoader`. A loader keeps a single live
//! runtime and tears it down on its next load, so sharing one between apps
//! would destroy the first app when the second loads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use super::task::{Task, TaskService};
use crate::error::Result;
use crate::loader::{AppRecord, HeadlessAppLoader, LoadOptions};
use crate::runtime::TaskInvocation;

/// Creates the loader an app is loaded through
pub trait LoaderFactory: Send + Sync {
    fn create(&self) -> HeadlessAppLoader;
}

impl<F> LoaderFactory for F
where
    F: Fn() -> HeadlessAppLoader + Send + Sync,
{
    fn create(&self) -> HeadlessAppLoader {
        self()
    }
}

enum AppSlot {
    /// Load in flight; invocations wait here
    Loading(Vec<TaskInvocation>),
    Running(AppRecord),
}

type Apps = Arc<Mutex<HashMap<String, AppSlot>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Delivers task invocations, loading apps on demand
pub struct TaskExecutor {
    loader_factory: Box<dyn LoaderFactory>,
    loaders: Mutex<HashMap<String, Arc<HeadlessAppLoader>>>,
    apps: Apps,
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("running", &self.running_apps())
            .finish_non_exhaustive()
    }
}

impl TaskExecutor {
    pub fn new(loader_factory: impl LoaderFactory + 'static) -> Self {
        Self {
            loader_factory: Box::new(loader_factory),
            loaders: Mutex::new(HashMap::new()),
            apps: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// App ids with a running runtime, sorted
    pub fn running_apps(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.apps)
            .iter()
            .filter(|(_, slot)| matches!(slot, AppSlot::Running(record) if record.is_loaded()))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_loading(&self, app_id: &str) -> bool {
        matches!(lock(&self.apps).get(app_id), Some(AppSlot::Loading(_)))
    }

    /// Tear down an app's runtime; the next invocation loads it again
    pub fn invalidate_app(&self, app_id: &str) -> bool {
        let slot = lock(&self.apps).remove(app_id);
        match slot {
            Some(AppSlot::Running(record)) => {
                tracing::info!(app_id = %app_id, record = %record.id(), "Invalidating app");
                record.invalidate();
                true
            }
            Some(loading @ AppSlot::Loading(_)) => {
                // Leave in-flight loads alone
                lock(&self.apps).insert(app_id.to_string(), loading);
                false
            }
            None => false,
        }
    }

    /// The app's own loader, created on first use
    fn loader_for(&self, app_id: &str) -> Arc<HeadlessAppLoader> {
        lock(&self.loaders)
            .entry(app_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(app_id = %app_id, "Creating loader");
                Arc::new(self.loader_factory.create())
            })
            .clone()
    }

    fn start_load(&self, app_id: &str, app_url: &str) {
        tracing::info!(app_id = %app_id, url = %app_url, "Loading app for task execution");

        let record = AppRecord::new();
        let apps = self.apps.clone();
        let app_id_owned = app_id.to_string();
        let completed_record = record.clone();

        self.loader_for(app_id)
            .load_app_into(record, app_url, LoadOptions::default(), move |result| {
                let app_id = app_id_owned;
                match result {
                    Ok(()) => {
                        let queued = match lock(&apps).insert(app_id.clone(), AppSlot::Running(completed_record.clone())) {
                            Some(AppSlot::Loading(queued)) => queued,
                            _ => Vec::new(),
                        };
                        tracing::info!(app_id = %app_id, queued = queued.len(), "App loaded; flushing invocations");
                        for invocation in queued {
                            deliver(&app_id, &completed_record, invocation);
                        }
                    }
                    Err(error) => {
                        let dropped = match lock(&apps).remove(&app_id) {
                            Some(AppSlot::Loading(queued)) => queued.len(),
                            _ => 0,
                        };
                        tracing::error!(
                            app_id = %app_id,
                            error = %error,
                            dropped = dropped,
                            "App load failed; dropping queued invocations"
                        );
                    }
                }
            });
    }
}

fn deliver(app_id: &str, record: &AppRecord, invocation: TaskInvocation) {
    let task_name = invocation.task_name.clone();
    let Some(runtime) = record.runtime() else {
        tracing::warn!(app_id = %app_id, task = %task_name, "App has no runtime; dropping invocation");
        return;
    };
    match runtime.deliver_task(invocation) {
        Ok(()) => tracing::debug!(app_id = %app_id, task = %task_name, "Task delivered"),
        Err(e) => tracing::error!(app_id = %app_id, task = %task_name, error = %e, "Task delivery failed"),
    }
}

impl TaskService for TaskExecutor {
    fn execute_task(&self, task: &Task, payload: Option<Value>, error: Option<String>) -> Result<()> {
        let invocation = TaskInvocation {
            task_name: task.name().to_string(),
            app_id: task.app_id().to_string(),
            payload,
            error,
        };

        let running = {
            let mut apps = lock(&self.apps);
            let running = match apps.get_mut(task.app_id()) {
                Some(AppSlot::Loading(queue)) => {
                    tracing::debug!(app_id = %task.app_id(), task = %task.name(), "Queued behind loading app");
                    queue.push(invocation);
                    return Ok(());
                }
                Some(AppSlot::Running(record)) if record.is_loaded() => Some(record.clone()),
                _ => None,
            };
            if running.is_none() {
                apps.insert(task.app_id().to_string(), AppSlot::Loading(vec![invocation.clone()]));
            }
            running
        };

        match running {
            Some(record) => deliver(task.app_id(), &record, invocation),
            None => self.start_load(task.app_id(), task.app_url()),
        }
        Ok(())
    }
}
