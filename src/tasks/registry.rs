//! Task registry
//!
//! Holds live tasks grouped by app, mirrors every change to storage, and can
//! rebuild the live set from storage after a restart.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::task::{PassiveConsumer, Task, TaskConsumer, TaskDescriptor, TaskOptions, TaskService};
use crate::error::{HostError, Result};
use crate::id::task_key;
use crate::storage::{Filter, Storage};

const TASKS_COLLECTION: &str = "tasks";

/// Recreates consumers by the kind recorded at registration
pub trait ConsumerFactory: Send + Sync {
    fn create(&self, kind: &str) -> Option<Arc<dyn TaskConsumer>>;
}

impl<F> ConsumerFactory for F
where
    F: Fn(&str) -> Option<Arc<dyn TaskConsumer>> + Send + Sync,
{
    fn create(&self, kind: &str) -> Option<Arc<dyn TaskConsumer>> {
        self(kind)
    }
}

type AppTasks = HashMap<String, HashMap<String, Arc<Task>>>;

/// Live tasks keyed by app id, then task name
pub struct TaskRegistry<S: Storage> {
    storage: Arc<S>,
    service: Arc<dyn TaskService>,
    tasks: RwLock<AppTasks>,
}

impl<S: Storage> std::fmt::Debug for TaskRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count: usize = self.read().values().map(HashMap::len).sum();
        f.debug_struct("TaskRegistry").field("tasks", &count).finish_non_exhaustive()
    }
}

impl<S: Storage> TaskRegistry<S> {
    pub fn new(storage: Arc<S>, service: Arc<dyn TaskService>) -> Self {
        Self {
            storage,
            service,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AppTasks> {
        self.tasks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppTasks> {
        self.tasks.write().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, task: &Task) -> Result<()> {
        let existing: Option<TaskDescriptor> = self.storage.get(TASKS_COLLECTION, &task.key())?;
        let registered_at = existing.map_or_else(Utc::now, |d| d.registered_at);
        self.storage.upsert(TASKS_COLLECTION, &task.descriptor(registered_at))
    }

    /// Register a task. An existing task with the same app and name keeps its
    /// consumer and gets the new options.
    pub fn register_task(
        &self,
        name: &str,
        app_id: &str,
        app_url: &str,
        consumer: Arc<dyn TaskConsumer>,
        options: TaskOptions,
    ) -> Result<Arc<Task>> {
        if let Some(existing) = self.get_task(app_id, name) {
            log::info!("Updating options of task {}", existing.key());
            existing.set_options(options);
            self.persist(&existing)?;
            return Ok(existing);
        }

        let task = Arc::new(Task::new(name, app_id, app_url, consumer, options, &self.service));
        self.persist(&task)?;
        self.write()
            .entry(app_id.to_string())
            .or_default()
            .insert(name.to_string(), task.clone());
        task.consumer().did_register(&task);
        log::info!("Registered task {} ({})", task.key(), task.consumer().kind());
        Ok(task)
    }

    pub fn get_task(&self, app_id: &str, name: &str) -> Option<Arc<Task>> {
        self.read().get(app_id).and_then(|tasks| tasks.get(name)).cloned()
    }

    /// Like `get_task`, failing with `TaskNotFound`
    pub fn task(&self, app_id: &str, name: &str) -> Result<Arc<Task>> {
        self.get_task(app_id, name).ok_or_else(|| HostError::TaskNotFound {
            app_id: app_id.to_string(),
            name: name.to_string(),
        })
    }

    /// Live tasks of one app, sorted by name
    pub fn tasks_for_app(&self, app_id: &str) -> Vec<Arc<Task>> {
        let mut tasks: Vec<Arc<Task>> = self
            .read()
            .get(app_id)
            .map(|tasks| tasks.values().cloned().collect())
            .unwrap_or_default();
        tasks.sort_by(|a, b| a.name().cmp(b.name()));
        tasks
    }

    pub fn has_task(&self, app_id: &str, name: &str) -> bool {
        self.get_task(app_id, name).is_some()
    }

    pub fn unregister_task(&self, app_id: &str, name: &str) -> Result<()> {
        let removed = {
            let mut tasks = self.write();
            let removed = tasks.get_mut(app_id).and_then(|app| app.remove(name));
            if tasks.get(app_id).is_some_and(HashMap::is_empty) {
                tasks.remove(app_id);
            }
            removed
        };
        let task = removed.ok_or_else(|| HostError::TaskNotFound {
            app_id: app_id.to_string(),
            name: name.to_string(),
        })?;

        self.storage.delete(TASKS_COLLECTION, &task_key(app_id, name))?;
        task.consumer().did_unregister(&task);
        log::info!("Unregistered task {}", task.key());
        Ok(())
    }

    /// Unregister every task of an app; returns how many were removed
    pub fn unregister_all_for_app(&self, app_id: &str) -> Result<usize> {
        let removed = self.write().remove(app_id).unwrap_or_default();
        for task in removed.values() {
            self.storage.delete(TASKS_COLLECTION, &task.key())?;
            task.consumer().did_unregister(task);
        }
        if !removed.is_empty() {
            log::info!("Unregistered {} task(s) of {}", removed.len(), app_id);
        }
        Ok(removed.len())
    }

    /// Stored descriptors, optionally for one app
    pub fn descriptors(&self, app_id: Option<&str>) -> Result<Vec<TaskDescriptor>> {
        let mut descriptors: Vec<TaskDescriptor> = match app_id {
            Some(app_id) => self.storage.query(TASKS_COLLECTION, &[Filter::eq("app_id", app_id)])?,
            None => self.storage.list(TASKS_COLLECTION)?,
        };
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(descriptors)
    }

    /// Rebuild live tasks from storage. Kinds the factory does not know get a
    /// passive consumer. Returns the number of tasks restored.
    pub fn restore(&self, factory: &dyn ConsumerFactory) -> Result<usize> {
        let mut restored = 0;
        for descriptor in self.descriptors(None)? {
            if self.has_task(&descriptor.app_id, &descriptor.name) {
                continue;
            }
            let consumer = factory.create(&descriptor.consumer_kind).unwrap_or_else(|| {
                log::warn!(
                    "No consumer for kind '{}' (task {}); restoring as passive",
                    descriptor.consumer_kind,
                    descriptor.id
                );
                Arc::new(PassiveConsumer::new(descriptor.consumer_kind.clone()))
            });
            let task = Arc::new(Task::new(
                descriptor.name.clone(),
                descriptor.app_id.clone(),
                descriptor.app_url,
                consumer,
                descriptor.options,
                &self.service,
            ));
            self.write()
                .entry(descriptor.app_id)
                .or_default()
                .insert(descriptor.name, task.clone());
            task.consumer().did_register(&task);
            restored += 1;
        }
        log::info!("Restored {} task(s) from storage", restored);
        Ok(restored)
    }
}
