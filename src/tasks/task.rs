//! Background task definitions
//!
//! A `Task` is a named unit of background work owned by one app. It never runs
//! anything itself: `execute` hands the task back to the service that owns it.

use std::sync::{Arc, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{HostError, Result};
use crate::id::task_key;
use crate::storage::HasId;

/// Task options as supplied by the app
pub type TaskOptions = Map<String, Value>;

/// Reacts to task lifecycle events for one kind of trigger
pub trait TaskConsumer: Send + Sync {
    /// Stable identifier persisted with the task and used to recreate the consumer
    fn kind(&self) -> &str;

    fn did_register(&self, _task: &Task) {}

    fn did_unregister(&self, _task: &Task) {}

    /// Options were replaced
    fn set_options(&self, _options: &TaskOptions) {}
}

/// Consumer that ignores every lifecycle event
#[derive(Debug, Clone)]
pub struct PassiveConsumer {
    kind: String,
}

impl PassiveConsumer {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

impl TaskConsumer for PassiveConsumer {
    fn kind(&self) -> &str {
        &self.kind
    }
}

/// Executes tasks on behalf of their apps
pub trait TaskService: Send + Sync {
    fn execute_task(&self, task: &Task, payload: Option<Value>, error: Option<String>) -> Result<()>;
}

/// A registered background task
pub struct Task {
    name: String,
    app_id: String,
    app_url: String,
    consumer: Arc<dyn TaskConsumer>,
    options: RwLock<TaskOptions>,
    service: Weak<dyn TaskService>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("app_id", &self.app_id)
            .field("app_url", &self.app_url)
            .field("consumer", &self.consumer.kind())
            .field("options", &self.options())
            .finish()
    }
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        app_id: impl Into<String>,
        app_url: impl Into<String>,
        consumer: Arc<dyn TaskConsumer>,
        options: TaskOptions,
        service: &Arc<dyn TaskService>,
    ) -> Self {
        Self {
            name: name.into(),
            app_id: app_id.into(),
            app_url: app_url.into(),
            consumer,
            options: RwLock::new(options),
            service: Arc::downgrade(service),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn app_url(&self) -> &str {
        &self.app_url
    }

    pub fn consumer(&self) -> &Arc<dyn TaskConsumer> {
        &self.consumer
    }

    /// Registry key: unique per (app id, name)
    pub fn key(&self) -> String {
        task_key(&self.app_id, &self.name)
    }

    pub fn options(&self) -> TaskOptions {
        self.options.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the options wholesale
    pub fn set_options(&self, options: TaskOptions) {
        self.consumer.set_options(&options);
        *self.options.write().unwrap_or_else(|e| e.into_inner()) = options;
    }

    /// JSON the platform attaches to scheduled triggers so they can find the task again
    pub fn action_config(&self) -> String {
        json!({
            "appId": self.app_id,
            "taskName": self.name,
        })
        .to_string()
    }

    /// Hand this task to its service for execution
    pub fn execute(&self, payload: Option<Value>, error: Option<String>) -> Result<()> {
        let service = self
            .service
            .upgrade()
            .ok_or_else(|| HostError::TaskServiceUnavailable(self.key()))?;
        service.execute_task(self, payload, error)
    }

    /// Persisted form of this task
    pub fn descriptor(&self, registered_at: DateTime<Utc>) -> TaskDescriptor {
        TaskDescriptor {
            id: self.key(),
            name: self.name.clone(),
            app_id: self.app_id.clone(),
            app_url: self.app_url.clone(),
            consumer_kind: self.consumer.kind().to_string(),
            options: self.options(),
            registered_at,
            updated_at: Utc::now(),
        }
    }
}

/// Stored task record, enough to rebuild the task after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// `{app_id}::{name}`
    pub id: String,
    pub name: String,
    pub app_id: String,
    pub app_url: String,
    pub consumer_kind: String,
    pub options: TaskOptions,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HasId for TaskDescriptor {
    fn id(&self) -> &str {
        &self.id
    }
}
