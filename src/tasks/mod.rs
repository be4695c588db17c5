//! Task Layer - app-scoped background tasks
//!
//! This module provides:
//! - Task / TaskConsumer / TaskService: the task model
//! - TaskRegistry: persisted registrations with restore after restart
//! - TaskExecutor: the service that delivers invocations into apps

pub mod executor;
pub mod registry;
pub mod task;

pub use executor::{LoaderFactory, TaskExecutor};
pub use registry::{ConsumerFactory, TaskRegistry};
pub use task::{PassiveConsumer, Task, TaskConsumer, TaskDescriptor, TaskOptions, TaskService};
