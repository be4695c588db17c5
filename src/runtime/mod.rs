//! Runtime Layer - contracts for the JS runtime the host launches apps into
//!
//! This module provides:
//! - RuntimeFactory / RuntimeBuilder / RuntimeInstance traits
//! - BuilderRegistry: factories keyed by SDK version
//! - PackagerStatus: debug packager reachability probe
//! - DryRunRuntimeFactory: a runtime that only records what it was given

pub mod dry_run;
pub mod packager;
pub mod registry;
pub mod types;

pub use dry_run::{DryRunRuntime, DryRunRuntimeFactory, RuntimeEvent};
pub use packager::{AlwaysReachable, HttpPackagerStatus, PackagerStatus};
pub use registry::BuilderRegistry;
pub use types::{
    INTENT_URI_KEY, InstanceBuilderProperties, LINKING_URI_KEY, LaunchProps, MANIFEST_URL_KEY, NativeModule,
    RuntimeBuilder, RuntimeDelegate, RuntimeFactory, RuntimeInstance, TaskInvocation,
};
