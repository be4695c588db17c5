//! Core runtime types and trait definitions

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Manifest, SdkVersion};
use crate::error::Result;

/// Experience property: URL the manifest was fetched from
pub const MANIFEST_URL_KEY: &str = "manifestUrl";
/// Experience property: base URI the app uses to build deep links
pub const LINKING_URI_KEY: &str = "linkingUri";
/// Experience property: URI the app was launched with
pub const INTENT_URI_KEY: &str = "intentUri";

/// A native module exposed to the JS side of the runtime
pub trait NativeModule: Send + Sync {
    fn name(&self) -> &str;
}

impl fmt::Debug for dyn NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeModule({})", self.name())
    }
}

/// Capabilities the loader exposes to the runtime-start procedure
pub trait RuntimeDelegate: Send + Sync {
    /// False when there is no foreground surface; runtime start then skips the build
    fn is_in_foreground(&self) -> bool;

    fn is_debug_mode_enabled(&self) -> bool;

    /// Called with the unread remote notification backlog consumed at launch
    fn handle_unread_notifications(&self, unread: &[Value]);
}

/// Everything a versioned factory needs to produce a builder
#[derive(Clone)]
pub struct InstanceBuilderProperties {
    /// Name of the hosting application
    pub host_name: String,
    /// Local bundle path; empty in debug mode, where the packager serves it
    pub bundle_path: String,
    /// `manifestUrl`, `linkingUri`, `intentUri`
    pub experience_properties: Map<String, Value>,
    pub manifest: Manifest,
    pub singleton_modules: Vec<Arc<dyn NativeModule>>,
    pub delegate: Arc<dyn RuntimeDelegate>,
}

impl fmt::Debug for InstanceBuilderProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceBuilderProperties")
            .field("host_name", &self.host_name)
            .field("bundle_path", &self.bundle_path)
            .field("experience_properties", &self.experience_properties)
            .field("singleton_modules", &self.singleton_modules.len())
            .finish_non_exhaustive()
    }
}

/// Initial props handed to the app's root component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchProps {
    /// The `exp` prop bag: manifest, shell flag, initial URI, recovery state, backlog
    pub exp: Map<String, Value>,
    /// Raw notification body, kept at top level for older apps
    pub notification: Option<String>,
}

/// A task invocation delivered into a running app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    pub task_name: String,
    pub app_id: String,
    pub payload: Option<Value>,
    pub error: Option<String>,
}

/// Versioned entry point: turns builder properties into a builder
pub trait RuntimeFactory: Send + Sync {
    fn sdk_version(&self) -> SdkVersion;

    fn builder(&self, props: InstanceBuilderProperties) -> Result<Box<dyn RuntimeBuilder>>;
}

/// Accumulates configuration for one runtime instance
pub trait RuntimeBuilder: Send {
    fn add_package(&mut self, module: Arc<dyn NativeModule>);

    /// Point the runtime at a development packager
    fn enable_developer_support(&mut self, debugger_host: &str, main_module_name: &str);

    fn build(self: Box<Self>, props: LaunchProps) -> Result<Arc<dyn RuntimeInstance>>;
}

/// A built runtime instance
pub trait RuntimeInstance: Send + Sync {
    /// Start creating the JS context without waiting for it
    fn create_context_in_background(&self);

    fn on_host_resume(&self, delegate: Arc<dyn RuntimeDelegate>);

    fn on_host_destroy(&self);

    /// Tear down the instance for good
    fn destroy(&self);

    /// Deliver a background task invocation to the app
    fn deliver_task(&self, invocation: TaskInvocation) -> Result<()>;
}
