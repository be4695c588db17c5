//! Dry-run runtime
//!
//! A runtime that executes nothing and records every lifecycle call it
//! receives. The CLI uses it to show what a load would hand to a real
//! runtime; tests use it to observe build ordering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use super::types::{
    InstanceBuilderProperties, LaunchProps, NativeModule, RuntimeBuilder, RuntimeDelegate, RuntimeFactory,
    RuntimeInstance, TaskInvocation,
};
use crate::domain::SdkVersion;
use crate::error::{HostError, Result};

/// Something that happened to a dry-run runtime
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Built {
        instance: usize,
        sdk_version: String,
        bundle_path: String,
        experience_properties: Map<String, Value>,
        packages: Vec<String>,
        developer_support: Option<(String, String)>,
        props: LaunchProps,
    },
    ContextCreated(usize),
    Resumed(usize),
    HostDestroyed(usize),
    Destroyed(usize),
    TaskDelivered(usize, TaskInvocation),
}

type EventLog = Arc<Mutex<Vec<RuntimeEvent>>>;

fn record(log: &EventLog, event: RuntimeEvent) {
    log::debug!("dry-run runtime: {:?}", event);
    log.lock().unwrap_or_else(|e| e.into_inner()).push(event);
}

/// Factory producing dry-run runtimes for one SDK version
#[derive(Debug)]
pub struct DryRunRuntimeFactory {
    version: SdkVersion,
    events: EventLog,
    next_instance: Arc<AtomicUsize>,
    fail_builds: bool,
}

impl DryRunRuntimeFactory {
    pub fn new(version: SdkVersion) -> Self {
        Self {
            version,
            events: Arc::new(Mutex::new(Vec::new())),
            next_instance: Arc::new(AtomicUsize::new(0)),
            fail_builds: false,
        }
    }

    /// Factory whose builders refuse to build
    pub fn failing(version: SdkVersion) -> Self {
        Self {
            fail_builds: true,
            ..Self::new(version)
        }
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of instances built so far
    pub fn build_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, RuntimeEvent::Built { .. }))
            .count()
    }

    /// Launch props of the most recent build
    pub fn last_props(&self) -> Option<LaunchProps> {
        self.events().into_iter().rev().find_map(|e| match e {
            RuntimeEvent::Built { props, .. } => Some(props),
            _ => None,
        })
    }
}

impl RuntimeFactory for DryRunRuntimeFactory {
    fn sdk_version(&self) -> SdkVersion {
        self.version.clone()
    }

    fn builder(&self, props: InstanceBuilderProperties) -> Result<Box<dyn RuntimeBuilder>> {
        Ok(Box::new(DryRunBuilder {
            sdk_version: self.version.to_string(),
            props,
            packages: Vec::new(),
            developer_support: None,
            events: self.events.clone(),
            next_instance: self.next_instance.clone(),
            fail: self.fail_builds,
        }))
    }
}

struct DryRunBuilder {
    sdk_version: String,
    props: InstanceBuilderProperties,
    packages: Vec<Arc<dyn NativeModule>>,
    developer_support: Option<(String, String)>,
    events: EventLog,
    next_instance: Arc<AtomicUsize>,
    fail: bool,
}

impl RuntimeBuilder for DryRunBuilder {
    fn add_package(&mut self, module: Arc<dyn NativeModule>) {
        self.packages.push(module);
    }

    fn enable_developer_support(&mut self, debugger_host: &str, main_module_name: &str) {
        self.developer_support = Some((debugger_host.to_string(), main_module_name.to_string()));
    }

    fn build(self: Box<Self>, props: LaunchProps) -> Result<Arc<dyn RuntimeInstance>> {
        if self.fail {
            return Err(HostError::RuntimeBuild(format!(
                "dry-run builder for SDK {} configured to fail",
                self.sdk_version
            )));
        }

        let instance = self.next_instance.fetch_add(1, Ordering::SeqCst);
        let packages = self
            .props
            .singleton_modules
            .iter()
            .chain(self.packages.iter())
            .map(|m| m.name().to_string())
            .collect();
        record(
            &self.events,
            RuntimeEvent::Built {
                instance,
                sdk_version: self.sdk_version,
                bundle_path: self.props.bundle_path,
                experience_properties: self.props.experience_properties,
                packages,
                developer_support: self.developer_support,
                props,
            },
        );

        Ok(Arc::new(DryRunRuntime {
            instance,
            events: self.events,
        }))
    }
}

/// A runtime instance that only records lifecycle calls
#[derive(Debug)]
pub struct DryRunRuntime {
    instance: usize,
    events: EventLog,
}

impl RuntimeInstance for DryRunRuntime {
    fn create_context_in_background(&self) {
        record(&self.events, RuntimeEvent::ContextCreated(self.instance));
    }

    fn on_host_resume(&self, _delegate: Arc<dyn RuntimeDelegate>) {
        record(&self.events, RuntimeEvent::Resumed(self.instance));
    }

    fn on_host_destroy(&self) {
        record(&self.events, RuntimeEvent::HostDestroyed(self.instance));
    }

    fn destroy(&self) {
        record(&self.events, RuntimeEvent::Destroyed(self.instance));
    }

    fn deliver_task(&self, invocation: TaskInvocation) -> Result<()> {
        record(&self.events, RuntimeEvent::TaskDelivered(self.instance, invocation));
        Ok(())
    }
}
