//! Shared host environment
//!
//! Everything a loader needs that outlives a single `load_app` call: config,
//! the runtime registry, the experience stores, the packager probe, and the
//! one-time native library initialization.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::HostConfig;
use crate::domain::Notification;
use crate::runtime::{AlwaysReachable, BuilderRegistry, NativeModule, PackagerStatus};
use crate::storage::{ErrorRecoveryStore, MemoryMetadataStore, MemoryRecoveryStore, MetadataStore};

/// Loads the native libraries the runtime depends on
pub trait NativeLoader: Send + Sync {
    fn init(&self);
}

/// Native loader for hosts with nothing to load
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNativeLoader;

impl NativeLoader for NoopNativeLoader {
    fn init(&self) {
        log::debug!("No native libraries to load");
    }
}

/// Collaborators and settings shared by every loader in a host process
pub struct HostEnvironment {
    pub config: HostConfig,
    pub registry: BuilderRegistry,
    pub metadata: Arc<dyn MetadataStore>,
    pub recovery: Arc<dyn ErrorRecoveryStore>,
    pub packager: Arc<dyn PackagerStatus>,
    pub singleton_modules: Vec<Arc<dyn NativeModule>>,
    pub host_name: String,
    native_loader: Arc<dyn NativeLoader>,
    native_init: OnceCell<()>,
}

impl std::fmt::Debug for HostEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEnvironment")
            .field("host_name", &self.host_name)
            .field("registry", &self.registry)
            .field("singleton_modules", &self.singleton_modules)
            .field("native_initialized", &self.native_initialized())
            .finish_non_exhaustive()
    }
}

impl HostEnvironment {
    /// Environment with in-memory stores and no packager probing
    pub fn new(config: HostConfig, registry: BuilderRegistry) -> Self {
        Self {
            config,
            registry,
            metadata: Arc::new(MemoryMetadataStore::new()),
            recovery: Arc::new(MemoryRecoveryStore::new()),
            packager: Arc::new(AlwaysReachable),
            singleton_modules: Vec::new(),
            host_name: env!("CARGO_PKG_NAME").to_string(),
            native_loader: Arc::new(NoopNativeLoader),
            native_init: OnceCell::new(),
        }
    }

    pub fn with_metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata = store;
        self
    }

    pub fn with_recovery_store(mut self, store: Arc<dyn ErrorRecoveryStore>) -> Self {
        self.recovery = store;
        self
    }

    pub fn with_packager(mut self, packager: Arc<dyn PackagerStatus>) -> Self {
        self.packager = packager;
        self
    }

    pub fn with_singleton_module(mut self, module: Arc<dyn NativeModule>) -> Self {
        self.singleton_modules.push(module);
        self
    }

    pub fn with_native_loader(mut self, loader: Arc<dyn NativeLoader>) -> Self {
        self.native_loader = loader;
        self
    }

    pub fn with_host_name(mut self, name: impl Into<String>) -> Self {
        self.host_name = name.into();
        self
    }

    /// Run native initialization unless it already ran for this environment
    pub fn ensure_native_init(&self) {
        self.native_init.get_or_init(|| {
            log::info!("Initializing native libraries");
            self.native_loader.init();
        });
    }

    pub fn native_initialized(&self) -> bool {
        self.native_init.get().is_some()
    }
}

/// Per-call options for `load_app`
#[derive(Clone)]
pub struct LoadOptions {
    /// URI the app is being opened with, if any
    pub intent_uri: Option<String>,
    /// Notification that triggered the launch
    pub notification: Option<Notification>,
    /// Whether a foreground surface exists; without one no runtime is built
    pub foreground: bool,
    /// Extra native packages added to the builder
    pub packages: Vec<Arc<dyn NativeModule>>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            intent_uri: None,
            notification: None,
            foreground: true,
            packages: Vec::new(),
        }
    }
}

impl std::fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOptions")
            .field("intent_uri", &self.intent_uri)
            .field("notification", &self.notification)
            .field("foreground", &self.foreground)
            .field("packages", &self.packages)
            .finish()
    }
}

impl LoadOptions {
    pub fn with_intent_uri(mut self, uri: impl Into<String>) -> Self {
        self.intent_uri = Some(uri.into());
        self
    }

    pub fn with_notification(mut self, notification: Notification) -> Self {
        self.notification = Some(notification);
        self
    }

    pub fn with_package(mut self, module: Arc<dyn NativeModule>) -> Self {
        self.packages.push(module);
        self
    }

    /// Load without a foreground surface
    pub fn background(mut self) -> Self {
        self.foreground = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl NativeLoader for CountingLoader {
        fn init(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_native_init_runs_once() {
        let loader = Arc::new(CountingLoader::default());
        let env = HostEnvironment::new(HostConfig::default(), BuilderRegistry::new())
            .with_native_loader(loader.clone());

        assert!(!env.native_initialized());
        env.ensure_native_init();
        env.ensure_native_init();

        assert!(env.native_initialized());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_options_default_to_foreground() {
        let options = LoadOptions::default();
        assert!(options.foreground);
        assert!(!options.background().foreground);
    }
}
