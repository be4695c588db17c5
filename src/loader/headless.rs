//! Headless app loader
//!
//! Drives one app from manifest URL to running runtime without a visible
//! surface. Manifest and bundle arrive from the fetcher in either order; the
//! bundle path is parked behind the load's `readyForBundle` gate condition
//! until manifest processing has finished, so the runtime is started exactly
//! once.
//!
//! All state mutation happens on the main context. Fetch callbacks only post
//! jobs there.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use super::environment::{HostEnvironment, LoadOptions};
use super::linking::linking_uri;
use super::props::{LaunchContext, assemble_launch_props};
use super::record::AppRecord;
use crate::coordination::{AsyncGate, MainContext, run_on_main};
use crate::domain::{LoaderPhase, LoaderState, Manifest, SdkVersion};
use crate::error::{HostError, Result};
use crate::fetch::{AppFetcher, FetchListener, to_http};
use crate::id::generate_session_id;
use crate::runtime::{
    INTENT_URI_KEY, InstanceBuilderProperties, LINKING_URI_KEY, MANIFEST_URL_KEY, RuntimeDelegate,
    RuntimeInstance,
};

/// Gate condition: manifest processing finished and a bundle may run
pub const READY_FOR_BUNDLE: &str = "readyForBundle";

/// `readyForBundle` condition name for one load. Loads sharing a gate never
/// touch each other's waiter.
pub fn ready_for_bundle_condition(session_id: &str) -> String {
    format!("{}:{}", READY_FOR_BUNDLE, session_id)
}

/// Called exactly once with the outcome of a `load_app` call
pub type Completion = Box<dyn FnOnce(Result<()>) + Send + 'static>;

type RuntimeSlot = Arc<Mutex<Option<Arc<dyn RuntimeInstance>>>>;

/// Loads apps into runtimes, one `LoaderState` per `load_app` call
pub struct HeadlessAppLoader {
    env: Arc<HostEnvironment>,
    fetcher: Arc<dyn AppFetcher>,
    main: Arc<dyn MainContext>,
    gate: Arc<AsyncGate>,
    handle: Option<Handle>,
    current_runtime: RuntimeSlot,
    last_state: Mutex<Option<Arc<Mutex<LoaderState>>>>,
}

impl std::fmt::Debug for HeadlessAppLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessAppLoader")
            .field("env", &self.env)
            .field("gate", &self.gate)
            .field("has_runtime", &self.current_runtime().is_some())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl HeadlessAppLoader {
    /// Create a loader. Picks up the ambient tokio runtime, if any, for the
    /// debug packager probe.
    pub fn new(env: Arc<HostEnvironment>, fetcher: Arc<dyn AppFetcher>, main: Arc<dyn MainContext>) -> Self {
        Self {
            env,
            fetcher,
            main,
            gate: Arc::new(AsyncGate::new()),
            handle: Handle::try_current().ok(),
            current_runtime: Arc::new(Mutex::new(None)),
            last_state: Mutex::new(None),
        }
    }

    /// Use an explicit tokio runtime for async work
    pub fn with_runtime_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Share a gate with other components
    pub fn with_gate(mut self, gate: Arc<AsyncGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn environment(&self) -> &Arc<HostEnvironment> {
        &self.env
    }

    pub fn gate(&self) -> &Arc<AsyncGate> {
        &self.gate
    }

    /// Runtime built by the most recent successful load, until the next load replaces it
    pub fn current_runtime(&self) -> Option<Arc<dyn RuntimeInstance>> {
        lock(&self.current_runtime).clone()
    }

    /// Snapshot of the most recent call's state
    pub fn state_snapshot(&self) -> Option<LoaderState> {
        lock(&self.last_state).as_ref().map(|state| lock(state).clone())
    }

    /// Start loading `manifest_url`. Returns the record immediately; `on_complete`
    /// fires once the runtime is running or the load has failed.
    pub fn load_app<F>(&self, manifest_url: &str, options: LoadOptions, on_complete: F) -> AppRecord
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let record = AppRecord::new();
        self.load_app_into(record.clone(), manifest_url, options, on_complete);
        record
    }

    /// `load_app` populating a record the caller created up front, so the
    /// completion callback can already hold it
    pub fn load_app_into<F>(&self, record: AppRecord, manifest_url: &str, options: LoadOptions, on_complete: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let mut state = LoaderState::new(generate_session_id(), manifest_url);
        state.intent_uri = options.intent_uri.clone();
        log::info!(
            "[{}] Loading {} into record {}",
            state.session_id,
            manifest_url,
            record.id()
        );
        state.transition(LoaderPhase::ManifestFetching);

        let bundle_condition = ready_for_bundle_condition(&state.session_id);
        let state = Arc::new(Mutex::new(state));
        *lock(&self.last_state) = Some(state.clone());

        let session = Arc::new(LoadSession {
            env: self.env.clone(),
            main: self.main.clone(),
            gate: self.gate.clone(),
            bundle_condition,
            handle: self.handle.clone(),
            current_runtime: self.current_runtime.clone(),
            state,
            options,
            record,
            completion: Mutex::new(Some(Box::new(on_complete))),
        });

        self.fetcher.start(manifest_url, Arc::new(SessionListener { session }));
    }

    /// `load_app` as a future resolving to the record once the load finished
    pub async fn load(&self, manifest_url: &str, options: LoadOptions) -> Result<AppRecord> {
        let (tx, rx) = oneshot::channel();
        let record = self.load_app(manifest_url, options, move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .map_err(|_| HostError::InvalidState("load dropped before completing".to_string()))??;
        Ok(record)
    }
}

/// State and collaborators for one `load_app` call
struct LoadSession {
    env: Arc<HostEnvironment>,
    main: Arc<dyn MainContext>,
    gate: Arc<AsyncGate>,
    bundle_condition: String,
    handle: Option<Handle>,
    current_runtime: RuntimeSlot,
    state: Arc<Mutex<LoaderState>>,
    options: LoadOptions,
    record: AppRecord,
    completion: Mutex<Option<Completion>>,
}

impl LoadSession {
    fn state(&self) -> MutexGuard<'_, LoaderState> {
        lock(&self.state)
    }

    fn complete(&self, result: Result<()>) {
        let completion = lock(&self.completion).take();
        match completion {
            Some(callback) => callback(result),
            None => log::debug!("[{}] Completion already reported", self.state().session_id),
        }
    }

    fn fail(&self, error: HostError) {
        {
            let mut state = self.state();
            log::error!("[{}] Load of {} failed: {}", state.session_id, state.manifest_url, error);
            state.transition(LoaderPhase::Failed);
        }
        self.gate.remove(&self.bundle_condition);
        self.complete(Err(error));
    }

    fn is_finished(&self) -> bool {
        self.state().phase.is_terminal()
    }

    fn handle_manifest(self: &Arc<Self>, manifest: Manifest) {
        {
            let state = self.state();
            if state.phase != LoaderPhase::ManifestFetching {
                log::warn!(
                    "[{}] Ignoring manifest delivered in phase {:?}",
                    state.session_id,
                    state.phase
                );
                return;
            }
        }

        match self.accept_manifest(manifest) {
            Ok(debug) => self.after_manifest(debug),
            Err(e) => self.fail(e),
        }
    }

    /// Validate the manifest and record everything derived from it.
    ///
    /// Returns whether debug mode is on.
    fn accept_manifest(&self, manifest: Manifest) -> Result<bool> {
        let config = &self.env.config;
        let manifest_url = self.state().manifest_url.clone();

        let bundle_url = to_http(&manifest.bundle_url()?);

        let declared = manifest.sdk_version();
        let sdk_version = if config.temporary_version.as_deref() == Some(declared.as_str()) {
            SdkVersion::Unversioned
        } else {
            SdkVersion::parse(&declared).map_err(|_| HostError::UnsupportedVersion(declared.clone()))?
        };
        if !config.supports(&sdk_version) {
            return Err(HostError::UnsupportedVersion(declared));
        }
        let detach_sdk_version = if config.detached {
            SdkVersion::Unversioned
        } else {
            sdk_version.clone()
        };

        self.env.ensure_native_init();

        let experience_id = manifest.experience_id()?;

        let is_initial = |uri: &str| config.initial_url.as_deref() == Some(uri);
        let mut state = self.state();
        if state.intent_uri.as_deref().is_none_or(is_initial) {
            state.intent_uri = Some(match &config.shell_app_scheme {
                Some(scheme) => format!("{}://", scheme),
                None => manifest_url.clone(),
            });
        }
        state.is_shell_app = is_initial(&manifest_url);
        state.debug_mode = manifest.is_debug_mode_enabled();
        state.bundle_url = Some(bundle_url);
        state.sdk_version = Some(sdk_version);
        state.detach_sdk_version = Some(detach_sdk_version);
        state.experience_id = Some(experience_id);
        state.manifest = Some(manifest);
        state.transition(LoaderPhase::ManifestReady);
        log::info!(
            "[{}] Manifest accepted: sdk={:?} debug={} shell={}",
            state.session_id,
            state.sdk_version,
            state.debug_mode,
            state.is_shell_app
        );
        Ok(state.debug_mode)
    }

    fn after_manifest(self: &Arc<Self>, debug: bool) {
        // One live runtime per loader: the previous one goes before anything new is built
        let previous = lock(&self.current_runtime).take();
        if let Some(previous) = previous {
            log::info!("[{}] Tearing down previous runtime", self.state().session_id);
            previous.on_host_destroy();
        }

        if debug {
            {
                let mut state = self.state();
                state.bundle_path = Some(String::new());
                state.transition(LoaderPhase::DebugStart);
            }
            // A bundle delivered ahead of a debug manifest is never used
            self.gate.remove(&self.bundle_condition);
            self.start_runtime();
        } else {
            {
                let mut state = self.state();
                state.ready_for_bundle = true;
                state.transition(LoaderPhase::WaitingForBundle);
            }
            self.gate.notify(&self.bundle_condition);
        }
    }

    fn handle_bundle(self: &Arc<Self>, local_path: String) {
        {
            let state = self.state();
            if state.phase.is_terminal() {
                log::debug!("[{}] Ignoring bundle after load finished", state.session_id);
                return;
            }
            if state.debug_mode {
                log::debug!("[{}] Debug mode: packager serves the bundle", state.session_id);
                return;
            }
        }

        let state = self.state.clone();
        let session = self.clone();
        self.gate.wait(
            &self.bundle_condition,
            move || lock(&state).ready_for_bundle,
            move || {
                {
                    let mut state = session.state();
                    state.bundle_path = Some(local_path);
                    state.transition(LoaderPhase::BundleReady);
                }
                session.start_runtime();
            },
        );
    }

    fn handle_fetch_error(&self, error: HostError) {
        if self.is_finished() {
            log::debug!("Ignoring fetch error after load finished: {}", error);
            return;
        }
        let error = match error {
            e if e.is_load_terminal() => e,
            other => HostError::Fetch(other.to_string()),
        };
        self.fail(error);
    }

    fn start_runtime(self: &Arc<Self>) {
        let (debug, manifest) = {
            let mut state = self.state();
            state.transition(LoaderPhase::RuntimeStarting);
            (state.debug_mode, state.manifest.clone())
        };

        if !debug {
            self.build_and_report();
            return;
        }

        let Some(manifest) = manifest else {
            self.fail(HostError::InvalidState("runtime start without a manifest".to_string()));
            return;
        };
        let Some(handle) = self.handle.clone() else {
            self.fail(HostError::InvalidState(
                "no async runtime available to probe the packager".to_string(),
            ));
            return;
        };

        let session = self.clone();
        let packager = self.env.packager.clone();
        handle.spawn(async move {
            let status = packager.check(&manifest).await;
            let main = session.main.clone();
            run_on_main(&main, move || match status {
                Ok(()) => session.build_and_report(),
                Err(e) => session.fail(e),
            });
        });
    }

    fn build_and_report(&self) {
        match self.build_runtime() {
            Ok(()) => self.complete(Ok(())),
            Err(e) => self.fail(e),
        }
    }

    fn build_runtime(&self) -> Result<()> {
        let env = &self.env;
        let snapshot = self.state().clone();
        let missing = |what: &str| HostError::InvalidState(format!("runtime start without {}", what));
        let manifest = snapshot.manifest.as_ref().ok_or_else(|| missing("a manifest"))?;
        let sdk_version = snapshot.sdk_version.as_ref().ok_or_else(|| missing("an SDK version"))?;
        let detach_sdk_version = snapshot
            .detach_sdk_version
            .as_ref()
            .ok_or_else(|| missing("a detach SDK version"))?;
        let experience_id = snapshot.experience_id.as_ref().ok_or_else(|| missing("an experience id"))?;

        let factory = env
            .registry
            .get(detach_sdk_version)
            .ok_or_else(|| HostError::UnsupportedVersion(detach_sdk_version.to_string()))?;

        let mut experience_properties = Map::new();
        experience_properties.insert(
            MANIFEST_URL_KEY.to_string(),
            Value::String(snapshot.manifest_url.clone()),
        );
        experience_properties.insert(
            LINKING_URI_KEY.to_string(),
            Value::String(linking_uri(&env.config, &snapshot.manifest_url, sdk_version)),
        );
        experience_properties.insert(
            INTENT_URI_KEY.to_string(),
            snapshot.intent_uri.clone().map_or(Value::Null, Value::String),
        );

        let delegate = Arc::new(LoaderDelegate {
            session_id: snapshot.session_id.clone(),
            foreground: self.options.foreground,
            debug_mode: snapshot.debug_mode,
        });

        let mut builder = factory.builder(InstanceBuilderProperties {
            host_name: env.host_name.clone(),
            bundle_path: snapshot.bundle_path.clone().unwrap_or_default(),
            experience_properties,
            manifest: manifest.clone(),
            singleton_modules: env.singleton_modules.clone(),
            delegate: delegate.clone(),
        })?;

        for package in &self.options.packages {
            builder.add_package(package.clone());
        }

        if delegate.is_debug_mode_enabled() {
            builder.enable_developer_support(&manifest.debugger_host(), &manifest.main_module_name());
        }

        let props = assemble_launch_props(
            &env.config,
            env.metadata.as_ref(),
            env.recovery.as_ref(),
            delegate.as_ref(),
            LaunchContext {
                experience_id,
                manifest,
                sdk_version: detach_sdk_version,
                is_shell_app: snapshot.is_shell_app,
                intent_uri: snapshot.intent_uri.as_deref(),
                notification: self.options.notification.as_ref(),
            },
        );

        if !delegate.is_in_foreground() {
            log::info!(
                "[{}] No foreground surface; skipping runtime build",
                snapshot.session_id
            );
            self.state().transition(LoaderPhase::RuntimeRunning);
            return Ok(());
        }

        let runtime = builder.build(props)?;
        runtime.create_context_in_background();
        runtime.on_host_resume(delegate);

        *lock(&self.current_runtime) = Some(runtime.clone());
        self.record.set_runtime(runtime);

        let mut state = self.state();
        state.transition(LoaderPhase::RuntimeRunning);
        log::info!(
            "[{}] Runtime running for {} (record {})",
            state.session_id,
            experience_id,
            self.record.id()
        );
        Ok(())
    }
}

/// Fetch listener that marshals every callback onto the main context
struct SessionListener {
    session: Arc<LoadSession>,
}

impl FetchListener for SessionListener {
    fn on_manifest_ready(&self, manifest: Manifest) {
        let session = self.session.clone();
        run_on_main(&self.session.main, move || session.handle_manifest(manifest));
    }

    fn on_bundle_ready(&self, local_path: String) {
        let session = self.session.clone();
        run_on_main(&self.session.main, move || session.handle_bundle(local_path));
    }

    fn on_error(&self, error: HostError) {
        let session = self.session.clone();
        run_on_main(&self.session.main, move || session.handle_fetch_error(error));
    }
}

/// Delegate handed to the runtime for one load
struct LoaderDelegate {
    session_id: String,
    foreground: bool,
    debug_mode: bool,
}

impl RuntimeDelegate for LoaderDelegate {
    fn is_in_foreground(&self) -> bool {
        self.foreground
    }

    fn is_debug_mode_enabled(&self) -> bool {
        self.debug_mode
    }

    fn handle_unread_notifications(&self, unread: &[Value]) {
        log::info!(
            "[{}] Delivering {} unread remote notification(s) at launch",
            self.session_id,
            unread.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::coordination::InlineContext;
    use crate::fetch::ManualFetcher;
    use crate::runtime::{BuilderRegistry, DryRunRuntimeFactory, PackagerStatus, RuntimeEvent};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    type Outcome = Arc<Mutex<Vec<std::result::Result<(), String>>>>;

    struct Harness {
        loader: HeadlessAppLoader,
        fetcher: Arc<ManualFetcher>,
        factory: Arc<DryRunRuntimeFactory>,
        outcomes: Outcome,
    }

    struct DownPackager;

    #[async_trait]
    impl PackagerStatus for DownPackager {
        async fn check(&self, _manifest: &Manifest) -> Result<()> {
            Err(HostError::PackagerUnreachable("connection refused".to_string()))
        }
    }

    fn harness(config: HostConfig) -> Harness {
        harness_with(config, |env| env)
    }

    fn harness_with(config: HostConfig, customize: impl FnOnce(HostEnvironment) -> HostEnvironment) -> Harness {
        let factory = Arc::new(DryRunRuntimeFactory::new(SdkVersion::numbered(28, 0, 0)));
        let registry = BuilderRegistry::new()
            .with(factory.clone())
            .with(Arc::new(DryRunRuntimeFactory::new(SdkVersion::Unversioned)));
        let env = Arc::new(customize(HostEnvironment::new(config, registry)));
        let fetcher = Arc::new(ManualFetcher::new());
        let loader = HeadlessAppLoader::new(env, fetcher.clone(), Arc::new(InlineContext));
        Harness {
            loader,
            fetcher,
            factory,
            outcomes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    impl Harness {
        fn load(&self, url: &str, options: LoadOptions) -> AppRecord {
            let outcomes = self.outcomes.clone();
            self.loader.load_app(url, options, move |result| {
                outcomes.lock().unwrap().push(result.map_err(|e| e.to_string()));
            })
        }

        fn listener(&self) -> Arc<dyn FetchListener> {
            self.fetcher.last_listener().unwrap()
        }

        fn outcomes(&self) -> Vec<std::result::Result<(), String>> {
            self.outcomes.lock().unwrap().clone()
        }

        fn phase(&self) -> LoaderPhase {
            self.loader.state_snapshot().unwrap().phase
        }
    }

    fn manifest(value: Value) -> Manifest {
        Manifest::from_value(value).unwrap()
    }

    fn debug_manifest() -> Manifest {
        manifest(json!({
            "id": "@user/app",
            "sdkVersion": "28.0.0",
            "bundleUrl": "http://localhost:19000/bundle",
            "developer": {"tool": "cli"},
            "packagerOpts": {"dev": true},
            "debuggerHost": "localhost:19001",
            "mainModuleName": "index"
        }))
    }

    fn release_manifest() -> Manifest {
        manifest(json!({
            "id": "@user/app",
            "sdkVersion": "28.0.0",
            "bundleUrl": "exps://exp.host/@user/app/bundle"
        }))
    }

    #[test]
    fn test_manifest_then_bundle_builds_once() {
        let h = harness(HostConfig::default());
        let record = h.load("https://exp.host/@user/app", LoadOptions::default());
        assert_eq!(h.phase(), LoaderPhase::ManifestFetching);

        h.listener().on_manifest_ready(release_manifest());
        assert_eq!(h.phase(), LoaderPhase::WaitingForBundle);
        assert_eq!(h.factory.build_count(), 0);

        h.listener().on_bundle_ready("/cache/app.bundle".to_string());

        assert_eq!(h.factory.build_count(), 1);
        assert_eq!(h.outcomes(), vec![Ok(())]);
        assert_eq!(h.phase(), LoaderPhase::RuntimeRunning);
        assert!(record.is_loaded());

        let state = h.loader.state_snapshot().unwrap();
        assert_eq!(state.bundle_url.as_deref(), Some("https://exp.host/@user/app/bundle"));
        assert_eq!(state.bundle_path.as_deref(), Some("/cache/app.bundle"));
    }

    #[test]
    fn test_bundle_then_manifest_builds_once() {
        let h = harness(HostConfig::default());
        let record = h.load("https://exp.host/@user/app", LoadOptions::default());

        h.listener().on_bundle_ready("/cache/app.bundle".to_string());
        assert_eq!(h.factory.build_count(), 0);
        assert_eq!(h.phase(), LoaderPhase::ManifestFetching);

        h.listener().on_manifest_ready(release_manifest());

        assert_eq!(h.factory.build_count(), 1);
        assert_eq!(h.outcomes(), vec![Ok(())]);
        assert!(record.is_loaded());
        match &h.factory.events()[0] {
            RuntimeEvent::Built {
                bundle_path,
                experience_properties,
                ..
            } => {
                assert_eq!(bundle_path, "/cache/app.bundle");
                assert_eq!(
                    experience_properties[LINKING_URI_KEY],
                    json!("https://exp.host/@user/app/--/")
                );
                assert_eq!(
                    experience_properties[INTENT_URI_KEY],
                    json!("https://exp.host/@user/app")
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_runtime_lifecycle_order() {
        let h = harness(HostConfig::default());
        h.load("https://exp.host/@user/app", LoadOptions::default());
        h.listener().on_manifest_ready(release_manifest());
        h.listener().on_bundle_ready("/cache/app.bundle".to_string());

        let events = h.factory.events();
        assert!(matches!(events[0], RuntimeEvent::Built { .. }));
        assert_eq!(events[1], RuntimeEvent::ContextCreated(0));
        assert_eq!(events[2], RuntimeEvent::Resumed(0));
    }

    #[test]
    fn test_unsupported_version_fails_without_build() {
        let h = harness(HostConfig::default());
        let record = h.load("https://exp.host/@user/app", LoadOptions::default());

        h.listener().on_manifest_ready(manifest(json!({
            "id": "@user/app",
            "sdkVersion": "5.0.0",
            "bundleUrl": "https://exp.host/bundle"
        })));
        h.listener().on_bundle_ready("/cache/app.bundle".to_string());

        assert_eq!(h.outcomes(), vec![Err("5.0.0 is not a valid SDK version.".to_string())]);
        assert_eq!(h.phase(), LoaderPhase::Failed);
        assert_eq!(h.factory.build_count(), 0);
        assert!(!record.is_loaded());
    }

    #[test]
    fn test_missing_bundle_url_is_manifest_error() {
        let h = harness(HostConfig::default());
        h.load("https://exp.host/@user/app", LoadOptions::default());
        h.listener()
            .on_manifest_ready(manifest(json!({"id": "@user/app", "sdkVersion": "28.0.0"})));

        let outcomes = h.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].as_ref().unwrap_err().starts_with("Manifest error"));
        assert_eq!(h.factory.build_count(), 0);
    }

    #[test]
    fn test_missing_id_is_manifest_error() {
        let h = harness(HostConfig::default());
        h.load("https://exp.host/@user/app", LoadOptions::default());
        h.listener().on_manifest_ready(manifest(json!({
            "sdkVersion": "28.0.0",
            "bundleUrl": "https://exp.host/bundle"
        })));

        assert!(h.outcomes()[0].as_ref().unwrap_err().contains("'id'"));
        assert!(h.loader.environment().native_initialized());
    }

    #[test]
    fn test_temporary_version_maps_to_unversioned() {
        let h = harness(HostConfig::default().with_temporary_version("31.0.0"));
        h.load("https://exp.host/@user/app", LoadOptions::default());
        h.listener().on_manifest_ready(manifest(json!({
            "id": "@user/app",
            "sdkVersion": "31.0.0",
            "bundleUrl": "https://exp.host/bundle"
        })));
        h.listener().on_bundle_ready("/b".to_string());

        assert_eq!(h.outcomes(), vec![Ok(())]);
        let state = h.loader.state_snapshot().unwrap();
        assert_eq!(state.sdk_version, Some(SdkVersion::Unversioned));
        // Built by the unversioned factory, not the 28.0.0 one
        assert_eq!(h.factory.build_count(), 0);
    }

    #[test]
    fn test_detached_host_uses_unversioned_runtime() {
        let h = harness(HostConfig::default().with_detached(true));
        h.load("https://exp.host/@user/app", LoadOptions::default());
        h.listener().on_manifest_ready(release_manifest());
        h.listener().on_bundle_ready("/b".to_string());

        let state = h.loader.state_snapshot().unwrap();
        assert_eq!(state.sdk_version, Some(SdkVersion::numbered(28, 0, 0)));
        assert_eq!(state.detach_sdk_version, Some(SdkVersion::Unversioned));
        assert_eq!(h.factory.build_count(), 0);
        assert_eq!(h.outcomes(), vec![Ok(())]);
    }

    #[test]
    fn test_missing_runtime_factory_is_unsupported() {
        let factory = Arc::new(DryRunRuntimeFactory::new(SdkVersion::numbered(27, 0, 0)));
        let env = Arc::new(HostEnvironment::new(
            HostConfig::default(),
            BuilderRegistry::new().with(factory.clone()),
        ));
        let fetcher = Arc::new(ManualFetcher::new());
        let loader = HeadlessAppLoader::new(env, fetcher.clone(), Arc::new(InlineContext));
        let outcome = Arc::new(Mutex::new(None));
        let o = outcome.clone();
        loader.load_app("https://exp.host/@user/app", LoadOptions::default(), move |r| {
            *o.lock().unwrap() = Some(r.map_err(|e| e.to_string()));
        });

        let listener = fetcher.last_listener().unwrap();
        listener.on_manifest_ready(release_manifest());
        listener.on_bundle_ready("/b".to_string());

        assert_eq!(
            *outcome.lock().unwrap(),
            Some(Err("28.0.0 is not a valid SDK version.".to_string()))
        );
        assert_eq!(factory.build_count(), 0);
    }

    #[test]
    fn test_fetch_error_reports_once() {
        let h = harness(HostConfig::default());
        h.load("https://exp.host/@user/app", LoadOptions::default());
        let listener = h.listener();

        listener.on_error(HostError::Fetch("timed out".to_string()));
        listener.on_error(HostError::Fetch("again".to_string()));
        listener.on_manifest_ready(release_manifest());

        assert_eq!(h.outcomes(), vec![Err("Fetch error: timed out".to_string())]);
        assert_eq!(h.factory.build_count(), 0);
    }

    #[test]
    fn test_non_fetch_errors_are_wrapped() {
        let h = harness(HostConfig::default());
        h.load("https://exp.host/@user/app", LoadOptions::default());
        h.listener().on_error(HostError::Storage("cache full".to_string()));

        let outcomes = h.outcomes();
        assert!(outcomes[0].as_ref().unwrap_err().starts_with("Fetch error:"));
    }

    #[test]
    fn test_shell_scheme_intent_and_shell_flag() {
        let mut config = HostConfig::default().with_shell_scheme("myapp");
        config.initial_url = Some("https://exp.host/@user/app".to_string());
        let h = harness(config);
        h.load(
            "https://exp.host/@user/app",
            LoadOptions::default().with_intent_uri("https://exp.host/@user/app"),
        );
        h.listener().on_manifest_ready(release_manifest());
        h.listener().on_bundle_ready("/b".to_string());

        let state = h.loader.state_snapshot().unwrap();
        assert!(state.is_shell_app);
        assert_eq!(state.intent_uri.as_deref(), Some("myapp://"));
        let props = h.factory.last_props().unwrap();
        assert_eq!(props.exp["shell"], json!(true));
        assert_eq!(props.exp["initialUri"], json!("myapp://"));
    }

    #[test]
    fn test_explicit_intent_uri_is_kept() {
        let h = harness(HostConfig::default());
        h.load(
            "https://exp.host/@user/app",
            LoadOptions::default().with_intent_uri("https://exp.host/@user/app/--/settings"),
        );
        h.listener().on_manifest_ready(release_manifest());

        let state = h.loader.state_snapshot().unwrap();
        assert_eq!(
            state.intent_uri.as_deref(),
            Some("https://exp.host/@user/app/--/settings")
        );
        assert!(!state.is_shell_app);
    }

    #[test]
    fn test_background_load_skips_build_but_completes() {
        let h = harness(HostConfig::default());
        let record = h.load("https://exp.host/@user/app", LoadOptions::default().background());
        h.listener().on_manifest_ready(release_manifest());
        h.listener().on_bundle_ready("/b".to_string());

        assert_eq!(h.outcomes(), vec![Ok(())]);
        assert_eq!(h.factory.build_count(), 0);
        assert!(!record.is_loaded());
        assert!(h.loader.current_runtime().is_none());
    }

    #[test]
    fn test_reload_destroys_previous_runtime_first() {
        let h = harness(HostConfig::default());
        h.load("https://exp.host/@user/app", LoadOptions::default());
        h.listener().on_manifest_ready(release_manifest());
        h.listener().on_bundle_ready("/b".to_string());

        h.load("https://exp.host/@user/app", LoadOptions::default());
        h.listener().on_manifest_ready(release_manifest());
        h.listener().on_bundle_ready("/b".to_string());

        let events = h.factory.events();
        let destroyed_at = events
            .iter()
            .position(|e| *e == RuntimeEvent::HostDestroyed(0))
            .unwrap();
        let second_build_at = events
            .iter()
            .position(|e| matches!(e, RuntimeEvent::Built { instance: 1, .. }))
            .unwrap();
        assert!(destroyed_at < second_build_at);
        assert_eq!(h.outcomes(), vec![Ok(()), Ok(())]);
    }

    #[tokio::test]
    async fn test_debug_manifest_starts_without_bundle() {
        let h = harness(HostConfig::default());
        let (tx, rx) = oneshot::channel();
        let record = h.loader.load_app(
            "http://localhost:19000",
            LoadOptions::default(),
            move |result| {
                let _ = tx.send(result);
            },
        );

        h.listener().on_manifest_ready(debug_manifest());
        rx.await.unwrap().unwrap();

        assert!(record.is_loaded());
        match &h.factory.events()[0] {
            RuntimeEvent::Built {
                bundle_path,
                developer_support,
                ..
            } => {
                assert_eq!(bundle_path, "");
                assert_eq!(
                    developer_support,
                    &Some(("localhost:19001".to_string(), "index".to_string()))
                );
            }
            other => panic!("unexpected event {:?}", other),
        }

        // A late bundle is ignored in debug mode
        h.listener().on_bundle_ready("/b".to_string());
        assert_eq!(h.factory.build_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_packager_fails_once_without_build() {
        let h = harness_with(HostConfig::default(), |env| env.with_packager(Arc::new(DownPackager)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let record = h.loader.load_app("http://localhost:19000", LoadOptions::default(), move |result| {
            let _ = tx.send(result);
        });

        h.listener().on_manifest_ready(debug_manifest());
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, HostError::PackagerUnreachable(_)));

        // Late callbacks after the failure change nothing
        h.listener().on_bundle_ready("/b".to_string());
        h.listener().on_error(HostError::Fetch("late".to_string()));
        assert!(rx.try_recv().is_err());

        assert_eq!(h.phase(), LoaderPhase::Failed);
        assert_eq!(h.factory.build_count(), 0);
        assert!(!record.is_loaded());
        assert!(h.loader.gate().pending().is_empty());
    }

    #[tokio::test]
    async fn test_bundle_before_debug_manifest_is_dropped() {
        let h = harness(HostConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let record = h.loader.load_app("http://localhost:19000", LoadOptions::default(), move |result| {
            let _ = tx.send(result);
        });

        h.listener().on_bundle_ready("/cache/early.bundle".to_string());
        assert_eq!(h.loader.gate().pending().len(), 1);

        h.listener().on_manifest_ready(debug_manifest());
        assert!(h.loader.gate().pending().is_empty());
        rx.recv().await.unwrap().unwrap();
        assert!(rx.try_recv().is_err());

        assert!(record.is_loaded());
        assert_eq!(h.factory.build_count(), 1);
        match &h.factory.events()[0] {
            RuntimeEvent::Built { bundle_path, .. } => assert_eq!(bundle_path, ""),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_loads_sharing_a_gate_keep_their_own_waiters() {
        let gate = Arc::new(AsyncGate::new());
        let a = harness(HostConfig::default());
        let b = harness(HostConfig::default());
        let a = Harness {
            loader: a.loader.with_gate(gate.clone()),
            ..a
        };
        let b = Harness {
            loader: b.loader.with_gate(gate.clone()),
            ..b
        };

        let record_a = a.load("https://exp.host/@user/app", LoadOptions::default());
        let record_b = b.load("https://exp.host/@user/app", LoadOptions::default());
        a.listener().on_bundle_ready("/a".to_string());
        b.listener().on_bundle_ready("/b".to_string());
        assert_eq!(gate.pending().len(), 2);

        // A failing load only clears its own waiter
        b.listener().on_error(HostError::Fetch("offline".to_string()));
        assert_eq!(gate.pending().len(), 1);

        a.listener().on_manifest_ready(release_manifest());
        assert!(record_a.is_loaded());
        assert!(!record_b.is_loaded());
        assert_eq!(a.outcomes(), vec![Ok(())]);
        assert_eq!(b.outcomes().len(), 1);
        assert!(gate.pending().is_empty());
    }
}
