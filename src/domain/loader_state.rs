//! Per-call loader state
//!
//! One `LoaderState` exists for each in-flight `load_app` call. It is created
//! when the call starts and dropped once the runtime is built or the call
//! fails.

use serde::{Deserialize, Serialize};

use super::experience::ExperienceId;
use super::manifest::Manifest;
use super::sdk_version::SdkVersion;

/// Lifecycle phase of a `load_app` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderPhase {
    /// Created, fetch not started
    Idle,
    /// Fetch adapter started, waiting for the manifest
    ManifestFetching,
    /// Manifest accepted and validated
    ManifestReady,
    /// Debug manifest: runtime starts without waiting for a bundle
    DebugStart,
    /// Manifest processed, waiting for the bundle to arrive
    WaitingForBundle,
    /// Bundle arrived after the manifest was processed
    BundleReady,
    /// Building the runtime instance
    RuntimeStarting,
    /// Runtime built and resumed
    RuntimeRunning,
    /// Call ended with an error
    Failed,
}

impl LoaderPhase {
    /// Returns true once the call has reported its outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoaderPhase::RuntimeRunning | LoaderPhase::Failed)
    }
}

/// Mutable state for one `load_app` call
#[derive(Debug, Clone)]
pub struct LoaderState {
    /// Session id used to tag log lines
    pub session_id: String,
    pub phase: LoaderPhase,
    pub manifest_url: String,
    pub manifest: Option<Manifest>,
    /// Version declared by the manifest, after temporary-alias resolution
    pub sdk_version: Option<SdkVersion>,
    /// Version the runtime is actually loaded with
    pub detach_sdk_version: Option<SdkVersion>,
    pub experience_id: Option<ExperienceId>,
    pub debug_mode: bool,
    pub is_shell_app: bool,
    pub intent_uri: Option<String>,
    pub bundle_url: Option<String>,
    pub bundle_path: Option<String>,
    pub ready_for_bundle: bool,
}

impl LoaderState {
    /// Fresh state for a new call
    pub fn new(session_id: impl Into<String>, manifest_url: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: LoaderPhase::Idle,
            manifest_url: manifest_url.into(),
            manifest: None,
            sdk_version: None,
            detach_sdk_version: None,
            experience_id: None,
            debug_mode: false,
            is_shell_app: false,
            intent_uri: None,
            bundle_url: None,
            bundle_path: None,
            ready_for_bundle: false,
        }
    }

    /// Move to a new phase, logging the transition
    pub fn transition(&mut self, next: LoaderPhase) {
        log::debug!("[{}] {:?} -> {:?}", self.session_id, self.phase, next);
        self.phase = next;
    }
}
