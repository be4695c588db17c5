//! Loader Layer - headless app loading
//!
//! This module provides:
//! - HeadlessAppLoader: the manifest/bundle/runtime state machine
//! - AppRecord: caller-owned handle to a loaded app
//! - HostEnvironment / LoadOptions: shared collaborators and per-call options
//! - linking_uri / assemble_launch_props: what the runtime is started with

pub mod environment;
pub mod headless;
pub mod linking;
pub mod props;
pub mod record;

pub use environment::{HostEnvironment, LoadOptions, NativeLoader, NoopNativeLoader};
pub use headless::{Completion, HeadlessAppLoader, READY_FOR_BUNDLE, ready_for_bundle_condition};
pub use linking::linking_uri;
pub use props::{LaunchContext, assemble_launch_props};
pub use record::AppRecord;
