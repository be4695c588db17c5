//! Domain types for headless-host
//!
//! This module contains the core domain types:
//! - Manifest: the app description served alongside the bundle
//! - ExperienceId: identity of a published app
//! - SdkVersion: runtime version negotiation
//! - Notification: launch-time notification payload
//! - LoaderState: per-call state of the headless loader

pub mod experience;
pub mod loader_state;
pub mod manifest;
pub mod notification;
pub mod sdk_version;

pub use experience::ExperienceId;
pub use loader_state::{LoaderPhase, LoaderState};
pub use manifest::Manifest;
pub use notification::Notification;
pub use sdk_version::{SdkVersion, UNVERSIONED};
