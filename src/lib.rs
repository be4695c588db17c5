//! headless-host - loads JavaScript app bundles into a native runtime without a UI
//!
//! The core is `loader::HeadlessAppLoader`: it fetches an app's manifest and
//! bundle, waits for both in whatever order they arrive, negotiates the SDK
//! version, and starts a runtime with experience-scoped launch props. The
//! `tasks` layer runs app-owned background tasks on top of it, loading apps on
//! demand.

pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod id;
pub mod loader;
pub mod runtime;
pub mod storage;
pub mod tasks;

pub use error::{HostError, Result};
