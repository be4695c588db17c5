//! Fetch Layer - manifest and bundle acquisition
//!
//! The loader never fetches anything itself. It hands a URL and a listener to
//! an `AppFetcher` and reacts to the three callbacks. Callbacks may arrive on
//! any thread and in any order between manifest and bundle.

pub mod http;
pub mod manual;
pub mod urls;

use std::sync::Arc;

use crate::domain::Manifest;
use crate::error::HostError;

pub use http::HttpAppFetcher;
pub use manual::ManualFetcher;
pub use urls::to_http;

/// Receives fetch results for one `load_app` call
pub trait FetchListener: Send + Sync {
    fn on_manifest_ready(&self, manifest: Manifest);

    /// Bundle is on local disk at `local_path`
    fn on_bundle_ready(&self, local_path: String);

    fn on_error(&self, error: HostError);
}

/// Starts fetching a manifest and its bundle
pub trait AppFetcher: Send + Sync {
    fn start(&self, manifest_url: &str, listener: Arc<dyn FetchListener>);
}
