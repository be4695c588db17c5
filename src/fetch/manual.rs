//! Caller-driven fetcher
//!
//! Records every `start` call and lets the caller deliver the callbacks. Used
//! for offline loads from files on disk, and for driving exact callback
//! interleavings.

use std::sync::{Arc, Mutex};

use super::{AppFetcher, FetchListener};

#[derive(Default)]
pub struct ManualFetcher {
    started: Mutex<Vec<(String, Arc<dyn FetchListener>)>>,
}

impl std::fmt::Debug for ManualFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualFetcher")
            .field("started", &self.started_urls())
            .finish()
    }
}

impl ManualFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs passed to `start`, in order
    pub fn started_urls(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Listener of the most recent `start` call
    pub fn last_listener(&self) -> Option<Arc<dyn FetchListener>> {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|(_, listener)| listener.clone())
    }

    /// Listener of the most recent `start` call for `manifest_url`
    pub fn listener_for(&self, manifest_url: &str) -> Option<Arc<dyn FetchListener>> {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(url, _)| url == manifest_url)
            .map(|(_, listener)| listener.clone())
    }
}

impl AppFetcher for ManualFetcher {
    fn start(&self, manifest_url: &str, listener: Arc<dyn FetchListener>) {
        log::debug!("Manual fetch started for {}", manifest_url);
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((manifest_url.to_string(), listener));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Manifest;
    use crate::error::HostError;

    #[derive(Default)]
    struct Recorder {
        bundles: Mutex<Vec<String>>,
    }

    impl FetchListener for Recorder {
        fn on_manifest_ready(&self, _manifest: Manifest) {}
        fn on_bundle_ready(&self, local_path: String) {
            self.bundles.lock().unwrap().push(local_path);
        }
        fn on_error(&self, _error: HostError) {}
    }

    #[test]
    fn test_records_starts_and_exposes_listener() {
        let fetcher = ManualFetcher::new();
        assert!(fetcher.last_listener().is_none());

        let recorder = Arc::new(Recorder::default());
        fetcher.start("https://exp.host/@user/app", recorder.clone());

        assert_eq!(fetcher.started_urls(), vec!["https://exp.host/@user/app".to_string()]);
        fetcher.last_listener().unwrap().on_bundle_ready("/tmp/b.js".to_string());
        assert_eq!(*recorder.bundles.lock().unwrap(), vec!["/tmp/b.js".to_string()]);
    }

    #[test]
    fn test_listener_for_picks_matching_url() {
        let fetcher = ManualFetcher::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        fetcher.start("https://exp.host/@a/app", a.clone());
        fetcher.start("https://exp.host/@b/app", b.clone());

        fetcher
            .listener_for("https://exp.host/@a/app")
            .unwrap()
            .on_bundle_ready("/a".to_string());
        assert_eq!(*a.bundles.lock().unwrap(), vec!["/a".to_string()]);
        assert!(b.bundles.lock().unwrap().is_empty());
        assert!(fetcher.listener_for("https://exp.host/@c/app").is_none());
    }
}
