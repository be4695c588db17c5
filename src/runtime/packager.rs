//! Debug packager reachability
//!
//! In debug mode the bundle is served live by a development packager. Before
//! building a runtime against it the host checks that it answers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::Manifest;
use crate::error::{HostError, Result};

/// Body the packager returns from `/status` when it is up
const PACKAGER_RUNNING: &str = "packager-status:running";

/// Probe for the development packager a debug manifest points at
#[async_trait]
pub trait PackagerStatus: Send + Sync {
    /// Ok if the packager answers; `HostError::PackagerUnreachable` otherwise
    async fn check(&self, manifest: &Manifest) -> Result<()>;
}

/// Probe that always succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl PackagerStatus for AlwaysReachable {
    async fn check(&self, _manifest: &Manifest) -> Result<()> {
        Ok(())
    }
}

/// Probe that GETs `http://<debuggerHost>/status`
#[derive(Debug, Clone)]
pub struct HttpPackagerStatus {
    client: Client,
}

impl HttpPackagerStatus {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HostError::PackagerUnreachable(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn status_url(debugger_host: &str) -> String {
        format!("http://{}/status", debugger_host.trim_end_matches('/'))
    }
}

#[async_trait]
impl PackagerStatus for HttpPackagerStatus {
    async fn check(&self, manifest: &Manifest) -> Result<()> {
        let host = manifest.debugger_host();
        if host.is_empty() {
            return Err(HostError::PackagerUnreachable(
                "manifest has no debuggerHost".to_string(),
            ));
        }

        let url = Self::status_url(&host);
        log::debug!("Checking packager status at {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| HostError::PackagerUnreachable(format!("{}: {}", url, e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| HostError::PackagerUnreachable(format!("{}: {}", url, e)))?;

        if body.contains(PACKAGER_RUNNING) {
            Ok(())
        } else {
            Err(HostError::PackagerUnreachable(format!(
                "Packager at {} is not running",
                host
            )))
        }
    }
}
