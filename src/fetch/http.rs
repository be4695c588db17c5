//! HTTP fetcher
//!
//! GETs the manifest, then downloads the bundle it names into a local cache
//! directory. Bundles are cached under the sha256 of their URL so a failed
//! download can fall back to the last good copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::runtime::Handle;

use super::urls::to_http;
use super::{AppFetcher, FetchListener};
use crate::domain::Manifest;
use crate::error::{HostError, Result};

const MANIFEST_ACCEPT: &str = "application/expo+json,application/json";

/// Fetcher backed by reqwest, running its work on a tokio runtime
#[derive(Debug, Clone)]
pub struct HttpAppFetcher {
    client: Client,
    cache_dir: PathBuf,
    handle: Handle,
}

impl HttpAppFetcher {
    pub fn new(timeout: Duration, cache_dir: impl Into<PathBuf>, handle: Handle) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HostError::Fetch(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            cache_dir: cache_dir.into(),
            handle,
        })
    }

    /// Local path a bundle URL is cached at
    pub fn cache_path(&self, bundle_url: &str) -> PathBuf {
        bundle_cache_path(&self.cache_dir, bundle_url)
    }

    async fn fetch_manifest(client: &Client, manifest_url: &str) -> Result<Manifest> {
        let url = to_http(manifest_url);
        log::debug!("Fetching manifest from {}", url);
        let response = client
            .get(&url)
            .header(reqwest::header::ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await
            .map_err(|e| HostError::Fetch(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Fetch(format!("{}: HTTP {}", url, status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| HostError::Fetch(format!("{}: {}", url, e)))?;
        Manifest::parse(&text)
    }

    async fn fetch_bundle(client: &Client, cache_dir: &Path, manifest: &Manifest) -> Result<String> {
        let url = to_http(&manifest.bundle_url()?);
        let path = bundle_cache_path(cache_dir, &url);

        match Self::download(client, &url, &path).await {
            Ok(()) => Ok(path.to_string_lossy().into_owned()),
            Err(e) if path.exists() => {
                log::warn!("Bundle download failed, using cached copy at {}: {}", path.display(), e);
                Ok(path.to_string_lossy().into_owned())
            }
            Err(e) => Err(e),
        }
    }

    async fn download(client: &Client, url: &str, path: &Path) -> Result<()> {
        log::debug!("Downloading bundle from {}", url);
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| HostError::Fetch(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Fetch(format!("{}: HTTP {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| HostError::Fetch(format!("{}: {}", url, e)))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        log::info!("Cached bundle ({} bytes) at {}", bytes.len(), path.display());
        Ok(())
    }
}

fn bundle_cache_path(cache_dir: &Path, bundle_url: &str) -> PathBuf {
    let digest = Sha256::digest(bundle_url.as_bytes());
    cache_dir.join(format!("{}.bundle", hex::encode(digest)))
}

impl AppFetcher for HttpAppFetcher {
    fn start(&self, manifest_url: &str, listener: Arc<dyn FetchListener>) {
        let client = self.client.clone();
        let cache_dir = self.cache_dir.clone();
        let manifest_url = manifest_url.to_string();

        self.handle.spawn(async move {
            let manifest = match Self::fetch_manifest(&client, &manifest_url).await {
                Ok(manifest) => manifest,
                Err(e) => {
                    log::error!("Manifest fetch failed for {}: {}", manifest_url, e);
                    listener.on_error(e);
                    return;
                }
            };

            // The packager serves the bundle live in debug mode
            let debug = manifest.is_debug_mode_enabled();
            listener.on_manifest_ready(manifest.clone());
            if debug {
                return;
            }

            match Self::fetch_bundle(&client, &cache_dir, &manifest).await {
                Ok(path) => listener.on_bundle_ready(path),
                Err(e) => {
                    log::error!("Bundle fetch failed for {}: {}", manifest_url, e);
                    listener.on_error(e);
                }
            }
        });
    }
}
