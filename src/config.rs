use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::SdkVersion;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub sdk: SdkConfig,
    pub shell: ShellConfig,
    pub linking: LinkingConfig,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    pub supported_versions: Vec<String>,
    /// Declared version that is routed to the unversioned runtime
    pub temporary_version: Option<String>,
    pub linking_threshold: String,
    pub notification_threshold: String,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            supported_versions: vec![
                "26.0.0".to_string(),
                "27.0.0".to_string(),
                "28.0.0".to_string(),
                "29.0.0".to_string(),
                "30.0.0".to_string(),
            ],
            temporary_version: None,
            linking_threshold: "27.0.0".to_string(),
            notification_threshold: "10.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub initial_url: Option<String>,
    pub scheme: Option<String>,
    pub detached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingConfig {
    pub managed_hosts: Vec<String>,
    pub deep_link_separator: String,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            managed_hosts: vec![
                "exp.host".to_string(),
                "expo.io".to_string(),
                "exp.direct".to_string(),
                "expo.test".to_string(),
            ],
            deep_link_separator: "--".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub bundle_cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("headless-host");
        Self {
            data_dir: base.join("store"),
            bundle_cache_dir: base.join("bundles"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub packager_timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            packager_timeout_ms: 5000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            sdk: SdkConfig::default(),
            shell: ShellConfig::default(),
            linking: LinkingConfig::default(),
            storage: StorageConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Resolve the loader-facing settings, validating version strings
    pub fn host_config(&self) -> Result<HostConfig> {
        let supported_versions = self
            .sdk
            .supported_versions
            .iter()
            .map(|v| SdkVersion::parse(v).context(format!("Invalid supported SDK version '{}'", v)))
            .collect::<Result<Vec<_>>>()?;

        Ok(HostConfig {
            supported_versions,
            temporary_version: self.sdk.temporary_version.clone(),
            linking_threshold: SdkVersion::parse(&self.sdk.linking_threshold)
                .context("Invalid sdk.linking_threshold")?,
            notification_threshold: SdkVersion::parse(&self.sdk.notification_threshold)
                .context("Invalid sdk.notification_threshold")?,
            initial_url: self.shell.initial_url.clone(),
            shell_app_scheme: self.shell.scheme.clone(),
            detached: self.shell.detached,
            managed_hosts: self.linking.managed_hosts.clone(),
            deep_link_separator: self.linking.deep_link_separator.clone(),
            packager_timeout: Duration::from_millis(self.fetch.packager_timeout_ms),
        })
    }
}

/// Settings consumed by the loader, with versions already parsed
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub supported_versions: Vec<SdkVersion>,
    pub temporary_version: Option<String>,
    pub linking_threshold: SdkVersion,
    pub notification_threshold: SdkVersion,
    pub initial_url: Option<String>,
    pub shell_app_scheme: Option<String>,
    pub detached: bool,
    pub managed_hosts: Vec<String>,
    pub deep_link_separator: String,
    pub packager_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        let defaults = Config::default();
        Self {
            supported_versions: (26..=30).map(|major| SdkVersion::numbered(major, 0, 0)).collect(),
            temporary_version: None,
            linking_threshold: SdkVersion::numbered(27, 0, 0),
            notification_threshold: SdkVersion::numbered(10, 0, 0),
            initial_url: None,
            shell_app_scheme: None,
            detached: false,
            managed_hosts: defaults.linking.managed_hosts,
            deep_link_separator: defaults.linking.deep_link_separator,
            packager_timeout: Duration::from_millis(defaults.fetch.packager_timeout_ms),
        }
    }
}

impl HostConfig {
    /// Returns true if the version is one the host can run
    pub fn supports(&self, version: &SdkVersion) -> bool {
        version.is_unversioned() || self.supported_versions.contains(version)
    }

    /// Deep-link separator followed by a slash (`--/`)
    pub fn deep_link_separator_with_slash(&self) -> String {
        format!("{}/", self.deep_link_separator)
    }

    /// Builder-style override for the shell app scheme
    pub fn with_shell_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.shell_app_scheme = Some(scheme.into());
        self
    }

    /// Builder-style override for the temporary version alias
    pub fn with_temporary_version(mut self, version: impl Into<String>) -> Self {
        self.temporary_version = Some(version.into());
        self
    }

    /// Builder-style override for detached mode
    pub fn with_detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_host_config_parses() {
        let host = Config::default().host_config().unwrap();
        assert_eq!(host.supported_versions.len(), 5);
        assert_eq!(host.linking_threshold, SdkVersion::parse("27.0.0").unwrap());
        assert_eq!(host.deep_link_separator_with_slash(), "--/");
    }

    #[test]
    fn test_supports_unversioned_always() {
        let host = HostConfig::default();
        assert!(host.supports(&SdkVersion::Unversioned));
        assert!(host.supports(&SdkVersion::parse("28.0.0").unwrap()));
        assert!(!host.supports(&SdkVersion::parse("5.0.0").unwrap()));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("host.yml");
        fs::write(
            &path,
            r#"
sdk:
  supported_versions: ["31.0.0"]
  temporary_version: "32.0.0"
shell:
  scheme: myapp
  detached: true
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.sdk.supported_versions, vec!["31.0.0".to_string()]);
        assert_eq!(config.shell.scheme.as_deref(), Some("myapp"));
        assert!(config.shell.detached);
        // Unspecified sections keep defaults
        assert_eq!(config.linking.deep_link_separator, "--");
        assert_eq!(config.fetch.timeout_ms, 30000);

        let host = config.host_config().unwrap();
        assert_eq!(host.temporary_version.as_deref(), Some("32.0.0"));
    }

    #[test]
    fn test_invalid_supported_version_is_rejected() {
        let mut config = Config::default();
        config.sdk.supported_versions = vec!["not-a-version".to_string()];
        assert!(config.host_config().is_err());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let path = PathBuf::from("/nonexistent/headless-host.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
