//! App manifest
//!
//! The manifest is a JSON document served alongside the bundle. The host reads
//! a handful of well-known keys; everything else is passed through to the app
//! untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::experience::ExperienceId;
use crate::error::{HostError, Result};

pub const SDK_VERSION_KEY: &str = "sdkVersion";
pub const ID_KEY: &str = "id";
pub const BUNDLE_URL_KEY: &str = "bundleUrl";
pub const DEBUGGER_HOST_KEY: &str = "debuggerHost";
pub const MAIN_MODULE_NAME_KEY: &str = "mainModuleName";
pub const DEVELOPER_KEY: &str = "developer";
pub const PACKAGER_OPTS_KEY: &str = "packagerOpts";
pub const PACKAGER_OPTS_DEV_KEY: &str = "dev";

/// An accepted manifest document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Map<String, Value>);

impl Manifest {
    /// Wrap an already-parsed JSON value; only objects are manifests
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(HostError::ManifestParse(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Parse a manifest from JSON text
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| HostError::ManifestParse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Optional string field; missing or non-string values read as empty
    pub fn opt_string(&self, key: &str) -> String {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Required string field
    pub fn require_string(&self, key: &str) -> Result<String> {
        match self.0.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(HostError::ManifestParse(format!(
                "field '{}' is not a string",
                key
            ))),
            None => Err(HostError::ManifestParse(format!(
                "missing required field '{}'",
                key
            ))),
        }
    }

    /// Declared SDK version string, empty when absent
    pub fn sdk_version(&self) -> String {
        self.opt_string(SDK_VERSION_KEY)
    }

    /// Experience identifier
    pub fn experience_id(&self) -> Result<ExperienceId> {
        ExperienceId::new(self.require_string(ID_KEY)?)
    }

    /// Raw bundle URL as declared by the manifest
    pub fn bundle_url(&self) -> Result<String> {
        self.require_string(BUNDLE_URL_KEY)
    }

    pub fn debugger_host(&self) -> String {
        self.opt_string(DEBUGGER_HOST_KEY)
    }

    pub fn main_module_name(&self) -> String {
        self.opt_string(MAIN_MODULE_NAME_KEY)
    }

    /// Debug mode requires a `developer` block and `packagerOpts.dev == true`
    pub fn is_debug_mode_enabled(&self) -> bool {
        self.0.contains_key(DEVELOPER_KEY)
            && self
                .0
                .get(PACKAGER_OPTS_KEY)
                .and_then(|opts| opts.get(PACKAGER_OPTS_DEV_KEY))
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// Borrow the underlying JSON object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Clone into a JSON value for embedding in launch props
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
