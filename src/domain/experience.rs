//! Experience identity
//!
//! An experience is one published app, identified by `@owner/slug`. The id
//! scopes everything the host persists on behalf of an app.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

/// Identifier of a published app, taken from the manifest `id` field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperienceId(String);

impl ExperienceId {
    /// Validate and wrap a raw experience id
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(HostError::ManifestParse("experience id is empty".to_string()));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(HostError::ManifestParse(format!(
                "experience id '{}' contains whitespace",
                raw
            )));
        }
        Ok(Self(raw))
    }

    /// The raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperienceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ExperienceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
