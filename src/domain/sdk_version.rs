//! SDK version negotiation types
//!
//! Manifests declare the runtime SDK they were built against. The host either
//! runs a specific numbered runtime or the unversioned (latest) one.

use std::cmp::Ordering;
use std::fmt;

use semver::Version;

use crate::error::{HostError, Result};

/// Sentinel string for the unversioned runtime
pub const UNVERSIONED: &str = "UNVERSIONED";

/// A runtime SDK version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SdkVersion {
    /// The latest runtime, compiled into the host without a version prefix
    Unversioned,
    /// A numbered SDK release
    Numbered(Version),
}

impl SdkVersion {
    /// Create a numbered version
    pub fn numbered(major: u64, minor: u64, patch: u64) -> Self {
        SdkVersion::Numbered(Version::new(major, minor, patch))
    }

    /// Parse a manifest SDK version string.
    ///
    /// Accepts `UNVERSIONED` and `major[.minor[.patch]]`; missing components
    /// are treated as zero.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed == UNVERSIONED {
            return Ok(SdkVersion::Unversioned);
        }
        if trimmed.is_empty() {
            return Err(HostError::UnsupportedVersion(String::new()));
        }

        let mut parts = [0u64; 3];
        let mut count = 0;
        for piece in trimmed.split('.') {
            if count == 3 {
                return Err(HostError::UnsupportedVersion(raw.to_string()));
            }
            parts[count] = piece
                .parse()
                .map_err(|_| HostError::UnsupportedVersion(raw.to_string()))?;
            count += 1;
        }

        Ok(SdkVersion::numbered(parts[0], parts[1], parts[2]))
    }

    /// Returns true for the unversioned sentinel
    pub fn is_unversioned(&self) -> bool {
        matches!(self, SdkVersion::Unversioned)
    }

    /// Key used to look up versioned runtime builders
    pub fn registry_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkVersion::Unversioned => write!(f, "{}", UNVERSIONED),
            SdkVersion::Numbered(v) => write!(f, "{}", v),
        }
    }
}

impl PartialOrd for SdkVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SdkVersion {
    /// Unversioned is newer than every numbered release
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SdkVersion::Unversioned, SdkVersion::Unversioned) => Ordering::Equal,
            (SdkVersion::Unversioned, _) => Ordering::Greater,
            (_, SdkVersion::Unversioned) => Ordering::Less,
            (SdkVersion::Numbered(a), SdkVersion::Numbered(b)) => a.cmp(b),
        }
    }
}
