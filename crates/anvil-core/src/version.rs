//! Requested versions and their canonical artifact versions.

use crate::{Error, Result};

/// Token that asks for the newest published version.
pub const LATEST: &str = "latest";

/// A user-supplied version token and, once known, the canonical artifact
/// version published by upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequest {
    /// Token as given on the command line (`1.20.1`, `latest`, ...).
    pub token: String,
    /// Canonical version resolved through the version registry.
    pub artifact_version: Option<String>,
}

impl VersionRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            artifact_version: None,
        }
    }

    pub fn with_artifact_version(mut self, version: impl Into<String>) -> Self {
        self.artifact_version = Some(version.into());
        self
    }

    /// Whether the token is the `latest` alias.
    pub fn is_latest(&self) -> bool {
        self.token == LATEST
    }

    /// Version to look for locally: the resolved version, or the token itself
    /// unless it is the `latest` alias.
    pub fn lookup_version(&self) -> Option<&str> {
        match &self.artifact_version {
            Some(version) => Some(version),
            None if self.is_latest() => None,
            None => Some(&self.token),
        }
    }

    /// Key used for cache lookups. Falls back to the raw token when the
    /// version never resolved.
    pub fn cache_key(&self) -> &str {
        self.lookup_version().unwrap_or(&self.token)
    }
}

impl std::fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.artifact_version {
            Some(version) if version != &self.token => write!(f, "{} ({})", self.token, version),
            _ => write!(f, "{}", self.token),
        }
    }
}

/// Check that a version can be used as a single path segment.
///
/// Rejecting separators and dot segments keeps the mapping from version to
/// local and remote paths injective.
pub fn validate_version(version: &str) -> Result<()> {
    let invalid = version.is_empty()
        || version == "."
        || version == ".."
        || version.contains(['/', '\\', '\0']);

    if invalid {
        return Err(Error::InvalidVersion(version.to_string()));
    }
    Ok(())
}

/// Split a comma separated version list into unique, trimmed, lower-case
/// tokens, keeping the order of first occurrence.
pub fn normalize_version_list(input: &str) -> Vec<String> {
    let mut versions: Vec<String> = Vec::new();
    for token in input.to_lowercase().split(',') {
        let token = token.trim();
        if !token.is_empty() && !versions.iter().any(|v| v == token) {
            versions.push(token.to_string());
        }
    }
    versions
}
