//! Configuration for the remote cache channel.

use anvil_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Connection details of the SFTP cache server.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    /// Server host name or address. Empty disables the cache.
    #[serde(default)]
    pub host: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user.
    #[serde(default)]
    pub username: String,
    /// PEM/OpenSSH private key material (not a path).
    #[serde(default, skip_serializing)]
    pub private_key: String,
    /// Expected server host key, either `<type> <base64>` (optionally
    /// prefixed by a known-hosts host pattern) or `SHA256:<base64>`.
    #[serde(default)]
    pub expected_host_key: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl Default for RemoteEndpoint {
    fn default() -> Self {
        Self::new("", default_port(), "", "")
    }
}

impl RemoteEndpoint {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            private_key: private_key.into(),
            expected_host_key: None,
        }
    }

    /// Set the expected host key. Blank values mean "not configured".
    pub fn with_expected_host_key(mut self, key: Option<String>) -> Self {
        self.expected_host_key = key;
        self
    }

    /// Whether a host was configured at all.
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// Expected host key, trimmed, if one was configured.
    pub fn expected_host_key(&self) -> Option<&str> {
        self.expected_host_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl std::fmt::Debug for RemoteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("private_key", &"<redacted>")
            .field("expected_host_key", &self.expected_host_key)
            .finish()
    }
}

/// Tuning for [`RemoteChannel`](crate::RemoteChannel).
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// External transfer binary preferred for downloads. `None` always uses
    /// the SFTP session.
    pub transfer_binary: Option<String>,
    /// How long the binary probe may run before the binary counts as absent.
    pub probe_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            transfer_binary: Some("scp".to_string()),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl ChannelOptions {
    /// Options that never spawn an external binary.
    pub fn library_only() -> Self {
        Self {
            transfer_binary: None,
            ..Default::default()
        }
    }
}

/// Cache section of a configuration file.
///
/// The private key may be given inline, as a file, or through the
/// environment; see [`CacheSettings::resolve_private_key`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(flatten)]
    pub endpoint: RemoteEndpoint,
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
    /// Download binary; `null` disables it.
    #[serde(default = "default_transfer_binary")]
    pub transfer_binary: Option<String>,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_transfer_binary() -> Option<String> {
    Some("scp".to_string())
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            endpoint: RemoteEndpoint::default(),
            private_key_file: None,
            transfer_binary: default_transfer_binary(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl CacheSettings {
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            transfer_binary: self
                .transfer_binary
                .clone()
                .filter(|program| !program.trim().is_empty()),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
        }
    }

    /// Fill in the private key: inline value first, then `private_key_file`,
    /// then `env_key` (the caller's environment lookup).
    ///
    /// Only fails when a configured key file cannot be read.
    pub fn resolve_private_key(mut self, env_key: Option<String>) -> Result<RemoteEndpoint> {
        if self.endpoint.private_key.trim().is_empty() {
            if let Some(path) = &self.private_key_file {
                self.endpoint.private_key = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Cannot read private key file {}: {}", path.display(), e))
                })?;
            } else if let Some(key) = env_key {
                self.endpoint.private_key = key;
            }
        }
        Ok(self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_host_key_is_not_configured() {
        let endpoint = RemoteEndpoint::new("cache.example.com", 22, "ci", "KEY")
            .with_expected_host_key(Some("   ".into()));
        assert_eq!(endpoint.expected_host_key(), None);
        assert!(endpoint.is_configured());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let endpoint = RemoteEndpoint::new("cache.example.com", 22, "ci", "SECRET-KEY");
        let debug = format!("{:?}", endpoint);
        assert!(!debug.contains("SECRET-KEY"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_settings_defaults_from_yaml_fragment() {
        let settings: CacheSettings = serde_json::from_str(
            r#"{"host":"cache.example.com","username":"ci","transfer_binary":null}"#,
        )
        .unwrap();
        assert_eq!(settings.endpoint.port, 22);
        assert!(settings.channel_options().transfer_binary.is_none());
        assert_eq!(settings.channel_options().probe_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_private_key_sources() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("id");
        std::fs::write(&key_file, "FILE-KEY").unwrap();

        let inline = CacheSettings {
            endpoint: RemoteEndpoint::new("h", 22, "u", "INLINE"),
            private_key_file: Some(key_file.clone()),
            ..Default::default()
        };
        assert_eq!(inline.resolve_private_key(Some("ENV".into())).unwrap().private_key, "INLINE");

        let from_file = CacheSettings {
            private_key_file: Some(key_file),
            ..Default::default()
        };
        assert_eq!(from_file.resolve_private_key(Some("ENV".into())).unwrap().private_key, "FILE-KEY");

        let from_env = CacheSettings::default();
        assert_eq!(from_env.resolve_private_key(Some("ENV".into())).unwrap().private_key, "ENV");

        let missing = CacheSettings {
            private_key_file: Some(dir.path().join("absent")),
            ..Default::default()
        };
        assert!(matches!(missing.resolve_private_key(None), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_host_is_unconfigured() {
        assert!(!RemoteEndpoint::new("", 22, "", "").is_configured());
    }
}
