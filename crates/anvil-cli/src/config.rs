//! CLI configuration management.

use crate::buildtools::BuildToolsOptions;
use crate::commands::{BuildArgs, CacheArgs, VersionArgs};
use anvil_cache::{CacheSettings, RemoteEndpoint};
use anvil_core::{
    normalize_version_list, validate_version, Error, JarNaming, MavenRepository, Result, LATEST,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted for the SFTP private key.
pub const PRIVATE_KEY_ENV: &str = "ANVIL_SFTP_PRIVATE_KEY";

/// CLI configuration, as read from `config.yaml` and then overridden by flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Build tool provider.
    pub provider: String,
    /// Comma separated version list.
    pub versions: String,
    /// Parallel builds; defaults to the number of CPUs.
    pub threads: Option<usize>,
    pub remapped: bool,
    pub generate_source: bool,
    pub generate_docs: bool,
    pub disable_java_check: bool,
    pub output_dir: Option<PathBuf>,
    pub maven_repository: Option<PathBuf>,
    pub cache: CacheSettings,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            provider: "spigotmc".to_string(),
            versions: LATEST.to_string(),
            threads: None,
            remapped: false,
            generate_source: false,
            generate_docs: false,
            disable_java_check: false,
            output_dir: None,
            maven_repository: None,
            cache: CacheSettings::default(),
        }
    }
}

impl CliConfig {
    /// Load `explicit`, else the per-user config file if it exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Per-user configuration file path.
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "anvil", "anvil")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    pub fn apply_version_args(&mut self, args: &VersionArgs) {
        if let Some(versions) = &args.versions {
            self.versions = versions.clone();
        }
        self.remapped |= args.remapped;
        if let Some(repo) = &args.maven_repository {
            self.maven_repository = Some(repo.clone());
        }
    }

    pub fn apply_build_args(&mut self, args: &BuildArgs) {
        self.apply_version_args(&args.versions);
        if let Some(provider) = &args.provider {
            self.provider = provider.clone();
        }
        if let Some(threads) = args.threads {
            self.threads = Some(threads);
        }
        self.generate_source |= args.generate_source;
        self.generate_docs |= args.generate_docs;
        self.disable_java_check |= args.disable_java_check;
        if let Some(dir) = &args.output_dir {
            self.output_dir = Some(dir.clone());
        }
        self.apply_cache_args(&args.cache);
    }

    fn apply_cache_args(&mut self, args: &CacheArgs) {
        let endpoint = &mut self.cache.endpoint;
        if let Some(host) = &args.cache_host {
            endpoint.host = host.clone();
        }
        if let Some(port) = args.cache_port {
            endpoint.port = port;
        }
        if let Some(user) = &args.cache_user {
            endpoint.username = user.clone();
        }
        if let Some(key) = &args.cache_host_key {
            endpoint.expected_host_key = Some(key.clone());
        }
        if let Some(file) = &args.cache_private_key_file {
            self.cache.private_key_file = Some(file.clone());
        }
        if args.no_scp {
            self.cache.transfer_binary = None;
        }
    }

    /// Normalized version tokens. Every token must be usable as a path segment.
    pub fn version_tokens(&self) -> Result<Vec<String>> {
        let tokens = normalize_version_list(&self.versions);
        for token in &tokens {
            validate_version(token)?;
        }
        Ok(tokens)
    }

    pub fn thread_count(&self) -> usize {
        self.threads
            .filter(|threads| *threads > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(usize::from))
            .unwrap_or(1)
    }

    pub fn jar_naming(&self) -> JarNaming {
        if self.remapped {
            JarNaming::Remapped
        } else {
            JarNaming::Standard
        }
    }

    pub fn repository(&self) -> Result<MavenRepository> {
        match &self.maven_repository {
            Some(root) => Ok(MavenRepository::new(root)),
            None => MavenRepository::user_default(),
        }
    }

    /// Cache endpoint with its private key filled in. An empty host
    /// yields a disabled cache downstream.
    pub fn cache_endpoint(&self, env_key: Option<String>) -> Result<RemoteEndpoint> {
        if !self.cache.endpoint.is_configured() {
            return Ok(self.cache.endpoint.clone());
        }
        self.cache.clone().resolve_private_key(env_key)
    }

    /// BuildTools flags; a relative output directory is made absolute.
    pub fn build_tools_options(&self) -> Result<BuildToolsOptions> {
        let output_dir = self
            .output_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(std::path::absolute)
            .transpose()?;

        Ok(BuildToolsOptions {
            generate_source: self.generate_source,
            generate_docs: self.generate_docs,
            disable_java_check: self.disable_java_check,
            remapped: self.remapped,
            output_dir,
        })
    }
}
