//! Deciding which requested versions still need a build.

use crate::registry::VersionRegistry;
use anvil_cache::{ArtifactCache, CacheReporter};
use anvil_core::{validate_version, JarNaming, MavenRepository, Result, VersionRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Where a satisfied version's server jar came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satisfaction {
    /// Already in the local repository.
    Local,
    /// Restored from the remote cache during resolution.
    Cache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatisfiedVersion {
    pub request: VersionRequest,
    pub jar: PathBuf,
    pub source: Satisfaction,
}

/// Outcome of resolving a version list, in request order.
#[derive(Debug, Default)]
pub struct Resolution {
    pub to_build: Vec<VersionRequest>,
    pub satisfied: Vec<SatisfiedVersion>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.to_build.is_empty()
    }
}

pub struct VersionResolver {
    registry: Arc<dyn VersionRegistry>,
    repository: MavenRepository,
    naming: JarNaming,
}

impl VersionResolver {
    pub fn new(registry: Arc<dyn VersionRegistry>, repository: MavenRepository, naming: JarNaming) -> Self {
        Self {
            registry,
            repository,
            naming,
        }
    }

    /// Ask the registry for the canonical version of `token`.
    ///
    /// Never fails: registry errors and versions that cannot name a cache
    /// entry are reported, and the token itself (or nothing, for `latest`)
    /// is kept.
    pub async fn resolve_request(&self, token: &str, reporter: &dyn CacheReporter) -> VersionRequest {
        let request = VersionRequest::new(token);

        let resolved = self
            .registry
            .resolve(token)
            .await
            .and_then(|version| match version {
                Some(version) => validate_version(&version).map(|_| Some(version)),
                None => Ok(None),
            });

        match resolved {
            Ok(Some(version)) => {
                debug!(token, version = %version, "Resolved canonical version");
                request.with_artifact_version(version)
            }
            Ok(None) => request,
            Err(e) => {
                reporter.error(&format!("Failed to resolve version '{}': {}", token, e));
                request
            }
        }
    }

    /// Expected server jar for `request` in the local repository.
    pub fn local_jar(&self, request: &VersionRequest) -> Result<PathBuf> {
        self.repository.server_jar(request.cache_key(), self.naming)
    }

    /// Resolve every token and check the local repository only.
    pub async fn plan(&self, tokens: &[String], reporter: &dyn CacheReporter) -> Result<Resolution> {
        let mut resolution = Resolution::default();

        for token in tokens {
            let request = self.resolve_request(token, reporter).await;
            let jar = self.local_jar(&request)?;

            if is_file(&jar).await {
                resolution.satisfied.push(SatisfiedVersion {
                    request,
                    jar,
                    source: Satisfaction::Local,
                });
            } else {
                resolution.to_build.push(request);
            }
        }

        Ok(resolution)
    }

    /// Resolve every token, restoring missing versions from `cache` when it
    /// is available. Versions are processed one at a time.
    pub async fn resolve_all(
        &self,
        tokens: &[String],
        cache: &ArtifactCache,
        temp_dir: &Path,
        reporter: &dyn CacheReporter,
    ) -> Result<Resolution> {
        let mut resolution = Resolution::default();

        for token in tokens {
            let request = self.resolve_request(token, reporter).await;
            let jar = self.local_jar(&request)?;

            if is_file(&jar).await {
                reporter.info(&format!(
                    "Skipping version '{}' because it has been found in the local maven repository: {}",
                    request.token,
                    jar.display()
                ));
                resolution.satisfied.push(SatisfiedVersion {
                    request,
                    jar,
                    source: Satisfaction::Local,
                });
                continue;
            }

            if cache.is_available() {
                let key = request.cache_key();
                if cache.restore_if_present(key, temp_dir, reporter).await? {
                    reporter.info(&format!("Restored version '{}' ({}) from SFTP cache", key, request.token));
                    if is_file(&jar).await {
                        resolution.satisfied.push(SatisfiedVersion {
                            request,
                            jar,
                            source: Satisfaction::Cache,
                        });
                        continue;
                    }
                    reporter.error(&format!(
                        "Cache entry for '{}' did not contain the expected jar {}",
                        key,
                        jar.display()
                    ));
                } else {
                    reporter.info(&format!("Version '{}' ({}) not found in SFTP cache", key, request.token));
                }
            }

            resolution.to_build.push(request);
        }

        Ok(resolution)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_file())
}
