//! Version-scoped cache operations.
//!
//! Restores and stores are advisory: every failure below this layer is
//! reported and turns into `Ok(false)`. The only error that escapes is
//! [`Error::CacheUnavailable`], raised when the cache was never configured.

use crate::archiver::ArtifactArchiver;
use crate::channel::RemoteChannel;
use crate::config::{ChannelOptions, RemoteEndpoint};
use crate::format::format_bytes;
use crate::keys::{remote_cache_path, temp_archive_prefix};
use crate::report::CacheReporter;
use crate::transport::EntryKind;
use anvil_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Whether a cache server is configured.
pub enum CacheBackend {
    Disabled,
    Enabled(RemoteChannel),
}

/// Restores and stores version archives on the cache server.
pub struct ArtifactCache {
    backend: CacheBackend,
    archiver: ArtifactArchiver,
}

impl ArtifactCache {
    pub fn new(backend: CacheBackend, archiver: ArtifactArchiver) -> Self {
        Self { backend, archiver }
    }

    /// Cache for `endpoint`; disabled when its host is empty.
    pub fn from_endpoint(
        endpoint: RemoteEndpoint,
        options: ChannelOptions,
        archiver: ArtifactArchiver,
    ) -> Self {
        let backend = if endpoint.is_configured() {
            CacheBackend::Enabled(RemoteChannel::new(endpoint, options))
        } else {
            CacheBackend::Disabled
        };
        Self::new(backend, archiver)
    }

    pub fn disabled(archiver: ArtifactArchiver) -> Self {
        Self::new(CacheBackend::Disabled, archiver)
    }

    pub fn is_available(&self) -> bool {
        matches!(self.backend, CacheBackend::Enabled(_))
    }

    pub fn archiver(&self) -> &ArtifactArchiver {
        &self.archiver
    }

    fn channel(&self) -> Result<&RemoteChannel> {
        match &self.backend {
            CacheBackend::Enabled(channel) => Ok(channel),
            CacheBackend::Disabled => Err(Error::CacheUnavailable),
        }
    }

    /// Fetch and extract the archive for `version` if the server has one.
    ///
    /// `Ok(true)` on a hit that was extracted, `Ok(false)` on a miss or any
    /// transfer/extraction failure (the latter reported via `reporter`).
    pub async fn restore_if_present(
        &self,
        version: &str,
        temp_dir: &Path,
        reporter: &dyn CacheReporter,
    ) -> Result<bool> {
        let channel = self.channel()?;

        let fetched: Result<bool> = async {
            let temp = TempArchive::new(temp_dir, version)?;
            self.fetch(channel, version, temp.path(), reporter).await
        }
        .await;

        match fetched {
            Ok(restored) => Ok(restored),
            Err(e) => {
                reporter.error(&format!(
                    "Failed to fetch cache from SFTP server (version={}): {}",
                    version, e
                ));
                Ok(false)
            }
        }
    }

    async fn fetch(
        &self,
        channel: &RemoteChannel,
        version: &str,
        temp_file: &Path,
        reporter: &dyn CacheReporter,
    ) -> Result<bool> {
        let remote = remote_cache_path(version)?;

        match channel.exists(&remote).await? {
            EntryKind::File => {}
            EntryKind::Directory => {
                warn!(remote = %remote, "Cache path is a directory, treating as a miss");
                return Ok(false);
            }
            EntryKind::Missing => {
                debug!(remote = %remote, "No cache entry");
                return Ok(false);
            }
        }

        match channel.size_of(&remote).await {
            Ok(Some(size)) => reporter.info(&format!(
                "Downloading cache for version '{}' ({})",
                version,
                format_bytes(size)
            )),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Could not determine cache entry size"),
        }

        channel.get(&remote, temp_file).await?;
        self.archiver.unpack(temp_file).await?;
        Ok(true)
    }

    /// Pack the local artifacts of `version` and upload them.
    ///
    /// `Ok(true)` once uploaded; any failure is reported and yields
    /// `Ok(false)` so that a failed cache write never fails the build.
    pub async fn store_artifact(
        &self,
        version: &str,
        temp_dir: &Path,
        reporter: &dyn CacheReporter,
    ) -> Result<bool> {
        let channel = self.channel()?;

        let stored: Result<()> = async {
            let temp = TempArchive::new(temp_dir, version)?;
            let remote = remote_cache_path(version)?;

            let size = self.archiver.pack(version, temp.path()).await?;
            reporter.info(&format!(
                "Uploading cache for version '{}' ({})",
                version,
                format_bytes(size)
            ));
            channel.put(temp.path(), &remote).await
        }
        .await;

        match stored {
            Ok(()) => Ok(true),
            Err(e) => {
                reporter.error(&format!(
                    "Failed to upload cache to SFTP server (version={}): {}",
                    version, e
                ));
                Ok(false)
            }
        }
    }

    /// Close the connection, if any. Call only after all uploads finished.
    pub async fn shutdown(&self) -> Result<()> {
        match &self.backend {
            CacheBackend::Enabled(channel) => channel.shutdown().await,
            CacheBackend::Disabled => Ok(()),
        }
    }
}

/// Scratch archive owned by one operation, removed on drop whatever the
/// outcome.
struct TempArchive {
    path: PathBuf,
}

impl TempArchive {
    fn new(temp_dir: &Path, version: &str) -> Result<Self> {
        let dir = std::path::absolute(temp_dir)?;
        let path = tempfile::Builder::new()
            .prefix(&temp_archive_prefix(version)?)
            .suffix(".tar.gz")
            .tempfile_in(&dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| Error::Io(e.error))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove temporary archive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{DirectoryConnector, RecordingReporter};
    use crate::keys::CACHE_ROOT;
    use anvil_core::MavenRepository;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;

    const VERSION: &str = "1.20.1";

    struct Fixture {
        remote: tempfile::TempDir,
        repo: tempfile::TempDir,
        temp: tempfile::TempDir,
        connector: DirectoryConnector,
    }

    impl Fixture {
        fn new() -> Self {
            let remote = tempfile::tempdir().unwrap();
            let connector = DirectoryConnector::new(remote.path());
            Self {
                remote,
                repo: tempfile::tempdir().unwrap(),
                temp: tempfile::tempdir().unwrap(),
                connector,
            }
        }

        fn cache_with(&self, connector: &DirectoryConnector) -> ArtifactCache {
            let channel = RemoteChannel::with_connector(
                RemoteEndpoint::new("cache.example.com", 22, "ci", "KEY"),
                ChannelOptions::library_only(),
                Arc::new(connector.clone()),
            );
            ArtifactCache::new(
                CacheBackend::Enabled(channel),
                ArtifactArchiver::new(MavenRepository::new(self.repo.path())),
            )
        }

        fn cache(&self) -> ArtifactCache {
            self.cache_with(&self.connector)
        }

        fn seed_local(&self, version: &str) {
            for dir in anvil_core::ARTIFACT_DIRS {
                let path = self.repo.path().join(dir).join(version);
                fs::create_dir_all(&path).unwrap();
                fs::write(path.join("artifact.jar"), format!("{dir} {version}")).unwrap();
            }
        }

        fn temp_is_empty(&self) -> bool {
            fs::read_dir(self.temp.path()).unwrap().next().is_none()
        }
    }

    #[tokio::test]
    async fn test_disabled_cache_fails_fast() {
        let repo = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::from_endpoint(
            RemoteEndpoint::new("", 22, "", ""),
            ChannelOptions::library_only(),
            ArtifactArchiver::new(MavenRepository::new(repo.path())),
        );
        let reporter = RecordingReporter::new();

        assert!(!cache.is_available());
        assert!(matches!(
            cache.restore_if_present(VERSION, repo.path(), &reporter).await,
            Err(Error::CacheUnavailable)
        ));
        assert!(matches!(
            cache.store_artifact(VERSION, repo.path(), &reporter).await,
            Err(Error::CacheUnavailable)
        ));
        assert!(cache.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_store_then_restore_round_trip() {
        let fixture = Fixture::new();
        let cache = fixture.cache();
        let reporter = RecordingReporter::new();
        fixture.seed_local(VERSION);

        assert!(cache.store_artifact(VERSION, fixture.temp.path(), &reporter).await.unwrap());
        assert!(fixture.remote.path().join(CACHE_ROOT).join("1.20.1.tar.gz").is_file());
        assert!(fixture.temp_is_empty());

        fs::remove_dir_all(fixture.repo.path().join("org")).unwrap();

        assert!(cache.restore_if_present(VERSION, fixture.temp.path(), &reporter).await.unwrap());
        for dir in anvil_core::ARTIFACT_DIRS {
            let jar = fixture.repo.path().join(dir).join(VERSION).join("artifact.jar");
            assert_eq!(fs::read_to_string(jar).unwrap(), format!("{dir} {VERSION}"));
        }
        assert!(fixture.temp_is_empty());
        assert!(reporter.errors().is_empty());
        assert!(reporter.infos().iter().any(|m| m.starts_with("Downloading cache for version '1.20.1'")));
        assert_eq!(fixture.connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_miss_is_not_an_error() {
        let fixture = Fixture::new();
        let cache = fixture.cache();
        let reporter = RecordingReporter::new();

        assert!(!cache.restore_if_present("1.19.4", fixture.temp.path(), &reporter).await.unwrap());
        assert!(reporter.errors().is_empty());
        assert!(fixture.temp_is_empty());
    }

    #[tokio::test]
    async fn test_directory_at_cache_path_is_a_miss() {
        let fixture = Fixture::new();
        fs::create_dir_all(fixture.remote.path().join(CACHE_ROOT).join("1.19.4.tar.gz")).unwrap();
        let cache = fixture.cache();
        let reporter = RecordingReporter::new();

        assert!(!cache.restore_if_present("1.19.4", fixture.temp.path(), &reporter).await.unwrap());
        assert!(reporter.errors().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_reported_and_cleaned_up() {
        let fixture = Fixture::new();
        let root = fixture.remote.path().join(CACHE_ROOT);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("1.20.1.tar.gz"), b"not a gzip stream").unwrap();
        let cache = fixture.cache();
        let reporter = RecordingReporter::new();

        assert!(!cache.restore_if_present(VERSION, fixture.temp.path(), &reporter).await.unwrap());
        let errors = reporter.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Failed to fetch cache from SFTP server (version=1.20.1)"));
        assert!(fixture.temp_is_empty());
    }

    #[tokio::test]
    async fn test_store_without_artifacts_returns_false() {
        let fixture = Fixture::new();
        let cache = fixture.cache();
        let reporter = RecordingReporter::new();

        assert!(!cache.store_artifact(VERSION, fixture.temp.path(), &reporter).await.unwrap());
        assert_eq!(reporter.errors().len(), 1);
        assert!(reporter.errors()[0].contains("No artifacts found"));
        assert!(fixture.temp_is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_degrades_to_false() {
        let fixture = Fixture::new();
        let connector = DirectoryConnector::new(fixture.remote.path()).failing("Connection refused");
        let cache = fixture.cache_with(&connector);
        let reporter = RecordingReporter::new();
        fixture.seed_local(VERSION);

        assert!(!cache.restore_if_present(VERSION, fixture.temp.path(), &reporter).await.unwrap());
        assert!(!cache.store_artifact(VERSION, fixture.temp.path(), &reporter).await.unwrap());
        assert_eq!(reporter.errors().len(), 2);
        assert_eq!(connector.connect_count(), 1);
        assert!(fixture.temp_is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_stores_share_one_connection() {
        let fixture = Fixture::new();
        let connector = DirectoryConnector::new(fixture.remote.path()).with_delay(Duration::from_millis(150));
        let cache = Arc::new(fixture.cache_with(&connector));
        let versions = ["1.18.2", "1.19.4", "1.20.1", "1.20.4"];
        for version in versions {
            fixture.seed_local(version);
        }

        let temp = fixture.temp.path().to_path_buf();
        let mut tasks = Vec::new();
        for version in versions {
            let cache = Arc::clone(&cache);
            let temp = temp.clone();
            tasks.push(tokio::spawn(async move {
                let reporter = RecordingReporter::new();
                cache.store_artifact(version, &temp, &reporter).await.unwrap()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(connector.connect_count(), 1);
        for version in versions {
            assert!(fixture.remote.path().join(CACHE_ROOT).join(format!("{version}.tar.gz")).is_file());
        }

        cache.shutdown().await.unwrap();
        assert_eq!(connector.disconnect_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stores_of_one_version_use_separate_archives() {
        let fixture = Fixture::new();
        let connector = DirectoryConnector::new(fixture.remote.path()).with_delay(Duration::from_millis(200));
        let cache = Arc::new(fixture.cache_with(&connector));
        fixture.seed_local("1.21.4-R0.1-SNAPSHOT");

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let cache = Arc::clone(&cache);
            let temp = fixture.temp.path().to_path_buf();
            tasks.push(tokio::spawn(async move {
                let reporter = RecordingReporter::new();
                let stored = cache.store_artifact("1.21.4-R0.1-SNAPSHOT", &temp, &reporter).await.unwrap();
                (stored, reporter.errors())
            }));
        }
        for task in tasks {
            let (stored, errors) = task.await.unwrap();
            assert!(stored, "store failed: {errors:?}");
            assert!(errors.is_empty());
        }
        assert!(fixture.temp_is_empty());

        fs::remove_dir_all(fixture.repo.path().join("org")).unwrap();
        let reporter = RecordingReporter::new();
        assert!(cache
            .restore_if_present("1.21.4-R0.1-SNAPSHOT", fixture.temp.path(), &reporter)
            .await
            .unwrap());
        assert!(reporter.errors().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_version_is_reported_not_raised() {
        let fixture = Fixture::new();
        let cache = fixture.cache();
        let reporter = RecordingReporter::new();

        assert!(!cache.restore_if_present("../escape", fixture.temp.path(), &reporter).await.unwrap());
        assert_eq!(reporter.errors().len(), 1);
        assert_eq!(fixture.connector.connect_count(), 0);
    }
}
