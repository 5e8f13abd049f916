//! Packing build outputs into cache archives and restoring them.

use anvil_core::{Error, MavenRepository, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bundles the artifact directories of one version from a local Maven
/// repository into a `tar.gz`, and extracts such bundles back into it.
#[derive(Debug, Clone)]
pub struct ArtifactArchiver {
    repository: MavenRepository,
}

impl ArtifactArchiver {
    pub fn new(repository: MavenRepository) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &MavenRepository {
        &self.repository
    }

    /// Repository-relative artifact directories present for `version`.
    pub fn collect(&self, version: &str) -> Result<Vec<PathBuf>> {
        let root = self.repository.root();
        let present = self
            .repository
            .artifact_dirs(version)?
            .into_iter()
            .filter(|path| path.exists())
            .filter_map(|path| path.strip_prefix(root).ok().map(Path::to_path_buf))
            .collect();
        Ok(present)
    }

    /// Pack every present artifact directory of `version` into `dest`.
    ///
    /// Returns the archive size in bytes. Nothing is written when the
    /// version has no artifacts.
    pub async fn pack(&self, version: &str, dest: &Path) -> Result<u64> {
        if !dest.is_absolute() {
            return Err(Error::InvalidArgument(format!(
                "Destination path must be absolute: {}",
                dest.display()
            )));
        }

        let entries = self.collect(version)?;
        if entries.is_empty() {
            return Err(Error::NoArtifactsFound {
                version: version.to_string(),
            });
        }

        debug!(version, entries = ?entries, dest = %dest.display(), "Packing artifacts");

        let root = self.repository.root().to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let packed = File::create(&dest)
                .map_err(Error::from)
                .and_then(|file| create_archive(BufWriter::new(file), &root, &entries));
            if let Err(e) = packed {
                let _ = std::fs::remove_file(&dest);
                return Err(e);
            }
            Ok(std::fs::metadata(&dest)?.len())
        })
        .await
        .map_err(|e| Error::Internal(format!("Archive task failed: {}", e)))?
    }

    /// Extract `archive` into the repository root, overwriting existing files.
    pub async fn unpack(&self, archive: &Path) -> Result<()> {
        if !archive.is_absolute() {
            return Err(Error::InvalidArgument(format!(
                "Archive path must be absolute: {}",
                archive.display()
            )));
        }

        let root = self.repository.root().to_path_buf();
        let archive = archive.to_path_buf();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root)?;
            let file = File::open(&archive)?;
            extract_archive(BufReader::new(file), &root)
        })
        .await
        .map_err(|e| Error::Internal(format!("Extract task failed: {}", e)))?
    }
}

/// Write a gzip-compressed tar of `entries` (relative to `base_dir`).
fn create_archive<W: Write>(writer: W, base_dir: &Path, entries: &[PathBuf]) -> Result<()> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        let abs_path = base_dir.join(entry);
        if abs_path.is_dir() {
            builder
                .append_dir_all(entry, &abs_path)
                .map_err(|e| Error::Internal(format!("Failed to pack dir: {}", e)))?;
        } else {
            builder
                .append_path_with_name(&abs_path, entry)
                .map_err(|e| Error::Internal(format!("Failed to pack file: {}", e)))?;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::Internal(format!("Failed to finish tar: {}", e)))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| Error::Internal(format!("Gzip finish failed: {}", e)))?;
    writer.flush()?;
    Ok(())
}

/// Extract a gzip-compressed tar into `dest`.
fn extract_archive<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_overwrite(true);
    archive.set_preserve_mtime(true);
    archive
        .unpack(dest)
        .map_err(|e| Error::Internal(format!("Failed to unpack archive: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const VERSION: &str = "1.20.1-R0.1-SNAPSHOT";

    fn seed(root: &Path, dir: &str, file: &str, contents: &[u8]) {
        let path = root.join(dir).join(VERSION);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(file), contents).unwrap();
    }

    #[tokio::test]
    async fn test_pack_and_unpack_restore_identical_files() {
        let repo = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        seed(repo.path(), "org/spigotmc/spigot", "spigot-1.20.1-R0.1-SNAPSHOT.jar", b"server jar");
        seed(repo.path(), "org/spigotmc/spigot-api", "spigot-api.jar", &[0u8, 1, 2, 255]);
        fs::create_dir_all(repo.path().join("org/spigotmc/unrelated/1.0")).unwrap();

        let archiver = ArtifactArchiver::new(MavenRepository::new(repo.path()));
        let archive = scratch.path().join("cache-test");
        let size = archiver.pack(VERSION, &archive).await.unwrap();
        assert_eq!(size, fs::metadata(&archive).unwrap().len());

        fs::remove_dir_all(repo.path().join("org")).unwrap();
        archiver.unpack(&archive).await.unwrap();

        assert_eq!(
            fs::read(repo.path().join("org/spigotmc/spigot").join(VERSION).join("spigot-1.20.1-R0.1-SNAPSHOT.jar")).unwrap(),
            b"server jar"
        );
        assert_eq!(
            fs::read(repo.path().join("org/spigotmc/spigot-api").join(VERSION).join("spigot-api.jar")).unwrap(),
            vec![0u8, 1, 2, 255]
        );
        assert!(!repo.path().join("org/spigotmc/minecraft-server").exists());
        assert!(!repo.path().join("org/spigotmc/unrelated").exists());
    }

    #[tokio::test]
    async fn test_pack_without_artifacts_creates_nothing() {
        let repo = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let archiver = ArtifactArchiver::new(MavenRepository::new(repo.path()));
        let archive = scratch.path().join("cache-empty");

        let err = archiver.pack(VERSION, &archive).await.unwrap_err();
        assert!(matches!(err, Error::NoArtifactsFound { ref version } if version == VERSION));
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_relative_paths_are_rejected() {
        let repo = tempfile::tempdir().unwrap();
        seed(repo.path(), "org/spigotmc/spigot", "a.jar", b"a");
        let archiver = ArtifactArchiver::new(MavenRepository::new(repo.path()));

        assert!(matches!(
            archiver.pack(VERSION, Path::new("relative.tar.gz")).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            archiver.unpack(Path::new("relative.tar.gz")).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_unpack_creates_missing_repository_and_overwrites() {
        let source = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        seed(source.path(), "org/spigotmc/spigot", "a.jar", b"fresh");
        let archive = scratch.path().join("cache-a");
        ArtifactArchiver::new(MavenRepository::new(source.path()))
            .pack(VERSION, &archive)
            .await
            .unwrap();

        let target_root = scratch.path().join("new-home/.m2/repository");
        let target = ArtifactArchiver::new(MavenRepository::new(&target_root));
        target.unpack(&archive).await.unwrap();

        let jar = target_root.join("org/spigotmc/spigot").join(VERSION).join("a.jar");
        fs::write(&jar, b"stale").unwrap();
        target.unpack(&archive).await.unwrap();
        assert_eq!(fs::read(&jar).unwrap(), b"fresh");
    }

    #[test]
    fn test_collect_lists_present_dirs_in_order() {
        let repo = tempfile::tempdir().unwrap();
        seed(repo.path(), "org/spigotmc/spigot", "a.jar", b"a");
        seed(repo.path(), "org/spigotmc/minecraft-server", "b.jar", b"b");
        let archiver = ArtifactArchiver::new(MavenRepository::new(repo.path()));

        assert_eq!(
            archiver.collect(VERSION).unwrap(),
            vec![
                PathBuf::from("org/spigotmc/minecraft-server").join(VERSION),
                PathBuf::from("org/spigotmc/spigot").join(VERSION),
            ]
        );
    }
}
