//! Local Maven repository layout.

use crate::version::validate_version;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Repository-relative directories that make up one cacheable build:
/// the server artifact, the API artifact, and the parent POM.
pub const ARTIFACT_DIRS: [&str; 3] = [
    "org/spigotmc/minecraft-server",
    "org/spigotmc/spigot-api",
    "org/spigotmc/spigot",
];

/// Directory holding the server jar, relative to the repository root.
const SERVER_JAR_DIR: &str = "org/spigotmc/spigot";

/// Naming convention of the server jar produced by a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JarNaming {
    #[default]
    Standard,
    /// Jars built with Mojang mappings (`--remapped`).
    Remapped,
}

/// A local Maven repository (usually `~/.m2/repository`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenRepository {
    root: PathBuf,
}

impl MavenRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Repository in the current user's home directory.
    pub fn user_default() -> Result<Self> {
        let dirs = directories::BaseDirs::new()
            .ok_or_else(|| Error::Config("Could not determine home directory".into()))?;
        Ok(Self::new(dirs.home_dir().join(".m2").join("repository")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute directories that may hold artifacts for `version`, in
    /// [`ARTIFACT_DIRS`] order.
    pub fn artifact_dirs(&self, version: &str) -> Result<Vec<PathBuf>> {
        validate_version(version)?;
        Ok(ARTIFACT_DIRS
            .iter()
            .map(|dir| self.root.join(dir).join(version))
            .collect())
    }

    /// Expected location of the server jar for `version`.
    pub fn server_jar(&self, version: &str, naming: JarNaming) -> Result<PathBuf> {
        validate_version(version)?;
        let file_name = match naming {
            JarNaming::Standard => format!("spigot-{}.jar", version),
            JarNaming::Remapped => format!("spigot-{}-remapped-mojang.jar", version),
        };
        Ok(self.root.join(SERVER_JAR_DIR).join(version).join(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_artifact_dirs() {
        let repo = MavenRepository::new("/home/ci/.m2/repository");
        let dirs = repo.artifact_dirs("1.20.1-R0.1-SNAPSHOT").unwrap();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/home/ci/.m2/repository/org/spigotmc/minecraft-server/1.20.1-R0.1-SNAPSHOT"),
                PathBuf::from("/home/ci/.m2/repository/org/spigotmc/spigot-api/1.20.1-R0.1-SNAPSHOT"),
                PathBuf::from("/home/ci/.m2/repository/org/spigotmc/spigot/1.20.1-R0.1-SNAPSHOT"),
            ]
        );
    }

    #[test]
    fn test_artifact_dirs_reject_traversal() {
        let repo = MavenRepository::new("/repo");
        assert!(matches!(
            repo.artifact_dirs("../etc"),
            Err(Error::InvalidVersion(_))
        ));
    }
}
