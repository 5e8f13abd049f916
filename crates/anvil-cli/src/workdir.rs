//! Per-run working directory.

use crate::buildtools::BUILD_TOOLS_JAR;
use anvil_core::Result;
use std::io::ErrorKind;
use std::path::PathBuf;

/// `<base>` holds per-version build copies, `cache/` the BuildTools
/// template, `logs/` all log files and `tmp/` scratch cache archives.
#[derive(Debug, Clone)]
pub struct WorkDir {
    pub base: PathBuf,
    pub template: PathBuf,
    pub logs: PathBuf,
    pub tmp: PathBuf,
}

impl WorkDir {
    pub fn default_base() -> PathBuf {
        std::env::temp_dir().join("anvil")
    }

    /// Wipe `base` and recreate the directory layout.
    pub fn reset(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        match std::fs::remove_dir_all(&base) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let workdir = Self {
            template: base.join("cache"),
            logs: base.join("logs"),
            tmp: base.join("tmp"),
            base,
        };
        for dir in [&workdir.template, &workdir.logs, &workdir.tmp] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(workdir)
    }

    pub fn app_log(&self) -> PathBuf {
        self.logs.join("anvil.log")
    }

    pub fn version_log(&self, version: &str) -> PathBuf {
        self.logs.join(format!("{}.log", version))
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.base.join(version)
    }

    pub fn build_tools_jar(&self) -> PathBuf {
        self.template.join(BUILD_TOOLS_JAR)
    }
}
