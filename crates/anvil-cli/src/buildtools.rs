//! Running BuildTools and other external processes.

use anvil_core::{Error, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// File name BuildTools is downloaded to inside the template directory.
pub const BUILD_TOOLS_JAR: &str = "BuildTools.jar";

/// Optional BuildTools flags shared by every version of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildToolsOptions {
    pub generate_source: bool,
    pub generate_docs: bool,
    pub disable_java_check: bool,
    pub remapped: bool,
    /// Absolute directory for the final jars.
    pub output_dir: Option<PathBuf>,
}

impl BuildToolsOptions {
    /// `java` arguments building `version`.
    pub fn args(&self, version: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-jar", BUILD_TOOLS_JAR, "--compile", "Spigot", "--nogui"]
            .into_iter()
            .map(OsString::from)
            .collect();

        if self.generate_source {
            args.push("--generate-source".into());
        }
        if self.generate_docs {
            args.push("--generate-docs".into());
        }
        if self.disable_java_check {
            args.push("--disable-java-check".into());
        }
        if self.remapped {
            args.push("--remapped".into());
        }
        if let Some(dir) = &self.output_dir {
            args.push("--output-dir".into());
            args.push(dir.as_os_str().to_os_string());
        }

        args.push("--rev".into());
        args.push(version.into());
        args
    }
}

/// Builds one version inside a prepared directory.
#[async_trait]
pub trait VersionBuilder: Send + Sync {
    /// Build `version` in `dir`, appending all process output to `log`.
    async fn build(&self, version: &str, dir: &Path, log: &Path) -> Result<()>;
}

/// Builds with `java -jar BuildTools.jar`.
pub struct BuildToolsBuilder {
    java: String,
    options: BuildToolsOptions,
}

impl BuildToolsBuilder {
    pub fn new(options: BuildToolsOptions) -> Self {
        Self {
            java: "java".to_string(),
            options,
        }
    }
}

#[async_trait]
impl VersionBuilder for BuildToolsBuilder {
    async fn build(&self, version: &str, dir: &Path, log: &Path) -> Result<()> {
        if let Some(output_dir) = &self.options.output_dir {
            tokio::fs::create_dir_all(output_dir).await?;
        }

        let mut command = Command::new(&self.java);
        command.args(self.options.args(version)).current_dir(dir);

        let status = run_command(command, OutputSink::file(log).await?).await?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::BuildFailed {
                version: version.to_string(),
                exit_code: status.code(),
            })
        }
    }
}

/// Log the output of `java -version`. Fails if java cannot be run.
pub async fn log_java_version(java: &str, dir: &Path) -> Result<()> {
    let mut command = Command::new(java);
    command.arg("-version").current_dir(dir);

    let status = run_command(command, OutputSink::Tracing).await?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::exit_status(java, status.code()))
    }
}

/// Where process output lines go.
pub enum OutputSink {
    File(Mutex<tokio::fs::File>),
    Tracing,
}

impl OutputSink {
    /// Append to `path`, creating it if needed.
    pub async fn file(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        Ok(Self::File(Mutex::new(file)))
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        match self {
            Self::File(file) => {
                let mut file = file.lock().await;
                file.write_all(line.as_bytes()).await?;
                file.write_all(b"\n").await
            }
            Self::Tracing => {
                info!("{}", line);
                Ok(())
            }
        }
    }

    async fn flush(&self) -> std::io::Result<()> {
        match self {
            Self::File(file) => file.lock().await.flush().await,
            Self::Tracing => Ok(()),
        }
    }
}

/// Run `command` to completion, forwarding stdout and stderr to `sink`.
pub async fn run_command(mut command: Command, sink: OutputSink) -> Result<ExitStatus> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    debug!(program = %program, "Spawning process");

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Internal(format!("Failed to spawn {}: {}", program, e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Internal("stdout was not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Internal("stderr was not captured".into()))?;

    let sink = Arc::new(sink);
    let stdout_handle = tokio::spawn(forward(stdout, Arc::clone(&sink)));
    let stderr_handle = tokio::spawn(forward(stderr, Arc::clone(&sink)));

    let status = child
        .wait()
        .await
        .map_err(|e| Error::Internal(format!("Failed to wait for {}: {}", program, e)))?;

    for handle in [stdout_handle, stderr_handle] {
        handle
            .await
            .map_err(|e| Error::Internal(format!("Output task failed: {}", e)))??;
    }
    sink.flush().await?;

    Ok(status)
}

async fn forward<R: AsyncRead + Unpin>(reader: R, sink: Arc<OutputSink>) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        sink.write_line(line.trim_end_matches(['\n', '\r'])).await?;
    }
}

/// Recursively copy the directory `src` to `dst`.
pub async fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || copy_dir_blocking(&src, &dst))
        .await
        .map_err(|e| Error::Internal(format!("Copy task failed: {}", e)))?
}

fn copy_dir_blocking(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_blocking(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
