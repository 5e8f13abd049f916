//! Parallel build phase.
//!
//! Each version builds in its own worker, at most `threads` at a time. A
//! successful build is uploaded to the cache from inside its worker, so the
//! phase only completes once every upload has settled.

use crate::buildtools::{copy_dir, VersionBuilder};
use crate::tail::last_lines;
use crate::workdir::WorkDir;
use anvil_cache::{ArtifactCache, CacheReporter};
use anvil_core::{Error, Result, VersionRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Log lines printed when a build fails.
pub const FAILURE_TAIL_LINES: usize = 30;

/// Everything a worker needs, shared across the phase.
pub struct BuildContext {
    pub workdir: WorkDir,
    pub builder: Arc<dyn VersionBuilder>,
    pub cache: Arc<ArtifactCache>,
    pub reporter: Arc<dyn CacheReporter>,
}

/// Per-version outcome of the build phase.
#[derive(Debug)]
pub struct BuildReport {
    pub request: VersionRequest,
    pub result: Result<()>,
    pub uploaded: bool,
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    pub reports: Vec<BuildReport>,
}

impl BuildSummary {
    pub fn failed(&self) -> impl Iterator<Item = &BuildReport> {
        self.reports.iter().filter(|r| r.result.is_err())
    }

    /// First failure, if any version failed.
    pub fn into_result(self) -> Result<()> {
        let failures: Vec<String> = self.failed().map(|r| r.request.token.clone()).collect();
        if failures.is_empty() {
            return Ok(());
        }
        match self.reports.into_iter().find_map(|r| r.result.err()) {
            Some(err) if failures.len() == 1 => Err(err),
            _ => Err(Error::Internal(format!("Builds failed for: {}", failures.join(", ")))),
        }
    }
}

/// Build every request with at most `threads` builds in flight.
pub async fn run_builds(ctx: Arc<BuildContext>, jobs: Vec<VersionRequest>, threads: usize) -> BuildSummary {
    let semaphore = Arc::new(Semaphore::new(threads.max(1)));
    let use_copies = jobs.len() != 1;
    let mut join_set = JoinSet::new();

    for request in jobs {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                let result = Err(Error::Internal("build scheduler closed".into()));
                return BuildReport { request, result, uploaded: false };
            };
            build_one(&ctx, request, use_copies).await
        });
    }

    let mut summary = BuildSummary::default();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                error!(error = %e, "Build worker panicked");
                summary.reports.push(BuildReport {
                    request: VersionRequest::new("<unknown>"),
                    result: Err(Error::Internal(format!("Build worker failed: {}", e))),
                    uploaded: false,
                });
            }
        }
    }
    summary
}

async fn build_one(ctx: &BuildContext, request: VersionRequest, use_copy: bool) -> BuildReport {
    let version = request.token.clone();
    let log = ctx.workdir.version_log(&version);
    let start = Instant::now();

    info!("Building version '{}'...", version);

    let result = build_in_place(ctx, &version, &log, use_copy).await;

    if let Err(e) = &result {
        report_failure(&version, e, &log).await;
        return BuildReport { request, result, uploaded: false };
    }

    info!(
        "Finished '{}' in {:.2} minutes",
        request,
        start.elapsed().as_secs_f64() / 60.0
    );

    let uploaded = upload(ctx, &request).await;
    BuildReport { request, result, uploaded }
}

async fn build_in_place(ctx: &BuildContext, version: &str, log: &Path, use_copy: bool) -> Result<()> {
    if !use_copy {
        return ctx.builder.build(version, &ctx.workdir.template, log).await;
    }

    let dir: PathBuf = ctx.workdir.version_dir(version);
    copy_dir(&ctx.workdir.template, &dir).await?;
    let result = ctx.builder.build(version, &dir, log).await;
    if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
        warn!(dir = %dir.display(), error = %e, "Failed to remove build directory");
    }
    result
}

/// Upload a fresh build. Only versions resolved through the registry are
/// stored, so cache keys are always canonical versions.
async fn upload(ctx: &BuildContext, request: &VersionRequest) -> bool {
    let Some(artifact_version) = request.artifact_version.as_deref() else {
        return false;
    };
    if !ctx.cache.is_available() {
        return false;
    }

    match ctx
        .cache
        .store_artifact(artifact_version, &ctx.workdir.tmp, ctx.reporter.as_ref())
        .await
    {
        Ok(true) => {
            info!("Uploaded cache for version '{}' ({}) to SFTP server", request.token, artifact_version);
            true
        }
        Ok(false) => false,
        Err(e) => {
            warn!(error = %e, "Cache upload skipped");
            false
        }
    }
}

async fn report_failure(version: &str, err: &Error, log: &Path) {
    error!("An error occurred while building '{}': {}", version, err);

    let shown = std::path::absolute(log).unwrap_or_else(|_| log.to_path_buf());
    match last_lines(log, FAILURE_TAIL_LINES).await {
        Ok(lines) => {
            error!("Printing last {} lines from '{}':", FAILURE_TAIL_LINES, shown.display());
            for line in lines {
                error!("{}", line);
            }
        }
        Err(e) => error!("Could not read build log '{}': {}", shown.display(), e),
    }
}
