//! Command handlers.

use crate::buildtools::{log_java_version, BuildToolsBuilder};
use crate::config::{CliConfig, PRIVATE_KEY_ENV};
use crate::download::{download_file, http_client, provider};
use crate::pipeline::{run_builds, BuildContext};
use crate::workdir::WorkDir;
use anvil_cache::{ArtifactArchiver, ArtifactCache, CacheReporter, TracingReporter};
use anvil_core::{Result, VersionRequest};
use anvil_versions::{Satisfaction, SpigotHubRegistry, VersionResolver};
use console::style;
use std::sync::Arc;
use tracing::{info, warn};

/// Resolve, restore, build and upload the configured versions.
///
/// The cache is shut down once everything else has finished, whatever the
/// outcome.
pub async fn build(config: &CliConfig, force: bool, workdir: WorkDir) -> Result<()> {
    let repository = config.repository()?;
    let endpoint = config.cache_endpoint(std::env::var(PRIVATE_KEY_ENV).ok())?;
    let cache = Arc::new(ArtifactCache::from_endpoint(
        endpoint,
        config.cache.channel_options(),
        ArtifactArchiver::new(repository),
    ));

    if cache.is_available() {
        info!("SFTP cache is configured and will be used");
    } else {
        info!("SFTP cache is not configured and will not be used");
    }

    let outcome = build_versions(config, force, workdir, Arc::clone(&cache)).await;

    if let Err(e) = cache.shutdown().await {
        warn!(error = %e, "Failed to shut down SFTP cache");
    }
    outcome
}

async fn build_versions(config: &CliConfig, force: bool, workdir: WorkDir, cache: Arc<ArtifactCache>) -> Result<()> {
    let tokens = config.version_tokens()?;
    if tokens.is_empty() {
        info!("No version(s) provided to build");
        return Ok(());
    }

    let provider = provider(&config.provider)?;
    let client = http_client()?;
    let reporter: Arc<dyn CacheReporter> = Arc::new(TracingReporter);
    let resolver = VersionResolver::new(
        Arc::new(SpigotHubRegistry::new(client.clone())?),
        config.repository()?,
        config.jar_naming(),
    );

    let jobs: Vec<VersionRequest> = if force {
        let mut jobs = Vec::with_capacity(tokens.len());
        for token in &tokens {
            jobs.push(resolver.resolve_request(token, reporter.as_ref()).await);
        }
        jobs
    } else {
        let resolution = resolver
            .resolve_all(&tokens, &cache, &workdir.tmp, reporter.as_ref())
            .await?;
        if resolution.is_complete() {
            info!("No new versions to build");
            return Ok(());
        }
        resolution.to_build
    };

    info!("Installed Java version:");
    log_java_version("java", &workdir.base).await?;

    info!("Downloading '{}'...", provider.url);
    download_file(&client, provider.url, &workdir.build_tools_jar()).await?;

    let ctx = Arc::new(BuildContext {
        builder: Arc::new(BuildToolsBuilder::new(config.build_tools_options()?)),
        workdir,
        cache,
        reporter,
    });

    run_builds(ctx, jobs, config.thread_count()).await.into_result()
}

/// Print which versions a build would skip and which it would build.
pub async fn plan(config: &CliConfig) -> Result<()> {
    let tokens = config.version_tokens()?;
    let resolver = VersionResolver::new(
        Arc::new(SpigotHubRegistry::new(http_client()?)?),
        config.repository()?,
        config.jar_naming(),
    );

    let resolution = resolver.plan(&tokens, &TracingReporter).await?;

    for satisfied in &resolution.satisfied {
        let source = match satisfied.source {
            Satisfaction::Local => "local",
            Satisfaction::Cache => "cache",
        };
        println!(
            "{} {} ({}) {}",
            style("✓").green(),
            style(&satisfied.request).bold(),
            source,
            style(satisfied.jar.display()).dim()
        );
    }
    for request in &resolution.to_build {
        println!("{} {} would be built", style("▶").cyan(), style(request).bold());
    }

    if resolution.is_complete() {
        println!("{} Nothing to build", style("✓").green());
    }
    Ok(())
}
