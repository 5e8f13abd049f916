//! CLI command definitions.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Build the requested versions, restoring from and uploading to the cache
    Build(BuildArgs),

    /// Show which versions would be built, without touching the cache
    Plan(VersionArgs),
}

/// Which versions to consider and how their jars are named.
#[derive(Args, Debug, Clone, Default)]
pub struct VersionArgs {
    /// Comma separated versions (e.g. `latest,1.20.1`)
    #[arg(short, long)]
    pub versions: Option<String>,

    /// Build and look for Mojang-mapped jars
    #[arg(long)]
    pub remapped: bool,

    /// Local Maven repository (defaults to ~/.m2/repository)
    #[arg(long)]
    pub maven_repository: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    #[command(flatten)]
    pub versions: VersionArgs,

    /// Build tool provider
    #[arg(long)]
    pub provider: Option<String>,

    /// Rebuild versions that already exist locally
    #[arg(short, long)]
    pub force: bool,

    /// Maximum number of parallel builds
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Pass --generate-source to BuildTools
    #[arg(long)]
    pub generate_source: bool,

    /// Pass --generate-docs to BuildTools
    #[arg(long)]
    pub generate_docs: bool,

    /// Pass --disable-java-check to BuildTools
    #[arg(long)]
    pub disable_java_check: bool,

    /// Directory BuildTools copies the final jars into
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub cache: CacheArgs,
}

/// SFTP cache overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct CacheArgs {
    /// SFTP cache host; empty disables the cache
    #[arg(long)]
    pub cache_host: Option<String>,

    #[arg(long)]
    pub cache_port: Option<u16>,

    #[arg(long)]
    pub cache_user: Option<String>,

    /// File holding the private key (otherwise $ANVIL_SFTP_PRIVATE_KEY)
    #[arg(long)]
    pub cache_private_key_file: Option<PathBuf>,

    /// Expected host key: `<type> <base64>` or `SHA256:<base64>`
    #[arg(long)]
    pub cache_host_key: Option<String>,

    /// Never use the external scp binary for downloads
    #[arg(long)]
    pub no_scp: bool,
}
