//! Cache entry naming.

use anvil_core::{validate_version, Result};

/// Directory on the cache server holding one archive per version.
pub const CACHE_ROOT: &str = "anvil-spigot-cache";

/// Remote path of the archive for a canonical version.
pub fn remote_cache_path(version: &str) -> Result<String> {
    validate_version(version)?;
    Ok(format!("{}/{}.tar.gz", CACHE_ROOT, version))
}

/// File name prefix of the scratch archives for `version`. Each operation
/// appends its own random suffix.
pub fn temp_archive_prefix(version: &str) -> Result<String> {
    validate_version(version)?;
    Ok(format!("cache-{}-", version))
}
