//! Anvil Core
//!
//! Core domain types and error handling for Anvil.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used by the cache, version resolution, and CLI crates.

pub mod error;
pub mod layout;
pub mod version;

pub use error::{Error, Result};
pub use layout::{JarNaming, MavenRepository, ARTIFACT_DIRS};
pub use version::{normalize_version_list, validate_version, VersionRequest, LATEST};
