//! Version resolution for Anvil.
//!
//! Maps requested version tokens to canonical artifact versions through the
//! SpigotMC hub, then decides per version whether the local repository or
//! the remote cache already provides it.

pub mod pom;
pub mod registry;
pub mod resolver;

pub use registry::{SpigotHubRegistry, VersionRegistry};
pub use resolver::{Resolution, Satisfaction, SatisfiedVersion, VersionResolver};
