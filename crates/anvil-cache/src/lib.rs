//! Remote artifact cache for Anvil builds.
//!
//! Build outputs for one version are bundled into a `tar.gz` archive and kept
//! on an SFTP server under a fixed directory, one file per canonical version.
//! Every cache operation is best-effort: failures are reported and turn into
//! "proceed without cache".

pub mod archiver;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod format;
pub mod keys;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod report;
pub mod scp;
pub mod transport;

pub use archiver::ArtifactArchiver;
pub use channel::RemoteChannel;
pub use config::{CacheSettings, ChannelOptions, RemoteEndpoint};
pub use coordinator::{ArtifactCache, CacheBackend};
pub use format::format_bytes;
pub use keys::{remote_cache_path, CACHE_ROOT};
pub use report::{CacheReporter, TracingReporter};
pub use transport::EntryKind;
