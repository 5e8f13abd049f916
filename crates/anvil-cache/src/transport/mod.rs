//! Low-level SFTP transport.
//!
//! A [`Connector`] opens one authenticated [`SftpSession`] per channel. Both
//! traits are blocking; [`RemoteChannel`](crate::RemoteChannel) drives them
//! from `spawn_blocking` and serializes session access behind a mutex.
//!
//! Failures stay as [`TransportError`] until they leave the crate through
//! [`connection_error`] or [`transfer_error`].

mod ssh;

pub use self::ssh::Ssh2Connector;
use crate::config::RemoteEndpoint;
use anvil_core::Error;
use std::path::Path;
use thiserror::Error;

/// Public message for any server identity mismatch.
pub const HOST_KEY_VERIFICATION_FAILED: &str = "Host key verification failed";

/// What a remote path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Missing,
    File,
    Directory,
}

/// Remote metadata relevant to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub kind: EntryKind,
    pub size: u64,
}

impl RemoteStat {
    pub fn missing() -> Self {
        Self {
            kind: EntryKind::Missing,
            size: 0,
        }
    }
}

/// Backend failures, before translation into [`anvil_core::Error`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("server host key does not match the expected key")]
    HostKeyMismatch,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Protocol(String),

    #[error("{path} exists and is not a directory")]
    NotADirectory { path: String },
}

/// Opens authenticated sessions to an endpoint.
pub trait Connector: Send + Sync {
    /// Connect, verify the server identity, and authenticate.
    fn connect(&self, endpoint: &RemoteEndpoint) -> Result<Box<dyn SftpSession>, TransportError>;
}

/// One open SFTP session. Paths are remote, `/`-separated.
pub trait SftpSession: Send {
    /// Stat a path; a missing path is not an error.
    fn stat(&mut self, path: &str) -> Result<RemoteStat, TransportError>;

    /// Create a single directory.
    fn mkdir(&mut self, path: &str) -> Result<(), TransportError>;

    /// Copy a remote file to a local path, returning the bytes copied.
    fn download(&mut self, remote: &str, local: &Path) -> Result<u64, TransportError>;

    /// Copy a local file to a remote path, returning the bytes copied.
    fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;
}

/// Create `dir` and all missing parents. Existing directories are fine.
pub fn ensure_dir_all(session: &mut dyn SftpSession, dir: &str) -> Result<(), TransportError> {
    let mut current = String::new();
    if dir.starts_with('/') {
        current.push('/');
    }

    for component in dir.split('/').filter(|c| !c.is_empty()) {
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(component);

        match session.stat(&current)?.kind {
            EntryKind::Directory => continue,
            EntryKind::File => return Err(TransportError::NotADirectory { path: current }),
            EntryKind::Missing => {
                if let Err(err) = session.mkdir(&current) {
                    // Another writer may have created it in the meantime.
                    if session.stat(&current)?.kind != EntryKind::Directory {
                        return Err(err);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Compare a configured host key against the key the server presented.
///
/// `expected` may be `<type> <base64>`, a known-hosts line, or
/// `SHA256:<base64>`; `key_base64` is the presented key and
/// `sha256_fingerprint` its unpadded base64 SHA-256 digest.
pub fn host_key_matches(expected: &str, key_base64: &str, sha256_fingerprint: &str) -> bool {
    expected.split_whitespace().any(|token| {
        if let Some(fingerprint) = token.strip_prefix("SHA256:") {
            !sha256_fingerprint.is_empty() && fingerprint.trim_end_matches('=') == sha256_fingerprint
        } else {
            !key_base64.is_empty() && token == key_base64
        }
    })
}

/// Translate a connect-time failure into the public error.
///
/// Host key mismatches, including library phrasings of them, all become
/// [`HOST_KEY_VERIFICATION_FAILED`].
pub fn connection_error(err: TransportError) -> Error {
    let message = match err {
        TransportError::HostKeyMismatch => HOST_KEY_VERIFICATION_FAILED.to_string(),
        TransportError::Protocol(message) | TransportError::Authentication(message)
            if is_host_key_rejection(&message) =>
        {
            HOST_KEY_VERIFICATION_FAILED.to_string()
        }
        other => other.to_string(),
    };
    Error::Connection(message)
}

/// Translate a get/put failure into the public error.
pub fn transfer_error(err: TransportError) -> Error {
    Error::Transfer {
        exit_code: None,
        message: err.to_string(),
    }
}

fn is_host_key_rejection(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("host denied")
        || (message.contains("host key") && message.contains("verif"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_key_matches_public_key_line() {
        assert!(host_key_matches("ssh-ed25519 AAAAC3Nza", "AAAAC3Nza", ""));
        assert!(host_key_matches(
            "[cache.example.com]:2222 ssh-ed25519 AAAAC3Nza",
            "AAAAC3Nza",
            ""
        ));
        assert!(!host_key_matches("ssh-ed25519 AAAAC3Nza", "AAAAother", ""));
    }

    #[test]
    fn test_host_key_matches_fingerprint() {
        assert!(host_key_matches("SHA256:abc123", "", "abc123"));
        assert!(host_key_matches("SHA256:abc123=", "", "abc123"));
        assert!(!host_key_matches("SHA256:abc123", "", "zzz"));
        assert!(!host_key_matches("SHA256:abc123", "", ""));
    }

    #[test]
    fn test_host_key_mismatch_translation() {
        let err = connection_error(TransportError::HostKeyMismatch);
        assert!(matches!(&err, Error::Connection(m) if m == HOST_KEY_VERIFICATION_FAILED));
    }

    #[test]
    fn test_library_host_denied_translation() {
        let err = connection_error(TransportError::Protocol(
            "Host denied (verification failed)".into(),
        ));
        assert!(matches!(&err, Error::Connection(m) if m == HOST_KEY_VERIFICATION_FAILED));
    }

    #[test]
    fn test_other_connect_errors_keep_their_message() {
        let err = connection_error(TransportError::Authentication("bad key".into()));
        assert!(matches!(&err, Error::Connection(m) if m == "authentication failed: bad key"));
    }
}
