//! Error types for Anvil.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Remote cache errors
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Transfer failed: {message}")]
    Transfer {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("Cache is not available")]
    CacheUnavailable,

    // Local archive errors
    #[error("No artifacts found in local Maven repository for version {version}")]
    NoArtifactsFound { version: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid version: {0:?}")]
    InvalidVersion(String),

    // Version registry errors
    #[error("Version registry error: {0}")]
    Registry(String),

    // Build errors
    #[error("Build of version {version} failed with exit code {exit_code:?}")]
    BuildFailed {
        version: String,
        exit_code: Option<i32>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    // Infrastructure errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl Error {
    /// Build a transfer error for an external process that exited unsuccessfully.
    pub fn exit_status(program: &str, exit_code: Option<i32>) -> Self {
        let message = match exit_code {
            Some(code) => format!("{} exited with code {}", program, code),
            None => format!("{} was terminated by a signal", program),
        };
        Error::Transfer { exit_code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_message() {
        let err = Error::exit_status("scp", Some(1));
        assert_eq!(err.to_string(), "Transfer failed: scp exited with code 1");
        assert!(matches!(err, Error::Transfer { exit_code: Some(1), .. }));
    }

    #[test]
    fn test_signal_exit_message() {
        let err = Error::exit_status("scp", None);
        assert_eq!(err.to_string(), "Transfer failed: scp was terminated by a signal");
    }
}
