//! In-process stand-ins for the SFTP server and the reporter.
//!
//! Enabled for this crate's tests and, through the `mock` feature, for other
//! crates' dev-dependencies.

use crate::config::RemoteEndpoint;
use crate::report::CacheReporter;
use crate::transport::{
    host_key_matches, Connector, EntryKind, RemoteStat, SftpSession, TransportError,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Connector whose "server" is a local directory.
///
/// Clones share their counters, so a test can keep a clone after handing one
/// to a channel.
#[derive(Debug, Clone)]
pub struct DirectoryConnector {
    root: PathBuf,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    delay: Duration,
    failure: Option<String>,
    host_key: Option<String>,
}

impl DirectoryConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            failure: None,
            host_key: None,
        }
    }

    /// Block inside `connect` for `delay`, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every connect attempt with a protocol error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Present this host key (`<type> <base64>`) to clients.
    pub fn with_host_key(mut self, key: impl Into<String>) -> Self {
        self.host_key = Some(key.into());
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Connector for DirectoryConnector {
    fn connect(&self, endpoint: &RemoteEndpoint) -> Result<Box<dyn SftpSession>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        if let Some(message) = &self.failure {
            return Err(TransportError::Protocol(message.clone()));
        }

        if let (Some(expected), Some(presented)) = (endpoint.expected_host_key(), &self.host_key) {
            let key_base64 = presented.split_whitespace().nth(1).unwrap_or_default();
            if !host_key_matches(expected, key_base64, "") {
                return Err(TransportError::HostKeyMismatch);
            }
        }

        Ok(Box::new(DirectorySession {
            root: self.root.clone(),
            disconnects: Arc::clone(&self.disconnects),
        }))
    }
}

struct DirectorySession {
    root: PathBuf,
    disconnects: Arc<AtomicUsize>,
}

impl DirectorySession {
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl SftpSession for DirectorySession {
    fn stat(&mut self, path: &str) -> Result<RemoteStat, TransportError> {
        match fs::metadata(self.resolve(path)) {
            Ok(meta) if meta.is_dir() => Ok(RemoteStat {
                kind: EntryKind::Directory,
                size: 0,
            }),
            Ok(meta) => Ok(RemoteStat {
                kind: EntryKind::File,
                size: meta.len(),
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(RemoteStat::missing()),
            Err(err) => Err(err.into()),
        }
    }

    fn mkdir(&mut self, path: &str) -> Result<(), TransportError> {
        fs::create_dir(self.resolve(path))?;
        Ok(())
    }

    fn download(&mut self, remote: &str, local: &Path) -> Result<u64, TransportError> {
        Ok(fs::copy(self.resolve(remote), local)?)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, TransportError> {
        Ok(fs::copy(local, self.resolve(remote))?)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reporter that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    infos: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl CacheReporter for RecordingReporter {
    fn info(&self, message: &str) {
        if let Ok(mut infos) = self.infos.lock() {
            infos.push(message.to_string());
        }
    }

    fn error(&self, message: &str) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(message.to_string());
        }
    }
}
