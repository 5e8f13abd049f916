//! Lazily connected SFTP channel shared by all cache operations.
//!
//! The first operation opens the connection; every concurrent caller joins
//! that single attempt and observes its outcome. A failed attempt is
//! remembered, so a channel that could not connect stays unusable. Session
//! calls are blocking and run on the blocking pool, one at a time.

use crate::config::{ChannelOptions, RemoteEndpoint};
use crate::scp::TransferBinary;
use crate::transport::{
    connection_error, ensure_dir_all, transfer_error, Connector, EntryKind, SftpSession,
    Ssh2Connector, TransportError,
};
use anvil_core::{Error, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

type SharedSession = Arc<Mutex<Box<dyn SftpSession>>>;

/// Outcome of the one connection attempt. Failures keep their public message.
type ConnectOutcome = std::result::Result<SharedSession, String>;

/// A single, lazily established connection to the cache server.
pub struct RemoteChannel {
    endpoint: Arc<RemoteEndpoint>,
    connector: Arc<dyn Connector>,
    binary: Option<TransferBinary>,
    binary_usable: OnceCell<bool>,
    connection: OnceCell<ConnectOutcome>,
    shut_down: AtomicBool,
}

impl RemoteChannel {
    /// Channel backed by `libssh2`.
    pub fn new(endpoint: RemoteEndpoint, options: ChannelOptions) -> Self {
        Self::with_connector(endpoint, options, Arc::new(Ssh2Connector))
    }

    pub fn with_connector(
        endpoint: RemoteEndpoint,
        options: ChannelOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let binary = options
            .transfer_binary
            .map(|program| TransferBinary::new(program, options.probe_timeout));

        Self {
            endpoint: Arc::new(endpoint),
            connector,
            binary,
            binary_usable: OnceCell::new(),
            connection: OnceCell::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    /// Connect if not already connected. Idempotent.
    pub async fn connect(&self) -> Result<()> {
        self.session().await.map(|_| ())
    }

    /// What, if anything, lives at `path`.
    pub async fn exists(&self, path: &str) -> Result<EntryKind> {
        let path = path.to_string();
        self.run(move |session| Ok(session.stat(&path)?.kind)).await
    }

    /// Size of the file at `path`; `None` if there is no file there.
    pub async fn size_of(&self, path: &str) -> Result<Option<u64>> {
        let path = path.to_string();
        self.run(move |session| {
            let stat = session.stat(&path)?;
            Ok((stat.kind == EntryKind::File).then_some(stat.size))
        })
        .await
    }

    /// Download `remote` into `local`, preferring the transfer binary.
    pub async fn get(&self, remote: &str, local: &Path) -> Result<()> {
        self.ensure_open()?;

        if let Some(binary) = self.usable_binary().await {
            return binary.download(&self.endpoint, remote, local).await;
        }

        let remote = remote.to_string();
        let local = local.to_path_buf();
        let bytes = self
            .run(move |session| session.download(&remote, &local))
            .await?;
        debug!(bytes, "Downloaded over SFTP session");
        Ok(())
    }

    /// Upload `local` to `remote`, creating missing parent directories.
    pub async fn put(&self, local: &Path, remote: &str) -> Result<()> {
        let local = local.to_path_buf();
        let remote = remote.to_string();
        let bytes = self
            .run(move |session| {
                if let Some((dir, _)) = remote.rsplit_once('/') {
                    ensure_dir_all(session, dir)?;
                }
                session.upload(&local, &remote)
            })
            .await?;
        debug!(bytes, "Uploaded over SFTP session");
        Ok(())
    }

    /// Close the channel. Waits for an in-flight connect; never connects.
    ///
    /// The channel refuses all further operations afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let outcome = self
            .connection
            .get_or_init(|| async { Err("channel was shut down before connecting".to_string()) })
            .await;
        let Ok(session) = outcome else {
            return Ok(());
        };

        let session = Arc::clone(session);
        let closed = tokio::task::spawn_blocking(move || {
            let mut session = session
                .lock()
                .map_err(|_| Error::Internal("SFTP session lock poisoned".into()))?;
            session.close().map_err(transfer_error)
        })
        .await
        .map_err(|e| Error::Internal(format!("SFTP shutdown task failed: {}", e)))?;

        match &closed {
            Ok(()) => info!(host = %self.endpoint.host, "Closed SFTP cache connection"),
            Err(e) => warn!(error = %e, "Failed to close SFTP cache connection cleanly"),
        }
        closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::Connection("channel has been shut down".into()));
        }
        Ok(())
    }

    async fn session(&self) -> Result<SharedSession> {
        self.ensure_open()?;
        match self.connection.get_or_init(|| self.establish()).await {
            Ok(session) => Ok(Arc::clone(session)),
            Err(message) => Err(Error::Connection(message.clone())),
        }
    }

    async fn establish(&self) -> ConnectOutcome {
        let endpoint = Arc::clone(&self.endpoint);
        let connector = Arc::clone(&self.connector);

        info!(host = %endpoint.host, port = endpoint.port, user = %endpoint.username, "Connecting to SFTP cache server");

        let connected = tokio::task::spawn_blocking(move || connector.connect(&endpoint)).await;
        match connected {
            Ok(Ok(session)) => Ok(Arc::new(Mutex::new(session))),
            Ok(Err(e)) => {
                let message = match connection_error(e) {
                    Error::Connection(message) => message,
                    other => other.to_string(),
                };
                warn!(error = %message, "SFTP cache connection failed");
                Err(message)
            }
            Err(e) => Err(format!("connect task failed: {}", e)),
        }
    }

    async fn usable_binary(&self) -> Option<&TransferBinary> {
        let binary = self.binary.as_ref()?;
        if !binary.supports(&self.endpoint) {
            return None;
        }
        let usable = *self.binary_usable.get_or_init(|| binary.is_usable()).await;
        if !usable {
            debug!(program = binary.program(), "Falling back to SFTP session for downloads");
        }
        usable.then_some(binary)
    }

    /// Run a blocking session operation under the session lock.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SftpSession) -> std::result::Result<T, TransportError> + Send + 'static,
    {
        let session = self.session().await?;
        tokio::task::spawn_blocking(move || {
            let mut session = session
                .lock()
                .map_err(|_| Error::Internal("SFTP session lock poisoned".into()))?;
            op(&mut **session).map_err(transfer_error)
        })
        .await
        .map_err(|e| Error::Internal(format!("SFTP task failed: {}", e)))?
    }
}
