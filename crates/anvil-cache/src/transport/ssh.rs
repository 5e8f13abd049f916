//! `libssh2`-backed transport.

use super::{host_key_matches, Connector, EntryKind, RemoteStat, SftpSession, TransportError};
use crate::config::RemoteEndpoint;
use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
    Engine,
};
use ssh2::{ErrorCode, HashType, Session, Sftp};
use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::path::Path;
use tracing::debug;

/// `LIBSSH2_FX_NO_SUCH_FILE`
const SFTP_NO_SUCH_FILE: i32 = 2;

/// Connects over TCP with `libssh2` and authenticates with an in-memory key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssh2Connector;

impl Connector for Ssh2Connector {
    fn connect(&self, endpoint: &RemoteEndpoint) -> Result<Box<dyn SftpSession>, TransportError> {
        let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;

        if let Some(expected) = endpoint.expected_host_key() {
            verify_host_key(&session, expected)?;
        }

        session
            .userauth_pubkey_memory(&endpoint.username, None, &endpoint.private_key, None)
            .map_err(|e| TransportError::Authentication(e.message().to_string()))?;
        if !session.authenticated() {
            return Err(TransportError::Authentication(
                "server did not accept the private key".to_string(),
            ));
        }

        let sftp = session.sftp()?;
        debug!(host = %endpoint.host, port = endpoint.port, "SFTP session established");

        Ok(Box::new(Ssh2Session { sftp, session }))
    }
}

fn verify_host_key(session: &Session, expected: &str) -> Result<(), TransportError> {
    let (key, _) = session.host_key().ok_or(TransportError::HostKeyMismatch)?;
    let key_base64 = STANDARD.encode(key);
    let fingerprint = session
        .host_key_hash(HashType::Sha256)
        .map(|hash| STANDARD_NO_PAD.encode(hash))
        .unwrap_or_default();

    if host_key_matches(expected, &key_base64, &fingerprint) {
        Ok(())
    } else {
        Err(TransportError::HostKeyMismatch)
    }
}

impl From<ssh2::Error> for TransportError {
    fn from(err: ssh2::Error) -> Self {
        TransportError::Protocol(err.message().to_string())
    }
}

struct Ssh2Session {
    sftp: Sftp,
    session: Session,
}

fn is_no_such_file(err: &ssh2::Error) -> bool {
    matches!(err.code(), ErrorCode::SFTP(code) if code == SFTP_NO_SUCH_FILE)
}

impl SftpSession for Ssh2Session {
    fn stat(&mut self, path: &str) -> Result<RemoteStat, TransportError> {
        match self.sftp.stat(Path::new(path)) {
            Ok(stat) => {
                let kind = if stat.is_dir() {
                    EntryKind::Directory
                } else if stat.is_file() {
                    EntryKind::File
                } else {
                    EntryKind::Missing
                };
                Ok(RemoteStat {
                    kind,
                    size: stat.size.unwrap_or(0),
                })
            }
            Err(err) if is_no_such_file(&err) => Ok(RemoteStat::missing()),
            Err(err) => Err(err.into()),
        }
    }

    fn mkdir(&mut self, path: &str) -> Result<(), TransportError> {
        self.sftp.mkdir(Path::new(path), 0o755)?;
        Ok(())
    }

    fn download(&mut self, remote: &str, local: &Path) -> Result<u64, TransportError> {
        let mut remote_file = self.sftp.open(Path::new(remote))?;
        let mut local_file = File::create(local)?;
        let bytes = io::copy(&mut remote_file, &mut local_file)?;
        local_file.sync_all()?;
        Ok(bytes)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, TransportError> {
        let mut local_file = File::open(local)?;
        let mut remote_file = self.sftp.create(Path::new(remote))?;
        let bytes = io::copy(&mut local_file, &mut remote_file)?;
        remote_file.close()?;
        Ok(bytes)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.session.disconnect(None, "anvil cache shutdown", None)?;
        Ok(())
    }
}
