//! External `scp` download strategy.
//!
//! Large archives transfer faster through the native OpenSSH client than
//! through the embedded SFTP session, so downloads prefer it when a usable
//! binary is on the host. The private key and any generated known-hosts file
//! live in a scratch directory that is removed when the transfer ends.

use crate::config::RemoteEndpoint;
use anvil_core::{Error, Result};
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

/// Exit code of `scp -B` without operands (usage error).
const PROBE_EXIT_CODE: i32 = 1;

/// A transfer binary invoked in batch mode.
#[derive(Debug, Clone)]
pub struct TransferBinary {
    program: String,
    probe_timeout: Duration,
}

impl TransferBinary {
    pub fn new(program: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            probe_timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the binary without operands and check that it answers like scp.
    ///
    /// Never fails: a spawn error, a timeout, or any other exit code means
    /// the binary is not usable.
    pub async fn is_usable(&self) -> bool {
        let child = Command::new(&self.program)
            .arg("-B")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                debug!(program = %self.program, error = %e, "Transfer binary not available");
                return false;
            }
        };

        match timeout(self.probe_timeout, child.wait()).await {
            Ok(Ok(status)) => status.code() == Some(PROBE_EXIT_CODE),
            Ok(Err(e)) => {
                debug!(program = %self.program, error = %e, "Transfer binary probe failed");
                false
            }
            Err(_) => {
                debug!(program = %self.program, "Transfer binary probe timed out");
                false
            }
        }
    }

    /// Whether this binary can honour the endpoint's host key settings.
    ///
    /// A bare `SHA256:` fingerprint cannot be written into a known-hosts
    /// file, so such endpoints stay on the SFTP session.
    pub fn supports(&self, endpoint: &RemoteEndpoint) -> bool {
        match endpoint.expected_host_key() {
            Some(expected) => known_hosts_key(expected).is_some(),
            None => true,
        }
    }

    /// Download `remote` from the endpoint into `local`.
    pub async fn download(&self, endpoint: &RemoteEndpoint, remote: &str, local: &Path) -> Result<()> {
        let scratch = tempfile::Builder::new().prefix("anvil-scp-").tempdir()?;

        let key_file = scratch.path().join("id");
        write_private_file(
            &key_file,
            format!("{}\n", endpoint.private_key.trim_end()).as_bytes(),
        )?;

        let known_hosts = match endpoint.expected_host_key() {
            Some(expected) => {
                let key = known_hosts_key(expected).ok_or_else(|| {
                    Error::InvalidArgument("expected host key is not a public key line".into())
                })?;
                let path = scratch.path().join("known_hosts");
                write_private_file(&path, known_hosts_line(endpoint, &key).as_bytes())?;
                Some(path)
            }
            None => None,
        };

        let local = std::path::absolute(local)?;
        let args = transfer_args(endpoint, &key_file, known_hosts.as_deref(), remote, &local)?;

        debug!(program = %self.program, remote, local = %local.display(), "Downloading with transfer binary");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        drop(scratch);

        let output = output.map_err(|e| Error::Transfer {
            exit_code: None,
            message: format!("Failed to spawn {}: {}", self.program, e),
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(program = %self.program, stderr = %stderr.trim(), "Transfer binary failed");
        Err(Error::exit_status(&self.program, output.status.code()))
    }
}

/// Arguments for a batch-mode download.
fn transfer_args(
    endpoint: &RemoteEndpoint,
    key_file: &Path,
    known_hosts: Option<&Path>,
    remote: &str,
    local: &Path,
) -> Result<Vec<OsString>> {
    let strict = if known_hosts.is_some() { "yes" } else { "no" };
    let known_hosts = match known_hosts {
        Some(path) => format!("UserKnownHostsFile={}", path.display()),
        None => "UserKnownHostsFile=/dev/null".to_string(),
    };

    Ok(vec![
        "-B".into(),
        "-i".into(),
        key_file.as_os_str().to_os_string(),
        "-o".into(),
        format!("StrictHostKeyChecking={}", strict).into(),
        "-o".into(),
        known_hosts.into(),
        remote_url(endpoint, remote)?.to_string().into(),
        local.as_os_str().to_os_string(),
    ])
}

/// `scp://user@host:port/path`
fn remote_url(endpoint: &RemoteEndpoint, remote: &str) -> Result<Url> {
    let invalid = |what: &str| Error::InvalidArgument(format!("Invalid {} for scp URL", what));

    let mut url = Url::parse("scp://localhost").map_err(|_| invalid("URL"))?;
    let host = if endpoint.host.contains(':') && !endpoint.host.starts_with('[') {
        format!("[{}]", endpoint.host)
    } else {
        endpoint.host.clone()
    };
    url.set_host(Some(&host)).map_err(|_| invalid("host"))?;
    url.set_port(Some(endpoint.port)).map_err(|_| invalid("port"))?;
    url.set_username(&endpoint.username).map_err(|_| invalid("username"))?;
    url.set_path(remote);
    Ok(url)
}

/// `<type> <base64>` portion of a configured host key, if it has one.
fn known_hosts_key(expected: &str) -> Option<String> {
    let tokens: Vec<&str> = expected.split_whitespace().collect();
    let position = tokens.iter().position(|token| {
        token.starts_with("ssh-") || token.starts_with("ecdsa-") || token.starts_with("sk-")
    })?;
    let key = tokens.get(position + 1)?;
    Some(format!("{} {}", tokens[position], key))
}

/// Known-hosts entry binding `key` to the endpoint. OpenSSH only uses the
/// bracketed form for non-default ports.
fn known_hosts_line(endpoint: &RemoteEndpoint, key: &str) -> String {
    if endpoint.port == 22 {
        format!("{} {}\n", endpoint.host, key)
    } else {
        format!("[{}]:{} {}\n", endpoint.host, endpoint.port, key)
    }
}

fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}
