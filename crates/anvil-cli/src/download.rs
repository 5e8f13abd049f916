//! Build tool providers and HTTP downloads.

use anvil_core::{Error, Result};
use reqwest::{redirect, Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Redirects followed before a download gives up.
const MAX_REDIRECTS: usize = 12;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A source for the build tool jar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildToolProvider {
    pub name: &'static str,
    pub url: &'static str,
}

pub const PROVIDERS: &[BuildToolProvider] = &[BuildToolProvider {
    name: "spigotmc",
    url: "https://hub.spigotmc.org/jenkins/job/BuildTools/lastSuccessfulBuild/artifact/target/BuildTools.jar",
}];

/// Look up a provider by name, ignoring case.
pub fn provider(name: &str) -> Result<&'static BuildToolProvider> {
    let name = name.trim().to_lowercase();
    PROVIDERS.iter().find(|p| p.name == name).ok_or_else(|| {
        let known: Vec<&str> = PROVIDERS.iter().map(|p| p.name).collect();
        Error::InvalidArgument(format!(
            "'{}' is not a valid build tool provider ({})",
            name,
            known.join(", ")
        ))
    })
}

/// HTTP client shared by the registry and downloads.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("anvil/", env!("CARGO_PKG_VERSION")))
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Network(e.to_string()))
}

/// Stream `url` into `dest`. A partially written file is removed on failure.
pub async fn download_file(client: &Client, url: &str, dest: &Path) -> Result<u64> {
    debug!(url, dest = %dest.display(), "Downloading");

    let written = fetch_into(client, url, dest).await;
    if written.is_err() {
        match tokio::fs::remove_file(dest).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                warn!(path = %dest.display(), error = %e, "Failed to remove partial download");
            }
            _ => {}
        }
    }
    written
}

async fn fetch_into(client: &Client, url: &str, dest: &Path) -> Result<u64> {
    let mut res = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    if res.status() != StatusCode::OK {
        return Err(Error::Network(format!("Server responded with {}", res.status())));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    while let Some(chunk) = res.chunk().await.map_err(|e| Error::Network(e.to_string()))? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_provider_lookup() {
        assert_eq!(provider("SpigotMC").unwrap().name, "spigotmc");
        let err = provider("paper").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument: 'paper' is not a valid build tool provider (spigotmc)"
        );
    }

    #[tokio::test]
    async fn test_download_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("{}/BuildTools.jar", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/BuildTools.jar"))
            .and(header_regex("user-agent", "^anvil/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04jar".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("BuildTools.jar");
        let bytes = download_file(&http_client().unwrap(), &format!("{}/old", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"PK\x03\x04jar");
    }

    #[tokio::test]
    async fn test_non_ok_status_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("BuildTools.jar");
        let err = download_file(&http_client().unwrap(), &server.uri(), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Network(m) if m.contains("503")));
        assert!(!dest.exists());
    }
}
