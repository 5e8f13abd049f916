//! Version registry clients.

use crate::pom;
use anvil_core::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_VERSIONS_BASE: &str = "https://hub.spigotmc.org/versions/";
pub const DEFAULT_BUKKIT_POM: &str =
    "https://hub.spigotmc.org/stash/projects/SPIGOT/repos/bukkit/raw/pom.xml";

/// Upper bound for a single registry request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves a requested version token to its canonical artifact version.
#[async_trait]
pub trait VersionRegistry: Send + Sync {
    /// `Ok(None)` when the registry knows the token but publishes no version.
    async fn resolve(&self, token: &str) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct VersionDescriptor {
    #[serde(default)]
    refs: DescriptorRefs,
}

#[derive(Debug, Default, Deserialize)]
struct DescriptorRefs {
    #[serde(rename = "Bukkit")]
    bukkit: Option<String>,
}

/// SpigotMC hub: `versions/<token>.json` names a Bukkit commit whose
/// `pom.xml` carries the artifact version.
pub struct SpigotHubRegistry {
    client: Client,
    versions_base: Url,
    bukkit_pom: Url,
    timeout: Duration,
}

impl SpigotHubRegistry {
    pub fn new(client: Client) -> Result<Self> {
        Self::with_urls(client, DEFAULT_VERSIONS_BASE, DEFAULT_BUKKIT_POM)
    }

    pub fn with_urls(client: Client, versions_base: &str, bukkit_pom: &str) -> Result<Self> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| Error::Config(format!("Invalid registry URL {}: {}", raw, e)))
        };

        let mut versions_base = parse(versions_base)?;
        if !versions_base.path().ends_with('/') {
            let path = format!("{}/", versions_base.path());
            versions_base.set_path(&path);
        }

        Ok(Self {
            client,
            versions_base,
            bukkit_pom: parse(bukkit_pom)?,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn descriptor_url(&self, token: &str) -> Result<Url> {
        anvil_core::validate_version(token)?;
        self.versions_base
            .join(&format!("{}.json", token))
            .map_err(|e| Error::Registry(format!("Invalid descriptor URL for {}: {}", token, e)))
    }

    fn pom_url(&self, reference: &str) -> Url {
        let mut url = self.bukkit_pom.clone();
        url.query_pairs_mut().append_pair("at", reference);
        url
    }

    async fn fetch(&self, url: Url) -> Result<String> {
        debug!(url = %url, "Querying version registry");

        let res = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        match res.status() {
            StatusCode::OK => res.text().await.map_err(|e| Error::Network(e.to_string())),
            status => Err(Error::Registry(format!("{} responded with {}", url, status))),
        }
    }
}

#[async_trait]
impl VersionRegistry for SpigotHubRegistry {
    async fn resolve(&self, token: &str) -> Result<Option<String>> {
        let body = self.fetch(self.descriptor_url(token)?).await?;
        let descriptor: VersionDescriptor = serde_json::from_str(&body)?;

        let Some(reference) = descriptor.refs.bukkit.filter(|r| !r.trim().is_empty()) else {
            debug!(token, "Version descriptor has no Bukkit ref");
            return Ok(None);
        };

        let pom = self.fetch(self.pom_url(&reference)).await?;
        pom::project_version(&pom)
    }
}
