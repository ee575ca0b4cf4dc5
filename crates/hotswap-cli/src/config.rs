use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use hotswap_core::{host_arch, ProductProfile};
use hotswap_resolver::{release_api_url, DownloadTemplate};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "hotswap.toml";
pub const DEFAULT_REPO_URL: &str = "https://github.com/Ryochan7/DS4Windows";

/// Release source and product description, read from `hotswap.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Repository page releases are published under.
    pub repo_url: String,
    /// Explicit latest-release endpoint. Derived from `repo_url` when unset.
    pub api_url: Option<String>,
    pub download_url_template: Option<String>,
    pub user_agent: String,
    pub arch: String,
    pub product: ProductProfile,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            repo_url: DEFAULT_REPO_URL.to_string(),
            api_url: None,
            download_url_template: None,
            user_agent: format!("hotswap/{}", env!("CARGO_PKG_VERSION")),
            arch: host_arch().to_string(),
            product: ProductProfile::default(),
        }
    }
}

impl UpdaterConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse updater config")
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .with_context(|| format!("invalid config {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(err) => {
                Err(err).with_context(|| format!("failed to read config {}", path.display()))
            }
        }
    }

    /// Points the updater at another repository. The feed endpoint is then
    /// derived from it again.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.repo_url = base_url.trim().trim_end_matches('/').to_string();
        self.api_url = None;
        self
    }

    pub fn feed_endpoint(&self) -> Result<String> {
        if let Some(api_url) = self.api_url.as_deref().filter(|url| !url.trim().is_empty()) {
            return Ok(api_url.trim().to_string());
        }
        release_api_url(&self.repo_url).ok_or_else(|| {
            anyhow!(
                "cannot derive a release endpoint from '{}'; set api_url",
                self.repo_url
            )
        })
    }

    pub fn download_template(&self) -> DownloadTemplate {
        DownloadTemplate {
            repo_url: self.repo_url.trim_end_matches('/').to_string(),
            product_name: self.product.name.clone(),
            arch: self.arch.clone(),
            url_template: self
                .download_url_template
                .clone()
                .filter(|template| !template.trim().is_empty()),
        }
    }
}
