use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use hotswap_core::{ReleaseAsset, ReleaseInfo, VersionToken};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;

use crate::types::DownloadTemplate;

const FEED_TIMEOUT: Duration = Duration::from_secs(30);

pub trait ReleaseFeed {
    fn latest_release(&self) -> Result<ReleaseInfo>;
}

#[derive(Debug, Clone)]
pub struct HttpReleaseFeed {
    client: Client,
    endpoint: String,
}

impl HttpReleaseFeed {
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(FEED_TIMEOUT)
            .build()
            .context("failed to build HTTP client for release feed")?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ReleaseFeed for HttpReleaseFeed {
    fn latest_release(&self) -> Result<ReleaseInfo> {
        tracing::debug!(endpoint = %self.endpoint, "querying release feed");
        let response = self
            .client
            .get(&self.endpoint)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .with_context(|| format!("release feed request failed: {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "release feed returned status {status}: {}",
                self.endpoint
            ));
        }

        let body = response
            .text()
            .with_context(|| format!("failed reading release feed body: {}", self.endpoint))?;
        ReleaseInfo::from_json_str(&body)
    }
}

/// Derives the latest-release API endpoint from a repository page URL such as
/// `https://github.com/owner/repo`.
pub fn release_api_url(repo_url: &str) -> Option<String> {
    let trimmed = repo_url.trim().trim_end_matches('/');
    let lower = trimmed.to_ascii_lowercase();
    let marker = "github.com/";
    let start = lower.find(marker)? + marker.len();

    let mut segments = trimmed[start..].split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if repo.is_empty() {
        return None;
    }

    Some(format!(
        "https://api.github.com/repos/{owner}/{repo}/releases/latest"
    ))
}

/// Builds the release a pre-recorded version refers to, using the
/// conventional download location of its package.
pub fn synthesize_release(template: &DownloadTemplate, version: &VersionToken) -> ReleaseInfo {
    let file_name = format!(
        "{}_{}_{}.zip",
        template.product_name,
        version.as_str(),
        template.arch
    );
    let repo = template.repo_url.trim_end_matches('/');
    let download_url = match &template.url_template {
        Some(url_template) => url_template
            .replace("{repo}", repo)
            .replace("{version}", version.as_str())
            .replace("{product}", &template.product_name)
            .replace("{arch}", &template.arch)
            .replace("{file}", &file_name),
        None => format!(
            "{repo}/releases/download/v{}/{file_name}",
            version.as_str()
        ),
    };

    ReleaseInfo {
        tag: format!("v{}", version.as_str()),
        assets: vec![ReleaseAsset {
            name: file_name,
            download_url,
        }],
    }
}
