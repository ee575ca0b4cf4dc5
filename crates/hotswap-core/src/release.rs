use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::archive::ArchiveType;
use crate::version::VersionToken;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// Latest published release as reported by the release feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseInfo {
    #[serde(rename = "tag_name")]
    pub tag: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseInfo {
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).context("failed to parse release feed JSON")
    }

    pub fn version(&self) -> VersionToken {
        VersionToken::parse(&self.tag)
    }

    /// First asset with a supported archive extension.
    pub fn package_asset(&self) -> Option<&ReleaseAsset> {
        self.assets
            .iter()
            .find(|asset| ArchiveType::infer_from_name(&asset.name).is_some())
    }

    /// First archive asset, other than the package, that carries a language pack.
    pub fn language_pack_asset(&self) -> Option<&ReleaseAsset> {
        let package = self.package_asset()?;
        self.assets.iter().find(|asset| {
            asset.name != package.name
                && ArchiveType::infer_from_name(&asset.name).is_some()
                && asset.name.to_ascii_lowercase().contains("lang")
        })
    }
}
