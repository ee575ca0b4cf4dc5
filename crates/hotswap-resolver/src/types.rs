use hotswap_core::{ReleaseInfo, VersionToken};

/// What the release feed says about the installed product.
#[derive(Debug, Clone)]
pub enum Resolution {
    UpToDate {
        local: VersionToken,
        remote: VersionToken,
    },
    UpdateAvailable {
        release: ReleaseInfo,
        version: VersionToken,
    },
    Unresolvable(String),
}

impl Resolution {
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate { .. })
    }
}

/// Where a synthesized release downloads its package from when the version
/// is known up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTemplate {
    pub repo_url: String,
    pub product_name: String,
    pub arch: String,
    /// Overrides the conventional URL. Recognizes `{repo}`, `{version}`,
    /// `{product}`, `{arch}` and `{file}` placeholders.
    pub url_template: Option<String>,
}
