mod feed;
mod marker;
mod resolve;
mod types;

pub use feed::{release_api_url, synthesize_release, HttpReleaseFeed, ReleaseFeed};
pub use marker::{consume_marker, discard_marker, write_marker};
pub use resolve::{reconcile_release, resolve, resolve_with_marker};
pub use types::{DownloadTemplate, Resolution};
