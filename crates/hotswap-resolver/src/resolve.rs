use std::path::Path;

use hotswap_core::{ReleaseInfo, VersionRelation, VersionToken};

use crate::feed::{synthesize_release, ReleaseFeed};
use crate::marker::{consume_marker, discard_marker, write_marker};
use crate::types::{DownloadTemplate, Resolution};

/// Classifies a known release against the installed version.
pub fn reconcile_release(release: ReleaseInfo, local: &VersionToken) -> Resolution {
    if release.package_asset().is_none() {
        return Resolution::Unresolvable(format!(
            "release {} has no zip package asset",
            release.tag
        ));
    }

    let remote = release.version();
    if remote.is_empty() {
        return Resolution::Unresolvable("release feed reported an empty tag".to_string());
    }

    let relation = local.relation_to(&remote);
    if relation == VersionRelation::Different {
        tracing::warn!(
            local = %local,
            remote = %remote,
            "versions are not numeric; treating inequality as an update"
        );
    }

    if relation.needs_update() {
        Resolution::UpdateAvailable {
            release,
            version: remote,
        }
    } else {
        Resolution::UpToDate {
            local: local.clone(),
            remote,
        }
    }
}

/// Queries the feed and compares the latest release with `local`.
///
/// Never fails: every network or parse problem becomes
/// [`Resolution::Unresolvable`].
pub fn resolve<F>(feed: &F, local: &VersionToken) -> Resolution
where
    F: ReleaseFeed + ?Sized,
{
    match feed.latest_release() {
        Ok(release) => reconcile_release(release, local),
        Err(err) => {
            tracing::warn!("release feed unavailable: {err:#}");
            Resolution::Unresolvable(format!("{err:#}"))
        }
    }
}

/// Resolves using a version marker pre-written by the launching application
/// when present, and the release feed otherwise.
///
/// A pre-written marker is consumed here. When the feed reports an update its
/// version is recorded in the marker for the install stage to consume.
pub fn resolve_with_marker<F>(
    feed: &F,
    local: &VersionToken,
    marker_path: &Path,
    template: &DownloadTemplate,
) -> Resolution
where
    F: ReleaseFeed + ?Sized,
{
    match consume_marker(marker_path) {
        Ok(Some(recorded)) => {
            tracing::info!(version = %recorded, "using pre-recorded version marker");
            return reconcile_release(synthesize_release(template, &recorded), local);
        }
        Ok(None) => {}
        Err(err) => tracing::warn!("ignoring unreadable version marker: {err:#}"),
    }

    match resolve(feed, local) {
        Resolution::UpdateAvailable { release, version } => {
            let version = record_and_consume(marker_path, version);
            Resolution::UpdateAvailable { release, version }
        }
        other => other,
    }
}

/// Round-trips the fetched version through the marker file within this run,
/// so no marker outlives the resolution that wrote it.
fn record_and_consume(marker_path: &Path, version: VersionToken) -> VersionToken {
    if let Err(err) = write_marker(marker_path, &version) {
        tracing::warn!("failed to record version marker: {err:#}");
        return version;
    }
    match consume_marker(marker_path) {
        Ok(Some(recorded)) => recorded,
        Ok(None) => version,
        Err(err) => {
            tracing::warn!("failed to consume version marker: {err:#}");
            if let Err(err) = discard_marker(marker_path) {
                tracing::warn!("stale version marker left behind: {err:#}");
            }
            version
        }
    }
}
