mod extract;
mod fetch;
mod fs_utils;
mod layout;
mod probe;
mod reconcile;
mod selfupdate;
mod version_probe;

pub use extract::{extract_archive, extract_package, inspect_package, PackageLayout};
pub use fetch::{
    build_download_client, download_to_path, spawn_download, DownloadEvent, DownloadTask,
    SaveError, DOWNLOAD_CHUNK_SIZE,
};
pub use fs_utils::{remove_dir_all_if_exists, remove_file_if_exists};
pub use layout::InstallPaths;
pub use probe::{probe_write_access, AccessProbe};
pub use reconcile::{
    apply_custom_exe_alias, reconcile_install, verify_install, InstallOutcome, ReconcileReport,
};
pub use selfupdate::{
    needs_self_replacement, render_replacement_script, schedule_self_replacement,
    PendingSelfReplacement, SelfReplacementPlan, DEFAULT_WAIT_ATTEMPTS, REPLACEMENT_SCRIPT_NAME,
};
#[cfg(windows)]
pub use version_probe::FileVersionInfoProbe;
pub use version_probe::{host_version_probe, SidecarVersionProbe, VersionProbe};
