use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use hotswap_core::{ProductProfile, UpdateOutcome, VersionToken};

use crate::extract::{extract_package, inspect_package};
use crate::fs_utils::{
    collect_relative_dirs, collect_relative_files, collect_relative_files_with_extension,
    has_extension, move_file_or_copy, remove_dir_all_if_exists, remove_file_if_exists,
};
use crate::layout::InstallPaths;
use crate::version_probe::VersionProbe;

const LIBRARY_EXTENSION: &str = "dll";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Updated,
    /// The main executable is in place but reports another version.
    ReplacedButVersionMismatch { installed: Option<VersionToken> },
    /// The main executable is missing after installation.
    ExtractionFailed,
    /// The package failed inspection; nothing was touched.
    PackageRejected(String),
}

impl InstallOutcome {
    pub fn to_update_outcome(&self, expected: &VersionToken) -> UpdateOutcome {
        match self {
            Self::Updated => UpdateOutcome::Updated(expected.to_string()),
            Self::ReplacedButVersionMismatch { .. } => UpdateOutcome::ReplaceFailed,
            Self::ExtractionFailed | Self::PackageRejected(_) => UpdateOutcome::UnpackFailed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub outcome: InstallOutcome,
    /// Best-effort steps that failed without aborting the install.
    pub warnings: Vec<String>,
    pub installed_files: Vec<PathBuf>,
    pub removed_libraries: Vec<PathBuf>,
    /// Updater executable left in the staging dir for self-replacement.
    pub staged_updater: Option<PathBuf>,
    pub custom_alias: Option<PathBuf>,
}

impl ReconcileReport {
    fn new(outcome: InstallOutcome) -> Self {
        Self {
            outcome,
            warnings: Vec::new(),
            installed_files: Vec::new(),
            removed_libraries: Vec::new(),
            staged_updater: None,
            custom_alias: None,
        }
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }
}

/// Merges the package at `package_path` into the target directory.
///
/// Individual file operations are best-effort and recorded as warnings; only
/// the final verification of the main executable decides the outcome.
pub fn reconcile_install(
    paths: &InstallPaths,
    profile: &ProductProfile,
    package_path: &Path,
    expected: &VersionToken,
    probe: &dyn VersionProbe,
) -> ReconcileReport {
    if let Err(err) = inspect_package(package_path, profile) {
        tracing::error!("refusing to install package: {err:#}");
        return ReconcileReport::new(InstallOutcome::PackageRejected(format!("{err:#}")));
    }

    let mut report = ReconcileReport::new(InstallOutcome::ExtractionFailed);
    let target = paths.target_dir();
    let staging = paths.update_files_dir();

    let scratch = InstallPaths::scratch_dir_names();
    let old_libraries =
        match collect_relative_files_with_extension(target, LIBRARY_EXTENSION, &scratch) {
            Ok(found) => found,
            Err(err) => {
                report.warn(format!("failed to enumerate installed libraries: {err:#}"));
                Vec::new()
            }
        };

    if let Err(err) = set_libs_aside(paths) {
        report.warn(format!("{err:#}"));
    }

    for name in &profile.known_files {
        let path = target.join(name);
        if let Err(err) = remove_file_if_exists(&path) {
            report.warn(format!("failed to delete {}: {err}", path.display()));
        }
    }

    if let Err(err) = remove_dir_all_if_exists(&staging) {
        report.warn(format!("failed to remove stale {}: {err}", staging.display()));
    }
    remove_obsolete_files(target, profile, &mut report);

    let mut new_libraries = BTreeSet::new();
    match stage_package(package_path, &staging, profile, paths) {
        Ok(staged) => {
            for rel in staged {
                if has_extension(&rel, LIBRARY_EXTENSION) {
                    new_libraries.insert(library_key(&rel));
                }
                if is_updater_file(&rel, profile) {
                    if rel.to_string_lossy().eq_ignore_ascii_case(&profile.updater_exe) {
                        report.staged_updater = Some(staging.join(&rel));
                    }
                    continue;
                }

                let src = staging.join(&rel);
                let dst = target.join(&rel);
                if let Err(err) = remove_file_if_exists(&dst) {
                    report.warn(format!("failed to delete {}: {err}", dst.display()));
                }
                match move_file_or_copy(&src, &dst) {
                    Ok(()) => report.installed_files.push(rel),
                    Err(err) => report.warn(format!("{err:#}")),
                }
            }
        }
        Err(err) => report.warn(format!("failed to unpack package: {err:#}")),
    }

    if let Err(err) = remove_dir_all_if_exists(&paths.oldlibs_dir()) {
        report.warn(format!(
            "failed to remove {}: {err}",
            paths.oldlibs_dir().display()
        ));
    }

    for rel in old_libraries {
        if new_libraries.contains(&library_key(&rel)) {
            continue;
        }
        let path = target.join(&rel);
        if !path.exists() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(library = %rel.display(), "removed orphaned library");
                report.removed_libraries.push(rel);
            }
            Err(err) => report.warn(format!("failed to delete {}: {err}", path.display())),
        }
    }

    report.outcome = verify_install(&paths.main_exe_path(profile), expected, probe);
    if report.outcome == InstallOutcome::Updated {
        match apply_custom_exe_alias(paths, profile) {
            Ok(alias) => report.custom_alias = alias,
            Err(err) => report.warn(format!("{err:#}")),
        }
    }
    report
}

/// Classifies the installed main executable against the expected version.
pub fn verify_install(
    main_exe: &Path,
    expected: &VersionToken,
    probe: &dyn VersionProbe,
) -> InstallOutcome {
    if !main_exe.is_file() {
        tracing::error!(path = %main_exe.display(), "main executable missing after install");
        return InstallOutcome::ExtractionFailed;
    }
    match probe.file_version(main_exe) {
        Some(installed) if installed.matches(expected) => InstallOutcome::Updated,
        installed => {
            tracing::error!(
                expected = %expected,
                installed = installed.as_ref().map(|v| v.as_str()).unwrap_or("unknown"),
                "installed version does not match"
            );
            InstallOutcome::ReplacedButVersionMismatch { installed }
        }
    }
}

/// Copies the main executable and its runtime config files to the name in
/// `custom_exe_name.txt`, when that file holds a usable name.
pub fn apply_custom_exe_alias(
    paths: &InstallPaths,
    profile: &ProductProfile,
) -> Result<Option<PathBuf>> {
    let config = paths.custom_exe_config_path();
    let raw = match fs::read_to_string(&config) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", config.display()))
        }
    };

    let alias = raw.trim();
    if !is_valid_file_name(alias) {
        return Err(anyhow!("ignoring invalid custom executable name '{alias}'"));
    }

    let target = paths.target_dir();
    let main_stem = Path::new(&profile.main_exe)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| profile.name.clone());

    let alias_exe = target.join(format!("{alias}.exe"));
    fs::copy(paths.main_exe_path(profile), &alias_exe)
        .with_context(|| format!("failed to create {}", alias_exe.display()))?;

    for suffix in ["runtimeconfig.json", "deps.json"] {
        let src = target.join(format!("{main_stem}.{suffix}"));
        if !src.is_file() {
            continue;
        }
        let dst = target.join(format!("{alias}.{suffix}"));
        fs::copy(&src, &dst).with_context(|| format!("failed to create {}", dst.display()))?;
    }

    tracing::info!(alias = %alias_exe.display(), "created custom executable alias");
    Ok(Some(alias_exe))
}

fn set_libs_aside(paths: &InstallPaths) -> Result<()> {
    let libs = paths.libs_dir();
    if !libs.is_dir() {
        return Ok(());
    }
    let oldlibs = paths.oldlibs_dir();
    remove_dir_all_if_exists(&oldlibs)
        .with_context(|| format!("failed to remove stale {}", oldlibs.display()))?;
    fs::rename(&libs, &oldlibs).with_context(|| {
        format!(
            "failed to move {} aside to {}",
            libs.display(),
            oldlibs.display()
        )
    })
}

fn remove_obsolete_files(target: &Path, profile: &ProductProfile, report: &mut ReconcileReport) {
    let entries = match fs::read_dir(target) {
        Ok(entries) => entries,
        Err(err) => {
            report.warn(format!("failed to list {}: {err}", target.display()));
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let obsolete = profile
            .obsolete_extensions
            .iter()
            .any(|ext| has_extension(&path, ext));
        if obsolete {
            if let Err(err) = fs::remove_file(&path) {
                report.warn(format!("failed to delete {}: {err}", path.display()));
            }
        }
    }
}

/// Extracts into the staging dir and mirrors its directory tree under the
/// target. Returns the staged files relative to the staging dir.
fn stage_package(
    package_path: &Path,
    staging: &Path,
    profile: &ProductProfile,
    paths: &InstallPaths,
) -> Result<Vec<PathBuf>> {
    extract_package(package_path, staging, profile)?;

    for rel in collect_relative_dirs(staging)? {
        let dir = paths.target_dir().join(&rel);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    collect_relative_files(staging)
}

fn is_updater_file(rel: &Path, profile: &ProductProfile) -> bool {
    rel.file_stem()
        .map(|stem| stem.to_string_lossy().eq_ignore_ascii_case(profile.updater_stem()))
        .unwrap_or(false)
}

fn library_key(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/").to_ascii_lowercase()
}

fn is_valid_file_name(name: &str) -> bool {
    const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.chars().any(|c| c.is_control() || INVALID.contains(&c))
}
