use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use hotswap_core::{
    ExitResult, ProductProfile, ReleaseAsset, ReleaseInfo, UpdateOutcome, VersionToken,
};
use hotswap_installer::{
    extract_archive, needs_self_replacement, reconcile_install, remove_dir_all_if_exists,
    remove_file_if_exists, schedule_self_replacement, spawn_download, AccessProbe, InstallPaths,
    PendingSelfReplacement, SaveError, SelfReplacementPlan, VersionProbe, DEFAULT_WAIT_ATTEMPTS,
};
use hotswap_launcher::{IdentityMode, LaunchBackend, LaunchSpec, Launcher, ProcessControl};
use hotswap_resolver::{resolve_with_marker, DownloadTemplate, ReleaseFeed, Resolution};
use reqwest::blocking::Client;

use crate::prompt::Prompter;
use crate::render::TerminalRenderer;

pub const TARGET_EXIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const HELPER_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Switches taken from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub skip_lang: bool,
    pub autolaunch: bool,
    /// Launch the product as the desktop user even when elevated.
    pub force_user_launch: bool,
    pub launch_exe: Option<String>,
    pub launch_mode: Option<IdentityMode>,
    pub ci: bool,
    /// Arguments the updater was started with, reused for relaunches.
    pub relaunch_args: Vec<String>,
}

pub type AccessCheck = fn(&InstallPaths) -> Result<AccessProbe>;

/// Everything one updater run needs. Collaborators with side effects outside
/// the install tree are injected so runs can be driven without a desktop.
pub struct UpdateContext<'a> {
    pub paths: InstallPaths,
    pub profile: ProductProfile,
    pub template: DownloadTemplate,
    pub options: RunOptions,
    pub running_version: VersionToken,
    pub running_exe: PathBuf,
    /// Where the replacement script is written.
    pub script_dir: PathBuf,
    pub client: Client,
    pub feed: &'a dyn ReleaseFeed,
    pub backend: &'a dyn LaunchBackend,
    pub version_probe: &'a dyn VersionProbe,
    pub processes: &'a dyn ProcessControl,
    pub prompter: &'a dyn Prompter,
    pub access_check: AccessCheck,
    pub renderer: TerminalRenderer,
    pub target_exit_timeout: Duration,
    pub helper_exit_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub result: ExitResult,
    /// Set when the replacement script owns the staging directory.
    pub pending: Option<PendingSelfReplacement>,
}

/// Runs the whole update and reports the single result of the run.
pub fn run_update(ctx: &UpdateContext<'_>) -> RunReport {
    let (outcome, pending) = drive(ctx);
    finish(ctx, &outcome, pending.as_ref());

    let result = ExitResult::from_outcome(&outcome, ctx.options.ci);
    tracing::info!(
        exit_code = result.exit_code,
        message = %result.message,
        "updater run finished"
    );
    RunReport { result, pending }
}

fn drive(ctx: &UpdateContext<'_>) -> (UpdateOutcome, Option<PendingSelfReplacement>) {
    if let Some(outcome) = ensure_write_access(ctx) {
        return (outcome, None);
    }

    if let Err(err) = prepare_workspace(&ctx.paths, &ctx.profile) {
        tracing::error!("cannot prepare download area: {err:#}");
        ctx.renderer
            .print_status("error", "cannot save the download at this time");
        return (UpdateOutcome::CannotSaveDownload, None);
    }

    let main_exe = ctx.paths.main_exe_path(&ctx.profile);
    let local = ctx.version_probe.file_version(&main_exe).unwrap_or_else(|| {
        tracing::warn!(path = %main_exe.display(), "installed version unknown");
        VersionToken::parse("")
    });

    ctx.renderer.print_status("step", "checking for updates");
    let (release, version) =
        match resolve_with_marker(ctx.feed, &local, &ctx.paths.marker_path(), &ctx.template) {
            Resolution::UpToDate { local, .. } => {
                ctx.renderer.print_status(
                    "ok",
                    &format!("{} {} is up to date", ctx.profile.name, local),
                );
                return (UpdateOutcome::UpToDate, None);
            }
            Resolution::Unresolvable(reason) => {
                tracing::error!("cannot determine the latest release: {reason}");
                ctx.renderer
                    .print_status("error", &format!("update check failed: {reason}"));
                return (UpdateOutcome::DownloadFailed, None);
            }
            Resolution::UpdateAvailable { release, version } => (release, version),
        };

    ctx.renderer.print_status(
        "step",
        &format!("downloading {} {}", ctx.profile.name, version),
    );
    let package = match download_package(ctx, &release) {
        Ok(package) => package,
        Err(outcome) => return (outcome, None),
    };

    if let Some(outcome) = wait_for_target(ctx) {
        return (outcome, None);
    }

    ctx.renderer.print_status("step", "installing update");
    let report = reconcile_install(
        &ctx.paths,
        &ctx.profile,
        &package,
        &version,
        ctx.version_probe,
    );
    for warning in &report.warnings {
        ctx.renderer.print_status("warn", warning);
    }
    let outcome = report.outcome.to_update_outcome(&version);
    if !outcome.is_success() {
        ctx.renderer
            .print_status("error", &format!("install failed: {}", outcome.message()));
        return (outcome, None);
    }
    ctx.renderer.print_status(
        "ok",
        &format!("installed {} {}", ctx.profile.name, version),
    );

    if !ctx.options.skip_lang {
        install_language_pack(ctx, &release);
    }

    if let Some(staged) = report.staged_updater.as_deref() {
        if let Some(pending) = schedule_updater_replacement(ctx, staged) {
            return (
                UpdateOutcome::SelfReplacementScheduled(version.to_string()),
                Some(pending),
            );
        }
    }

    (outcome, None)
}

/// Returns the terminal outcome when the install directories are not
/// writable by the current process.
fn ensure_write_access(ctx: &UpdateContext<'_>) -> Option<UpdateOutcome> {
    let dir = match (ctx.access_check)(&ctx.paths) {
        Ok(AccessProbe::Writable) => return None,
        Ok(AccessProbe::ElevationRequired { dir }) => dir,
        Err(err) => {
            tracing::error!("write access check failed: {err:#}");
            return Some(UpdateOutcome::CannotSaveDownload);
        }
    };

    tracing::warn!(dir = %dir.display(), "administrator rights required");
    if ctx.options.ci {
        ctx.renderer.print_status(
            "error",
            &format!("administrator rights are required to update {}", dir.display()),
        );
        return Some(UpdateOutcome::AdminRequired);
    }

    let question = format!(
        "Updating {} requires administrator rights. Restart the updater elevated?",
        dir.display()
    );
    if !ctx.prompter.confirm(&question) {
        return Some(UpdateOutcome::AdminRequired);
    }

    let spec = LaunchSpec::new(&ctx.running_exe)
        .with_identity(IdentityMode::Elevated)
        .with_arguments(ctx.options.relaunch_args.iter().cloned());
    match Launcher::new(ctx.backend).launch(&spec) {
        Ok(()) => Some(UpdateOutcome::ElevatedRestart),
        Err(err) => {
            tracing::warn!("elevated restart failed: {err}");
            ctx.renderer
                .print_status("error", "elevation was declined or failed");
            Some(UpdateOutcome::AdminRequired)
        }
    }
}

/// Clears leftovers of earlier runs and makes sure the download directory
/// exists.
pub fn prepare_workspace(paths: &InstallPaths, profile: &ProductProfile) -> Result<()> {
    remove_stale_packages(paths.target_dir(), profile)?;
    remove_stale_packages(&paths.updates_dir(), profile)?;
    let staging = paths.update_files_dir();
    remove_dir_all_if_exists(&staging)
        .with_context(|| format!("failed to remove {}", staging.display()))?;
    paths.ensure_updates_dir()?;
    Ok(())
}

fn remove_stale_packages(dir: &Path, profile: &ProductProfile) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        let name = entry.file_name();
        let path = entry.path();
        if path.is_file() && profile.is_package_file_name(&name.to_string_lossy()) {
            remove_file_if_exists(&path)
                .with_context(|| format!("failed to delete {}", path.display()))?;
            tracing::info!(path = %path.display(), "removed stale package");
        }
    }
    Ok(())
}

/// Returns the terminal outcome when no package could be saved.
fn download_package(
    ctx: &UpdateContext<'_>,
    release: &ReleaseInfo,
) -> std::result::Result<PathBuf, UpdateOutcome> {
    let asset = release
        .package_asset()
        .ok_or(UpdateOutcome::DownloadFailed)?;
    let dest = ctx.paths.package_download_path(&asset.name);
    loop {
        match download_asset(ctx, asset, &dest, "package") {
            Ok(bytes) => {
                tracing::info!(bytes, path = %dest.display(), "package downloaded");
                return Ok(dest);
            }
            Err(err) if err.downcast_ref::<SaveError>().is_some() => {
                tracing::error!("package could not be saved: {err:#}");
                ctx.renderer
                    .print_status("error", &format!("cannot save the download: {err:#}"));
                return Err(UpdateOutcome::CannotSaveDownload);
            }
            Err(err) => {
                tracing::error!("package download failed: {err:#}");
                ctx.renderer
                    .print_status("error", &format!("download failed: {err:#}"));
                if ctx.options.ci || !ctx.prompter.confirm("Retry the download?") {
                    return Err(UpdateOutcome::DownloadFailed);
                }
            }
        }
    }
}

fn download_asset(
    ctx: &UpdateContext<'_>,
    asset: &ReleaseAsset,
    dest: &Path,
    label: &str,
) -> Result<u64> {
    let task = spawn_download(
        ctx.client.clone(),
        asset.download_url.clone(),
        dest.to_path_buf(),
    );
    let mut progress = ctx.renderer.start_progress(label);
    let result = task.wait(|transferred, total| progress.set(transferred, total));
    match &result {
        Ok(_) => progress.finish_success(),
        Err(_) => progress.finish_abandon(),
    }
    result
}

/// Makes sure the product and its helpers are not running. Returns the
/// terminal outcome when they cannot be stopped.
fn wait_for_target(ctx: &UpdateContext<'_>) -> Option<UpdateOutcome> {
    let image = ctx.profile.main_image_name();
    if ctx.processes.is_running(image) {
        let close = ctx.options.ci
            || ctx.prompter.confirm(&format!(
                "{} is running and must be closed to install the update. Close it now?",
                ctx.profile.name
            ));
        if !close {
            ctx.renderer
                .print_status("error", &format!("{} is still running", ctx.profile.name));
            return Some(UpdateOutcome::TargetBusy);
        }

        ctx.renderer
            .print_status("step", &format!("closing {}", ctx.profile.name));
        ctx.processes.terminate(image);
        if !ctx.processes.wait_for_exit(image, ctx.target_exit_timeout) {
            ctx.renderer
                .print_status("error", &format!("{} did not exit", ctx.profile.name));
            return Some(UpdateOutcome::TargetBusy);
        }
    }

    for helper in &ctx.profile.blocking_processes {
        if ctx.processes.is_running(helper)
            && !ctx.processes.wait_for_exit(helper, ctx.helper_exit_timeout)
        {
            ctx.renderer
                .print_status("error", &format!("{helper} is still running"));
            return Some(UpdateOutcome::TargetBusy);
        }
    }
    None
}

/// Language packs are optional; every failure here is only a warning.
fn install_language_pack(ctx: &UpdateContext<'_>, release: &ReleaseInfo) {
    let Some(asset) = release.language_pack_asset() else {
        tracing::debug!("release has no language pack");
        return;
    };

    let dest = ctx.paths.package_download_path(&asset.name);
    let result = download_asset(ctx, asset, &dest, "language")
        .and_then(|_| extract_archive(&dest, &ctx.paths.lang_dir()));
    match result {
        Ok(count) => tracing::info!(files = count, "language pack installed"),
        Err(err) => {
            tracing::warn!("language pack skipped: {err:#}");
            ctx.renderer
                .print_status("warn", &format!("language pack skipped: {err:#}"));
        }
    }
    if let Err(err) = remove_file_if_exists(&dest) {
        tracing::warn!("failed to delete {}: {err}", dest.display());
    }
}

fn schedule_updater_replacement(
    ctx: &UpdateContext<'_>,
    staged: &Path,
) -> Option<PendingSelfReplacement> {
    let staged_version = needs_self_replacement(staged, &ctx.running_version, ctx.version_probe)?;
    tracing::info!(
        running = %ctx.running_version,
        staged = %staged_version,
        "updater itself has a new version"
    );

    let plan = SelfReplacementPlan {
        running_exe: ctx.running_exe.clone(),
        staged_exe: staged.to_path_buf(),
        staging_dir: ctx.paths.update_files_dir(),
        arguments: ctx.options.relaunch_args.clone(),
        wait_attempts: DEFAULT_WAIT_ATTEMPTS,
    };
    match schedule_self_replacement(&plan, &ctx.script_dir, ctx.backend) {
        Ok(pending) => {
            ctx.renderer.print_status(
                "ok",
                &format!("updater {staged_version} will be installed after exit"),
            );
            Some(pending)
        }
        Err(err) => {
            tracing::warn!("self-replacement not scheduled: {err:#}");
            ctx.renderer
                .print_status("warn", "the updater itself could not be replaced");
            None
        }
    }
}

/// Exit cleanup that runs for every outcome.
fn finish(
    ctx: &UpdateContext<'_>,
    outcome: &UpdateOutcome,
    pending: Option<&PendingSelfReplacement>,
) {
    if pending.is_none() {
        let staging = ctx.paths.update_files_dir();
        if let Err(err) = remove_dir_all_if_exists(&staging) {
            tracing::warn!("failed to remove {}: {err}", staging.display());
        }
    }

    let ready = matches!(outcome, UpdateOutcome::UpToDate | UpdateOutcome::Updated(_));
    if ctx.options.autolaunch && ready {
        launch_target(ctx);
    }
}

pub fn launch_identity(options: &RunOptions) -> IdentityMode {
    match options.launch_mode {
        Some(mode) => mode,
        None if options.force_user_launch => IdentityMode::InteractiveUser,
        None => IdentityMode::Inherited,
    }
}

/// Executable started by `--autolaunch`: the `--launch-exe` override when it
/// exists in the target directory, the product's main executable otherwise.
pub fn launch_target_path(
    paths: &InstallPaths,
    profile: &ProductProfile,
    launch_exe: Option<&str>,
) -> PathBuf {
    if let Some(name) = launch_exe {
        let candidate = paths.target_dir().join(name);
        if candidate.is_file() {
            return candidate;
        }
        tracing::warn!(path = %candidate.display(), "launch override not found");
    }
    paths.main_exe_path(profile)
}

fn launch_target(ctx: &UpdateContext<'_>) {
    let path = launch_target_path(&ctx.paths, &ctx.profile, ctx.options.launch_exe.as_deref());
    let spec = LaunchSpec::new(&path)
        .with_working_dir(ctx.paths.target_dir())
        .with_identity(launch_identity(&ctx.options));
    if let Err(err) = Launcher::new(ctx.backend).launch(&spec) {
        tracing::error!("failed to launch {}: {err}", path.display());
        ctx.renderer
            .print_status("warn", &format!("could not start {}", ctx.profile.name));
    }
}
