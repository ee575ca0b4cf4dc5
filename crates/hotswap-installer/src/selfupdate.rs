use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hotswap_core::VersionToken;
use hotswap_launcher::{LaunchBackend, LaunchSpec};

use crate::version_probe::VersionProbe;

pub const REPLACEMENT_SCRIPT_NAME: &str = "UpdateReplacer.bat";
pub const DEFAULT_WAIT_ATTEMPTS: u32 = 60;

/// Everything the replacement script needs, fixed at generation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfReplacementPlan {
    /// Path of the running updater, replaced in place.
    pub running_exe: PathBuf,
    pub staged_exe: PathBuf,
    /// Staging directory the script removes once the move is done.
    pub staging_dir: PathBuf,
    /// Arguments the updater is relaunched with.
    pub arguments: Vec<String>,
    pub wait_attempts: u32,
}

/// A replacement handed to the external script. While one is pending the
/// staging directory belongs to the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSelfReplacement {
    pub script_path: PathBuf,
    pub staging_dir: PathBuf,
}

/// Returns the staged updater's version when it should replace the running
/// one.
pub fn needs_self_replacement(
    staged_updater: &Path,
    running_version: &VersionToken,
    probe: &dyn VersionProbe,
) -> Option<VersionToken> {
    if !staged_updater.is_file() {
        return None;
    }
    let Some(staged) = probe.file_version(staged_updater) else {
        tracing::warn!(
            path = %staged_updater.display(),
            "cannot read staged updater version; keeping the running updater"
        );
        return None;
    };

    if running_version.relation_to(&staged).needs_update() {
        Some(staged)
    } else {
        None
    }
}

/// Renders the batch script that swaps the updater executable once the
/// running instance has exited, relaunches it and deletes itself.
pub fn render_replacement_script(plan: &SelfReplacementPlan) -> String {
    let running_text = plan.running_exe.to_string_lossy();
    let (working_dir, image_name) = split_windows_path(&running_text);
    let running = batch_path(&plan.running_exe);
    let staged = batch_path(&plan.staged_exe);
    let staging = batch_path(&plan.staging_dir);
    let working_dir = escape_percent(working_dir);
    let arguments = plan
        .arguments
        .iter()
        .map(|arg| batch_argument(arg))
        .collect::<Vec<_>>()
        .join(" ");
    let launch = if arguments.is_empty() {
        format!("start \"\" /D \"{working_dir}\" \"{running}\"")
    } else {
        format!("start \"\" /D \"{working_dir}\" \"{running}\" {arguments}")
    };
    let image = escape_percent(image_name);

    format!(
        "@echo off\r\n\
setlocal\r\n\
set /a attempts=0\r\n\
:wait\r\n\
tasklist /FI \"IMAGENAME eq {image}\" /NH 2>nul | find /I \"{image}\" >nul\r\n\
if errorlevel 1 goto replace\r\n\
set /a attempts+=1\r\n\
if %attempts% GEQ {limit} goto cleanup\r\n\
ping -n 2 127.0.0.1 >nul\r\n\
goto wait\r\n\
:replace\r\n\
del /F /Q \"{running}\" >nul 2>&1\r\n\
move /Y \"{staged}\" \"{running}\" >nul\r\n\
rmdir /S /Q \"{staging}\" >nul 2>&1\r\n\
{launch}\r\n\
:cleanup\r\n\
endlocal\r\n\
(goto) 2>nul & del \"%~f0\"\r\n",
        limit = plan.wait_attempts,
    )
}

/// Writes the replacement script into `script_dir` and starts it detached.
pub fn schedule_self_replacement(
    plan: &SelfReplacementPlan,
    script_dir: &Path,
    backend: &dyn LaunchBackend,
) -> Result<PendingSelfReplacement> {
    fs::create_dir_all(script_dir)
        .with_context(|| format!("failed to create {}", script_dir.display()))?;
    let script_path = script_dir.join(REPLACEMENT_SCRIPT_NAME);
    fs::write(&script_path, render_replacement_script(plan))
        .with_context(|| format!("failed to write {}", script_path.display()))?;

    let spec = LaunchSpec::new("cmd.exe")
        .with_working_dir(script_dir)
        .with_arguments(["/C".to_string(), script_path.to_string_lossy().into_owned()]);
    backend
        .launch_inherited(&spec)
        .with_context(|| format!("failed to start {}", script_path.display()))?;

    tracing::info!(
        script = %script_path.display(),
        "scheduled updater self-replacement"
    );
    Ok(PendingSelfReplacement {
        script_path,
        staging_dir: plan.staging_dir.clone(),
    })
}

fn batch_path(path: &Path) -> String {
    escape_percent(&path.to_string_lossy())
}

/// Splits on either separator so paths render the same on every host.
fn split_windows_path(path: &str) -> (&str, &str) {
    match path.rfind(['\\', '/']) {
        Some(index) => (&path[..index], &path[index + 1..]),
        None => ("", path),
    }
}

fn escape_percent(text: &str) -> String {
    text.replace('%', "%%")
}

/// Quotes an argument containing whitespace and doubles `%` so the batch
/// interpreter passes it through unchanged.
fn batch_argument(arg: &str) -> String {
    let escaped = escape_percent(arg);
    if escaped.is_empty() || escaped.chars().any(char::is_whitespace) {
        format!("\"{}\"", escaped.replace('"', "\"\""))
    } else {
        escaped
    }
}
