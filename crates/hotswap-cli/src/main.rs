mod config;
mod flow;
mod logging;
mod prompt;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use hotswap_core::{ExitResult, UpdateOutcome, VersionToken};
use hotswap_installer::{
    build_download_client, host_version_probe, probe_write_access, InstallPaths,
};
use hotswap_launcher::{host_backend, IdentityMode, SystemProcesses};
use hotswap_resolver::HttpReleaseFeed;

use crate::config::{UpdaterConfig, CONFIG_FILE_NAME};
use crate::flow::{
    run_update, RunOptions, UpdateContext, HELPER_EXIT_TIMEOUT, TARGET_EXIT_TIMEOUT,
};
use crate::logging::init_logging;
use crate::prompt::{HeadlessPrompter, Prompter, TerminalPrompter};
use crate::render::{current_output_style, TerminalRenderer};

#[derive(Parser, Debug)]
#[command(name = "hotswap")]
#[command(about = "Updates an installed desktop application in place", long_about = None)]
#[command(version)]
struct Cli {
    /// Do not download the language pack.
    #[arg(long)]
    skip_lang: bool,
    /// Start the application once the run succeeds.
    #[arg(long)]
    autolaunch: bool,
    /// Launch the application as the desktop user, never elevated.
    #[arg(long)]
    user: bool,
    /// Executable in the target directory to start instead of the main one.
    #[arg(long, value_name = "NAME")]
    launch_exe: Option<String>,
    /// Directory the application is installed in.
    #[arg(long, value_name = "PATH")]
    target_dir: Option<PathBuf>,
    /// Directory the updater lives in.
    #[arg(long, value_name = "PATH")]
    updater_dir: Option<PathBuf>,
    /// Identity for the launched application: admin or user.
    #[arg(long, value_name = "MODE")]
    launch_mode: Option<IdentityMode>,
    /// Headless run: no prompts, result line on stdout.
    #[arg(long)]
    ci: bool,
    /// Repository URL releases are published under.
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
    /// Config file to use instead of hotswap.toml next to the updater.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    let guard = init_logging(&std::env::temp_dir());
    tracing::info!(args = ?std::env::args().collect::<Vec<_>>(), "updater starting");

    let ci = cli.ci;
    let result = match run_cli(cli) {
        Ok(result) => result,
        Err(err) => {
            tracing::error!("updater failed to start: {err:#}");
            eprintln!("error: {err:#}");
            ExitResult::from_outcome(&UpdateOutcome::DownloadFailed, ci)
        }
    };

    if result.ci_mode {
        println!("{}", result.to_json_line());
    }
    // process::exit skips destructors; flush the log writer first.
    drop(guard);
    std::process::exit(result.exit_code);
}

fn run_cli(cli: Cli) -> Result<ExitResult> {
    let running_exe = std::env::current_exe().context("failed to locate the running updater")?;
    let exe_dir = running_exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| exe_dir.join(CONFIG_FILE_NAME));
    let mut config = UpdaterConfig::load(&config_path)?;
    if let Some(base_url) = cli.base_url.as_deref() {
        config = config.with_base_url(base_url);
    }

    let updater_dir = absolute(cli.updater_dir.clone().unwrap_or_else(|| exe_dir.clone()))?;
    let target_dir = absolute(cli.target_dir.clone().unwrap_or_else(|| updater_dir.clone()))?;
    let paths = InstallPaths::new(updater_dir, target_dir);
    tracing::info!(
        updater_dir = %paths.updater_dir().display(),
        target_dir = %paths.target_dir().display(),
        "resolved install paths"
    );

    let feed = HttpReleaseFeed::new(config.feed_endpoint()?, &config.user_agent)?;
    let client = build_download_client(&config.user_agent)?;
    let backend = host_backend(&config.product.reference_process);
    let version_probe = host_version_probe();
    let processes = SystemProcesses;
    let prompter: Box<dyn Prompter> = if cli.ci {
        Box::new(HeadlessPrompter)
    } else {
        Box::new(TerminalPrompter)
    };

    let ctx = UpdateContext {
        template: config.download_template(),
        profile: config.product.clone(),
        options: RunOptions {
            skip_lang: cli.skip_lang,
            autolaunch: cli.autolaunch,
            force_user_launch: cli.user,
            launch_exe: cli.launch_exe.clone(),
            launch_mode: cli.launch_mode,
            ci: cli.ci,
            relaunch_args: std::env::args().skip(1).collect(),
        },
        running_version: VersionToken::parse(env!("CARGO_PKG_VERSION")),
        running_exe,
        script_dir: std::env::temp_dir(),
        client,
        feed: &feed,
        backend: backend.as_ref(),
        version_probe: version_probe.as_ref(),
        processes: &processes,
        prompter: prompter.as_ref(),
        access_check: probe_write_access,
        renderer: TerminalRenderer::from_style(current_output_style(cli.ci)),
        target_exit_timeout: TARGET_EXIT_TIMEOUT,
        helper_exit_timeout: HELPER_EXIT_TIMEOUT,
        paths,
    };

    let report = run_update(&ctx);
    if let Some(pending) = &report.pending {
        tracing::info!(
            script = %pending.script_path.display(),
            staging = %pending.staging_dir.display(),
            "exiting so the replacement script can finish"
        );
    }
    Ok(report.result)
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    std::path::absolute(&path).with_context(|| format!("invalid path {}", path.display()))
}

#[cfg(test)]
mod tests;
