use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use hotswap_core::{ProductProfile, ReleaseInfo, VersionToken};
use hotswap_installer::{
    build_download_client, AccessProbe, InstallPaths, SidecarVersionProbe, VersionProbe,
    REPLACEMENT_SCRIPT_NAME,
};
use hotswap_launcher::{IdentityMode, LaunchBackend, LaunchSpec, ProcessControl};
use hotswap_resolver::{HttpReleaseFeed, ReleaseFeed};
use mockito::{Matcher, Server, ServerGuard};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::*;
use crate::config::{UpdaterConfig, DEFAULT_REPO_URL};
use crate::flow::{launch_identity, launch_target_path, prepare_workspace, RunReport};
use crate::prompt::parse_answer;
use crate::render::{render_progress_line, render_status_line, resolve_output_style, OutputStyle};

const LATEST_PATH: &str = "/repos/owner/product/releases/latest";
const PACKAGE_NAME: &str = "DS4Windows_2.1.0_x64.zip";
const PACKAGE_PATH: &str = "/download/DS4Windows_2.1.0_x64.zip";

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("must start entry");
        writer.write_all(data).expect("must write entry");
    }
    writer.finish().expect("must finish zip").into_inner()
}

fn touch(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("must create parent");
    }
    fs::write(path, contents).expect("must write file");
}

fn release_package(version: &str, extra: &[(&str, &[u8])]) -> Vec<u8> {
    let mut entries: Vec<(&str, &[u8])> = vec![
        ("DS4Windows/DS4Windows.exe", b"new exe"),
        ("DS4Windows/DS4Windows.exe.version", version.as_bytes()),
        ("DS4Windows/DS4Control.dll", b"control"),
    ];
    entries.extend_from_slice(extra);
    zip_bytes(&entries)
}

fn feed_body(server: &ServerGuard, tag: &str, assets: &[&str]) -> String {
    let assets: Vec<String> = assets
        .iter()
        .map(|name| {
            format!(
                r#"{{"name":"{name}","browser_download_url":"{}/download/{name}"}}"#,
                server.url()
            )
        })
        .collect();
    format!(r#"{{"tag_name":"{tag}","assets":[{}]}}"#, assets.join(","))
}

#[derive(Default)]
struct RecordingBackend {
    launches: RefCell<Vec<(IdentityMode, PathBuf, Vec<String>)>>,
    decline_elevation: bool,
}

impl RecordingBackend {
    fn record(&self, mode: IdentityMode, spec: &LaunchSpec) {
        self.launches.borrow_mut().push((
            mode,
            spec.executable_path.clone(),
            spec.arguments.clone(),
        ));
    }

    fn launches(&self) -> Vec<(IdentityMode, PathBuf, Vec<String>)> {
        self.launches.borrow().clone()
    }
}

impl LaunchBackend for RecordingBackend {
    fn launch_as_current_user(&self, spec: &LaunchSpec) -> hotswap_launcher::Result<()> {
        self.record(IdentityMode::InteractiveUser, spec);
        Ok(())
    }

    fn launch_elevated(&self, spec: &LaunchSpec) -> hotswap_launcher::Result<()> {
        if self.decline_elevation {
            return Err(hotswap_launcher::LaunchError::ElevationDeclined {
                path: spec.executable_path.clone(),
            });
        }
        self.record(IdentityMode::Elevated, spec);
        Ok(())
    }

    fn launch_inherited(&self, spec: &LaunchSpec) -> hotswap_launcher::Result<()> {
        self.record(IdentityMode::Inherited, spec);
        Ok(())
    }

    fn open_with_shell(&self, spec: &LaunchSpec) -> hotswap_launcher::Result<()> {
        self.record(IdentityMode::InteractiveUser, spec);
        Ok(())
    }
}

#[derive(Default)]
struct FakeProcesses {
    running: RefCell<BTreeSet<String>>,
    /// Processes that ignore termination.
    stubborn: bool,
    terminated: RefCell<Vec<String>>,
}

impl FakeProcesses {
    fn running(images: &[&str]) -> Self {
        Self {
            running: RefCell::new(images.iter().map(|image| image.to_string()).collect()),
            ..Self::default()
        }
    }
}

impl ProcessControl for FakeProcesses {
    fn is_running(&self, image_name: &str) -> bool {
        self.running.borrow().contains(image_name)
    }

    fn terminate(&self, image_name: &str) -> usize {
        self.terminated.borrow_mut().push(image_name.to_string());
        if self.stubborn {
            return 0;
        }
        usize::from(self.running.borrow_mut().remove(image_name))
    }
}

#[derive(Default)]
struct ScriptedPrompter {
    answers: RefCell<VecDeque<bool>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    fn answering(answers: &[bool]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().copied().collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str) -> bool {
        self.asked.borrow_mut().push(question.to_string());
        self.answers.borrow_mut().pop_front().unwrap_or(false)
    }
}

struct CountingFeed {
    release: Option<ReleaseInfo>,
    calls: Cell<usize>,
}

impl CountingFeed {
    fn offline() -> Self {
        Self {
            release: None,
            calls: Cell::new(0),
        }
    }
}

impl ReleaseFeed for CountingFeed {
    fn latest_release(&self) -> anyhow::Result<ReleaseInfo> {
        self.calls.set(self.calls.get() + 1);
        self.release.clone().ok_or_else(|| anyhow!("feed offline"))
    }
}

/// Reports a fixed version for the updater executable and reads sidecar
/// files for everything else.
struct UpdaterVersionProbe {
    updater_version: &'static str,
}

impl VersionProbe for UpdaterVersionProbe {
    fn file_version(&self, path: &Path) -> Option<VersionToken> {
        let is_updater = path
            .file_name()
            .is_some_and(|name| name.eq_ignore_ascii_case("DS4Updater.exe"));
        if is_updater && path.is_file() {
            return Some(VersionToken::parse(self.updater_version));
        }
        SidecarVersionProbe.file_version(path)
    }
}

fn writable(_paths: &InstallPaths) -> anyhow::Result<AccessProbe> {
    Ok(AccessProbe::Writable)
}

fn access_denied(paths: &InstallPaths) -> anyhow::Result<AccessProbe> {
    Ok(AccessProbe::ElevationRequired {
        dir: paths.target_dir().to_path_buf(),
    })
}

struct Harness {
    _dir: tempfile::TempDir,
    paths: InstallPaths,
    script_dir: PathBuf,
    repo_url: String,
    backend: RecordingBackend,
    processes: FakeProcesses,
    prompter: ScriptedPrompter,
}

impl Harness {
    fn new(repo_url: &str, installed_version: &str) -> Self {
        let dir = tempfile::tempdir().expect("must create temp dir");
        let target = dir.path().join("DS4Windows");
        let script_dir = dir.path().join("temp");
        fs::create_dir_all(&script_dir).expect("must create script dir");
        touch(&target.join("DS4Windows.exe"), "old exe");
        touch(&target.join("DS4Windows.exe.version"), installed_version);
        touch(&target.join("DS4Updater.exe"), "updater");

        Self {
            paths: InstallPaths::new(&target, &target),
            _dir: dir,
            script_dir,
            repo_url: repo_url.to_string(),
            backend: RecordingBackend::default(),
            processes: FakeProcesses::default(),
            prompter: ScriptedPrompter::default(),
        }
    }

    fn target(&self) -> &Path {
        self.paths.target_dir()
    }

    fn context<'a>(
        &'a self,
        feed: &'a dyn ReleaseFeed,
        probe: &'a dyn VersionProbe,
        options: RunOptions,
    ) -> UpdateContext<'a> {
        let profile = ProductProfile::default();
        UpdateContext {
            template: hotswap_resolver::DownloadTemplate {
                repo_url: self.repo_url.clone(),
                product_name: profile.name.clone(),
                arch: "x64".to_string(),
                url_template: None,
            },
            paths: self.paths.clone(),
            running_exe: self.paths.updater_exe_path(&profile),
            profile,
            options,
            running_version: VersionToken::parse("0.4.0"),
            script_dir: self.script_dir.clone(),
            client: build_download_client("hotswap-test").expect("must build client"),
            feed,
            backend: &self.backend,
            version_probe: probe,
            processes: &self.processes,
            prompter: &self.prompter,
            access_check: writable,
            renderer: TerminalRenderer::from_style(OutputStyle::Plain),
            target_exit_timeout: Duration::from_millis(50),
            helper_exit_timeout: Duration::from_millis(50),
        }
    }
}

fn ci_options() -> RunOptions {
    RunOptions {
        ci: true,
        skip_lang: true,
        relaunch_args: vec!["--ci".to_string()],
        ..RunOptions::default()
    }
}

fn http_feed(server: &ServerGuard) -> HttpReleaseFeed {
    HttpReleaseFeed::new(format!("{}{LATEST_PATH}", server.url()), "hotswap-test")
        .expect("must build feed")
}

fn assert_result(report: &RunReport, exit_code: i32, message: &str) {
    assert_eq!(report.result.message, message);
    assert_eq!(report.result.exit_code, exit_code);
}

#[test]
fn current_release_is_up_to_date_without_fetching_package() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let feed_mock = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .expect(1)
        .create();
    let package_mock = server.mock("GET", PACKAGE_PATH).expect(0).create();

    let harness = Harness::new(&server.url(), "2.1.0");
    let feed = http_feed(&server);
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));

    feed_mock.assert();
    package_mock.assert();
    assert_result(&report, 0, "up_to_date");
    assert!(report.result.ci_mode);
    assert!(report.pending.is_none());
    assert!(!harness.paths.marker_path().exists());
}

#[test]
fn newer_release_is_downloaded_and_installed() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let package_mock = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(release_package("2.1.0", &[]))
        .expect(1)
        .create();

    let harness = Harness::new(&server.url(), "2.0.9");
    let feed = http_feed(&server);
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));

    package_mock.assert();
    assert_result(&report, 0, "updated:2.1.0");
    assert!(report.pending.is_none());
    assert_eq!(
        fs::read_to_string(harness.target().join("DS4Windows.exe")).expect("must read exe"),
        "new exe"
    );
    assert!(harness.target().join("DS4Control.dll").is_file());
    assert!(!harness.paths.update_files_dir().exists());
    assert!(!harness.paths.marker_path().exists());
    assert_eq!(
        fs::read_to_string(harness.target().join("DS4Updater.exe")).expect("updater kept"),
        "updater"
    );
    assert_eq!(
        report.result.to_json_line(),
        r#"{"exit":0,"message":"updated:2.1.0"}"#
    );
}

#[test]
fn headless_access_denied_reports_admin_required_without_prompt_or_download() {
    let harness = Harness::new("https://github.com/owner/product", "2.0.9");
    let feed = CountingFeed::offline();
    let mut ctx = harness.context(&feed, &SidecarVersionProbe, ci_options());
    ctx.access_check = access_denied;

    let report = run_update(&ctx);

    assert_result(&report, 3, "admin_required");
    assert_eq!(feed.calls.get(), 0);
    assert!(harness.prompter.asked().is_empty());
    assert!(harness.backend.launches().is_empty());
    assert!(!harness.paths.updates_dir().exists());
}

#[test]
fn interactive_access_denied_restarts_elevated_with_same_arguments() {
    let mut harness = Harness::new("https://github.com/owner/product", "2.0.9");
    harness.prompter = ScriptedPrompter::answering(&[true]);
    let feed = CountingFeed::offline();
    let options = RunOptions {
        relaunch_args: vec![
            "--autolaunch".to_string(),
            "--target-dir".to_string(),
            "C:\\My Apps".to_string(),
        ],
        ..RunOptions::default()
    };
    let mut ctx = harness.context(&feed, &SidecarVersionProbe, options);
    ctx.access_check = access_denied;

    let report = run_update(&ctx);

    assert_result(&report, 0, "elevated_restart");
    assert_eq!(feed.calls.get(), 0);
    let launches = harness.backend.launches();
    assert_eq!(launches.len(), 1);
    let (mode, path, args) = &launches[0];
    assert_eq!(*mode, IdentityMode::Elevated);
    assert_eq!(path, &harness.paths.updater_exe_path(&ProductProfile::default()));
    assert_eq!(args, &["--autolaunch", "--target-dir", "C:\\My Apps"]);
}

#[test]
fn declined_elevation_reports_admin_required() {
    let mut harness = Harness::new("https://github.com/owner/product", "2.0.9");
    harness.prompter = ScriptedPrompter::answering(&[true]);
    harness.backend.decline_elevation = true;
    let feed = CountingFeed::offline();
    let mut ctx = harness.context(&feed, &SidecarVersionProbe, RunOptions::default());
    ctx.access_check = access_denied;

    let report = run_update(&ctx);

    assert_result(&report, 3, "admin_required");
    assert_eq!(harness.prompter.asked().len(), 1);
}

#[test]
fn newer_updater_in_package_schedules_self_replacement() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(release_package(
            "2.1.0",
            &[("DS4Windows/DS4Updater.exe", b"new updater")],
        ))
        .create();

    let harness = Harness::new(&server.url(), "2.0.9");
    let feed = http_feed(&server);
    let probe = UpdaterVersionProbe {
        updater_version: "9.0.0",
    };
    let options = RunOptions {
        autolaunch: true,
        ..ci_options()
    };
    let report = run_update(&harness.context(&feed, &probe, options));

    assert_result(&report, 0, "self_update_scheduled:2.1.0");
    let pending = report.pending.expect("replacement must be pending");
    assert_eq!(pending.script_path, harness.script_dir.join(REPLACEMENT_SCRIPT_NAME));
    assert!(pending.script_path.is_file());
    assert!(harness.paths.update_files_dir().join("DS4Updater.exe").is_file());
    assert_eq!(
        fs::read_to_string(harness.target().join("DS4Updater.exe")).expect("old updater kept"),
        "updater"
    );

    let launches = harness.backend.launches();
    assert_eq!(launches.len(), 1, "only the script may be started: {launches:?}");
    let (mode, path, args) = &launches[0];
    assert_eq!(*mode, IdentityMode::Inherited);
    assert_eq!(path, Path::new("cmd.exe"));
    assert_eq!(args[0], "/C");

    let script = fs::read_to_string(&pending.script_path).expect("must read script");
    assert!(script.contains("DS4Updater.exe"));
    assert!(script.contains("--ci"));
}

#[test]
fn same_updater_version_is_not_replaced() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(release_package(
            "2.1.0",
            &[("DS4Windows/DS4Updater.exe", b"same updater")],
        ))
        .create();

    let harness = Harness::new(&server.url(), "2.0.9");
    let feed = http_feed(&server);
    let probe = UpdaterVersionProbe {
        updater_version: "0.4.0",
    };
    let report = run_update(&harness.context(&feed, &probe, ci_options()));

    assert_result(&report, 0, "updated:2.1.0");
    assert!(report.pending.is_none());
    assert!(!harness.paths.update_files_dir().exists());
    assert!(!harness.script_dir.join(REPLACEMENT_SCRIPT_NAME).exists());
}

#[test]
fn prewritten_marker_installs_without_querying_feed() {
    let mut server = Server::new();
    let package_mock = server
        .mock("GET", "/releases/download/v2.1.0/DS4Windows_2.1.0_x64.zip")
        .with_status(200)
        .with_body(release_package("2.1.0", &[]))
        .expect(1)
        .create();

    let harness = Harness::new(&server.url(), "2.0.9");
    touch(&harness.paths.marker_path(), "2.1.0\r\n");
    let feed = CountingFeed::offline();
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));

    package_mock.assert();
    assert_eq!(feed.calls.get(), 0);
    assert_result(&report, 0, "updated:2.1.0");
    assert!(!harness.paths.marker_path().exists());
}

#[test]
fn unreachable_feed_is_download_failed() {
    let harness = Harness::new("https://github.com/owner/product", "2.0.9");
    let feed = CountingFeed::offline();
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));

    assert_result(&report, 2, "download_failed");
    assert_eq!(feed.calls.get(), 1);
    assert_eq!(
        fs::read_to_string(harness.target().join("DS4Windows.exe")).expect("exe untouched"),
        "old exe"
    );
}

#[test]
fn headless_download_failure_is_not_retried() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let package_mock = server
        .mock("GET", PACKAGE_PATH)
        .with_status(404)
        .expect(1)
        .create();

    let harness = Harness::new(&server.url(), "2.0.9");
    let feed = http_feed(&server);
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));

    package_mock.assert();
    assert_result(&report, 2, "download_failed");
    assert!(harness.prompter.asked().is_empty());
    assert!(!harness.paths.marker_path().exists());
}

#[test]
fn failed_download_does_not_pin_next_run_to_that_release() {
    let mut first = Server::new();
    let body = feed_body(&first, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = first
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = first.mock("GET", PACKAGE_PATH).with_status(404).create();

    let harness = Harness::new(&first.url(), "2.0.9");
    let feed = http_feed(&first);
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));
    assert_result(&report, 2, "download_failed");

    let mut second = Server::new();
    let body = feed_body(&second, "v2.2.0", &["DS4Windows_2.2.0_x64.zip"]);
    let feed_mock = second
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .expect(1)
        .create();
    let _package = second
        .mock("GET", "/download/DS4Windows_2.2.0_x64.zip")
        .with_status(200)
        .with_body(release_package("2.2.0", &[]))
        .create();

    let feed = http_feed(&second);
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));

    feed_mock.assert();
    assert_result(&report, 0, "updated:2.2.0");
}

#[test]
fn interactive_download_failure_offers_retry() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let package_mock = server
        .mock("GET", PACKAGE_PATH)
        .with_status(500)
        .expect(2)
        .create();

    let mut harness = Harness::new(&server.url(), "2.0.9");
    harness.prompter = ScriptedPrompter::answering(&[true, false]);
    let feed = http_feed(&server);
    let options = RunOptions {
        skip_lang: true,
        ..RunOptions::default()
    };
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, options));

    package_mock.assert();
    assert_result(&report, 2, "download_failed");
    assert_eq!(harness.prompter.asked().len(), 2);
    assert!(!report.result.ci_mode);
}

#[test]
fn package_that_cannot_be_written_locally_is_cannot_save_download() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(release_package("2.1.0", &[]))
        .create();

    let harness = Harness::new(&server.url(), "2.0.9");
    fs::create_dir_all(harness.paths.package_download_path(PACKAGE_NAME))
        .expect("must occupy the download path");
    let feed = http_feed(&server);
    let options = RunOptions {
        skip_lang: true,
        ..RunOptions::default()
    };
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, options));

    assert_result(&report, 4, "cannot_save_download");
    assert!(harness.prompter.asked().is_empty());
    assert_eq!(
        fs::read_to_string(harness.target().join("DS4Windows.exe")).expect("exe untouched"),
        "old exe"
    );
}

#[test]
fn headless_run_closes_running_target_before_install() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(release_package("2.1.0", &[]))
        .create();

    let mut harness = Harness::new(&server.url(), "2.0.9");
    harness.processes = FakeProcesses::running(&["DS4Windows.exe"]);
    let feed = http_feed(&server);
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));

    assert_result(&report, 0, "updated:2.1.0");
    assert_eq!(
        harness.processes.terminated.borrow().as_slice(),
        &["DS4Windows.exe".to_string()]
    );
}

#[test]
fn target_that_will_not_exit_is_reported_busy() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(release_package("2.1.0", &[]))
        .create();

    let mut harness = Harness::new(&server.url(), "2.0.9");
    harness.processes = FakeProcesses {
        stubborn: true,
        ..FakeProcesses::running(&["DS4Windows.exe"])
    };
    let feed = http_feed(&server);
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));

    assert_result(&report, 7, "target_busy");
    assert_eq!(
        fs::read_to_string(harness.target().join("DS4Windows.exe")).expect("exe untouched"),
        "old exe"
    );
    assert!(!harness.paths.marker_path().exists());
}

#[test]
fn declining_to_close_target_is_reported_busy() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(release_package("2.1.0", &[]))
        .create();

    let mut harness = Harness::new(&server.url(), "2.0.9");
    harness.processes = FakeProcesses::running(&["DS4Windows.exe"]);
    harness.prompter = ScriptedPrompter::answering(&[false]);
    let feed = http_feed(&server);
    let options = RunOptions {
        skip_lang: true,
        ..RunOptions::default()
    };
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, options));

    assert_result(&report, 7, "target_busy");
    assert!(harness.processes.terminated.borrow().is_empty());
}

#[test]
fn lingering_helper_process_is_reported_busy() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(release_package("2.1.0", &[]))
        .create();

    let mut harness = Harness::new(&server.url(), "2.0.9");
    harness.processes = FakeProcesses::running(&["HidGuardHelper.exe"]);
    let feed = http_feed(&server);
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));

    assert_result(&report, 7, "target_busy");
    assert!(harness.processes.terminated.borrow().is_empty());
}

#[test]
fn package_without_main_executable_is_unpack_failed() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(zip_bytes(&[("DS4Windows/readme.txt", b"nothing here")]))
        .create();

    let harness = Harness::new(&server.url(), "2.0.9");
    let feed = http_feed(&server);
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, ci_options()));

    assert_result(&report, 6, "unpack_failed");
    assert_eq!(
        fs::read_to_string(harness.target().join("DS4Windows.exe")).expect("exe untouched"),
        "old exe"
    );
}

#[test]
fn language_pack_is_extracted_into_lang_dir() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME, "DS4Windows_Lang_2.1.0.zip"]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(release_package("2.1.0", &[]))
        .create();
    let lang_mock = server
        .mock("GET", "/download/DS4Windows_Lang_2.1.0.zip")
        .with_status(200)
        .with_body(zip_bytes(&[("de/DS4Windows.resources.dll", b"deutsch")]))
        .expect(1)
        .create();

    let harness = Harness::new(&server.url(), "2.0.9");
    let feed = http_feed(&server);
    let options = RunOptions {
        skip_lang: false,
        ..ci_options()
    };
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, options));

    lang_mock.assert();
    assert_result(&report, 0, "updated:2.1.0");
    assert!(harness
        .paths
        .lang_dir()
        .join("de")
        .join("DS4Windows.resources.dll")
        .is_file());
}

#[test]
fn broken_language_pack_only_warns() {
    let mut server = Server::new();
    let body = feed_body(&server, "v2.1.0", &[PACKAGE_NAME, "DS4Windows_Lang_2.1.0.zip"]);
    let _feed = server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_body(body)
        .create();
    let _package = server
        .mock("GET", PACKAGE_PATH)
        .with_status(200)
        .with_body(release_package("2.1.0", &[]))
        .create();
    let _lang = server
        .mock("GET", "/download/DS4Windows_Lang_2.1.0.zip")
        .with_status(200)
        .with_body("not a zip")
        .create();

    let harness = Harness::new(&server.url(), "2.0.9");
    let feed = http_feed(&server);
    let options = RunOptions {
        skip_lang: false,
        ..ci_options()
    };
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, options));

    assert_result(&report, 0, "updated:2.1.0");
}

#[test]
fn up_to_date_run_autolaunches_target_as_desktop_user() {
    let harness = Harness::new("https://github.com/owner/product", "2.1.0");
    let feed = CountingFeed {
        release: Some(ReleaseInfo::from_json_str(
            r#"{"tag_name":"v2.1.0","assets":[{"name":"DS4Windows_2.1.0_x64.zip","browser_download_url":"https://example.test/pkg.zip"}]}"#,
        )
        .expect("must parse release")),
        calls: Cell::new(0),
    };
    let options = RunOptions {
        autolaunch: true,
        force_user_launch: true,
        ..ci_options()
    };
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, options));

    assert_result(&report, 0, "up_to_date");
    let launches = harness.backend.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].0, IdentityMode::InteractiveUser);
    assert_eq!(launches[0].1, harness.target().join("DS4Windows.exe"));
}

#[test]
fn failed_run_does_not_autolaunch() {
    let harness = Harness::new("https://github.com/owner/product", "2.0.9");
    let feed = CountingFeed::offline();
    let options = RunOptions {
        autolaunch: true,
        ..ci_options()
    };
    let report = run_update(&harness.context(&feed, &SidecarVersionProbe, options));

    assert_result(&report, 2, "download_failed");
    assert!(harness.backend.launches().is_empty());
}

#[test]
fn workspace_preparation_clears_leftovers() {
    let harness = Harness::new("https://github.com/owner/product", "2.0.9");
    let profile = ProductProfile::default();
    touch(&harness.target().join("DS4Windows_1.9.0_x64.zip"), "old");
    touch(&harness.paths.updates_dir().join("DS4Windows_2.0.0_x86.zip"), "old");
    touch(&harness.paths.update_files_dir().join("DS4Windows.exe"), "stale");
    touch(&harness.target().join("DS4Windows_notes.zip"), "keep");

    prepare_workspace(&harness.paths, &profile).expect("must prepare");

    assert!(!harness.target().join("DS4Windows_1.9.0_x64.zip").exists());
    assert!(!harness.paths.updates_dir().join("DS4Windows_2.0.0_x86.zip").exists());
    assert!(!harness.paths.update_files_dir().exists());
    assert!(harness.paths.updates_dir().is_dir());
    assert!(harness.target().join("DS4Windows_notes.zip").exists());
}

#[test]
fn launch_identity_prefers_explicit_mode() {
    let mut options = RunOptions::default();
    assert_eq!(launch_identity(&options), IdentityMode::Inherited);

    options.force_user_launch = true;
    assert_eq!(launch_identity(&options), IdentityMode::InteractiveUser);

    options.launch_mode = Some(IdentityMode::Elevated);
    assert_eq!(launch_identity(&options), IdentityMode::Elevated);
}

#[test]
fn launch_override_must_exist_in_target() {
    let harness = Harness::new("https://github.com/owner/product", "2.0.9");
    let profile = ProductProfile::default();
    touch(&harness.target().join("Custom.exe"), "alias");

    assert_eq!(
        launch_target_path(&harness.paths, &profile, Some("Custom.exe")),
        harness.target().join("Custom.exe")
    );
    assert_eq!(
        launch_target_path(&harness.paths, &profile, Some("Missing.exe")),
        harness.target().join("DS4Windows.exe")
    );
    assert_eq!(
        launch_target_path(&harness.paths, &profile, None),
        harness.target().join("DS4Windows.exe")
    );
}

#[test]
fn config_defaults_point_at_product_repository() {
    let config = UpdaterConfig::default();
    assert_eq!(config.repo_url, DEFAULT_REPO_URL);
    assert_eq!(
        config.feed_endpoint().expect("must derive endpoint"),
        "https://api.github.com/repos/Ryochan7/DS4Windows/releases/latest"
    );
    assert_eq!(config.product, ProductProfile::default());
}

#[test]
fn config_file_overrides_fields_and_keeps_defaults() {
    let config = UpdaterConfig::from_toml_str(
        r#"
repo_url = "https://github.com/example/Tool"
download_url_template = "https://mirror.test/{file}"
arch = "x86"

[product]
name = "Tool"
main_exe = "Tool.exe"
blocking_processes = []
"#,
    )
    .expect("must parse config");

    assert_eq!(config.arch, "x86");
    assert_eq!(config.product.name, "Tool");
    assert_eq!(config.product.main_exe, "Tool.exe");
    assert_eq!(config.product.updater_exe, "DS4Updater.exe");
    assert!(config.product.blocking_processes.is_empty());

    let template = config.download_template();
    assert_eq!(template.product_name, "Tool");
    assert_eq!(template.arch, "x86");
    assert_eq!(template.url_template.as_deref(), Some("https://mirror.test/{file}"));
}

#[test]
fn explicit_api_url_wins_until_base_url_override() {
    let config = UpdaterConfig {
        api_url: Some("https://feed.test/latest".to_string()),
        ..UpdaterConfig::default()
    };
    assert_eq!(
        config.feed_endpoint().expect("must use api url"),
        "https://feed.test/latest"
    );

    let config = config.with_base_url("https://github.com/fork/DS4Windows/");
    assert_eq!(config.repo_url, "https://github.com/fork/DS4Windows");
    assert_eq!(
        config.feed_endpoint().expect("must derive endpoint"),
        "https://api.github.com/repos/fork/DS4Windows/releases/latest"
    );
}

#[test]
fn non_github_repository_needs_api_url() {
    let config = UpdaterConfig::default().with_base_url("https://example.test/releases");
    let err = config.feed_endpoint().expect_err("must fail");
    assert!(err.to_string().contains("api_url"), "{err}");
}

#[test]
fn missing_config_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let config = UpdaterConfig::load(&dir.path().join("hotswap.toml")).expect("must load");
    assert_eq!(config, UpdaterConfig::default());
}

#[test]
fn malformed_config_file_is_an_error() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let path = dir.path().join("hotswap.toml");
    touch(&path, "repo_url = [");
    let err = UpdaterConfig::load(&path).expect_err("must fail");
    assert!(format!("{err:#}").contains("hotswap.toml"), "{err:#}");
}

#[test]
fn parses_full_command_line() {
    let cli = Cli::try_parse_from([
        "hotswap",
        "--skip-lang",
        "--autolaunch",
        "--user",
        "--launch-exe",
        "Custom.exe",
        "--target-dir",
        "C:/Apps/DS4Windows",
        "--updater-dir",
        "C:/Apps/Updater",
        "--launch-mode",
        "admin",
        "--ci",
        "--base-url=https://github.com/fork/DS4Windows",
        "--config",
        "custom.toml",
    ])
    .expect("must parse");

    assert!(cli.skip_lang && cli.autolaunch && cli.user && cli.ci);
    assert_eq!(cli.launch_exe.as_deref(), Some("Custom.exe"));
    assert_eq!(cli.target_dir, Some(PathBuf::from("C:/Apps/DS4Windows")));
    assert_eq!(cli.updater_dir, Some(PathBuf::from("C:/Apps/Updater")));
    assert_eq!(cli.launch_mode, Some(IdentityMode::Elevated));
    assert_eq!(
        cli.base_url.as_deref(),
        Some("https://github.com/fork/DS4Windows")
    );
    assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
}

#[test]
fn rejects_unknown_launch_mode() {
    assert!(Cli::try_parse_from(["hotswap", "--launch-mode", "root"]).is_err());
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "installed DS4Windows 2.1.0"),
        "installed DS4Windows 2.1.0"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "installed DS4Windows 2.1.0"),
        "[OK] installed DS4Windows 2.1.0"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "language pack skipped"),
        "[WARN] language pack skipped"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "error", "download failed"),
        "[ERR] download failed"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "step", "checking for updates"),
        "[..] checking for updates"
    );
}

#[test]
fn ci_mode_forces_plain_output() {
    assert_eq!(resolve_output_style(true, true), OutputStyle::Plain);
    assert_eq!(resolve_output_style(false, false), OutputStyle::Plain);
    assert_eq!(resolve_output_style(false, true), OutputStyle::Rich);
}

#[test]
fn progress_line_is_rich_only() {
    assert_eq!(
        render_progress_line(OutputStyle::Plain, "package", 10, 10, None),
        None
    );
    let line = render_progress_line(
        OutputStyle::Rich,
        "package",
        512,
        1024,
        Some(Duration::from_millis(1500)),
    )
    .expect("rich style renders a line");
    assert!(line.contains(" 50% "), "{line}");
    assert!(line.contains("complete in 1.500s"), "{line}");
}

#[test]
fn prompt_answers_accept_only_yes() {
    assert!(parse_answer("y\n"));
    assert!(parse_answer(" YES "));
    assert!(!parse_answer(""));
    assert!(!parse_answer("no"));
    assert!(!parse_answer("yep"));
}

#[test]
fn feed_requests_carry_user_agent() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", LATEST_PATH)
        .match_header("user-agent", Matcher::Regex("^hotswap-test".to_string()))
        .with_status(200)
        .with_body(r#"{"tag_name":"v1.0.0","assets":[]}"#)
        .expect(1)
        .create();

    let feed = http_feed(&server);
    let release = feed.latest_release().expect("must fetch release");

    mock.assert();
    assert_eq!(release.tag, "v1.0.0");
}
