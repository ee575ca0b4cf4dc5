use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hotswap_core::ProductProfile;

use crate::fs_utils::same_directory;

const UPDATE_FILES_DIR: &str = "Update Files";
const UPDATES_DIR: &str = "Updates";
const MARKER_FILE: &str = "version.txt";
const LIBS_DIR: &str = "libs";
const OLD_LIBS_DIR: &str = "oldlibs";
const LANG_DIR: &str = "Lang";
const CUSTOM_EXE_CONFIG: &str = "custom_exe_name.txt";

/// Where the updater lives and where the product it maintains is installed.
/// Both may point at the same directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    updater_dir: PathBuf,
    target_dir: PathBuf,
}

impl InstallPaths {
    pub fn new(updater_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            updater_dir: updater_dir.into(),
            target_dir: target_dir.into(),
        }
    }

    pub fn updater_dir(&self) -> &Path {
        &self.updater_dir
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    pub fn shares_dir(&self) -> bool {
        same_directory(&self.updater_dir, &self.target_dir)
    }

    /// Staging area the package is extracted into before being merged.
    pub fn update_files_dir(&self) -> PathBuf {
        self.target_dir.join(UPDATE_FILES_DIR)
    }

    pub fn updates_dir(&self) -> PathBuf {
        self.target_dir.join(UPDATES_DIR)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.target_dir.join(MARKER_FILE)
    }

    pub fn libs_dir(&self) -> PathBuf {
        self.target_dir.join(LIBS_DIR)
    }

    pub fn oldlibs_dir(&self) -> PathBuf {
        self.target_dir.join(OLD_LIBS_DIR)
    }

    pub fn lang_dir(&self) -> PathBuf {
        self.target_dir.join(LANG_DIR)
    }

    pub fn main_exe_path(&self, profile: &ProductProfile) -> PathBuf {
        self.target_dir.join(&profile.main_exe)
    }

    pub fn updater_exe_path(&self, profile: &ProductProfile) -> PathBuf {
        self.updater_dir.join(&profile.updater_exe)
    }

    /// Updater executable shipped inside the extracted package.
    pub fn staged_updater_path(&self, profile: &ProductProfile) -> PathBuf {
        self.update_files_dir().join(&profile.updater_exe)
    }

    pub fn package_download_path(&self, file_name: &str) -> PathBuf {
        self.updates_dir().join(file_name)
    }

    pub fn custom_exe_config_path(&self) -> PathBuf {
        self.updater_dir.join(CUSTOM_EXE_CONFIG)
    }

    /// Directory names under the target that never belong to the installed
    /// product tree.
    pub fn scratch_dir_names() -> [&'static str; 2] {
        [UPDATE_FILES_DIR, UPDATES_DIR]
    }

    pub fn ensure_updates_dir(&self) -> Result<PathBuf> {
        let dir = self.updates_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }
}
