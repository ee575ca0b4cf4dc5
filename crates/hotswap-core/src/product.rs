use serde::{Deserialize, Serialize};

/// Names that tie the updater to the product it maintains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProductProfile {
    /// Product name; also the top-level folder name inside release archives.
    pub name: String,
    pub main_exe: String,
    pub updater_exe: String,
    /// Top-level files from older releases that are removed before install.
    pub known_files: Vec<String>,
    /// Extensions of loose top-level files that are always discarded.
    pub obsolete_extensions: Vec<String>,
    /// Helper processes that must exit before files are replaced.
    pub blocking_processes: Vec<String>,
    /// Process running in the interactive desktop session whose identity is
    /// borrowed for non-elevated launches.
    pub reference_process: String,
}

impl Default for ProductProfile {
    fn default() -> Self {
        Self {
            name: "DS4Windows".to_string(),
            main_exe: "DS4Windows.exe".to_string(),
            updater_exe: "DS4Updater.exe".to_string(),
            known_files: vec![
                "DS4Windows.exe".to_string(),
                "DS4Tool.exe".to_string(),
                "DS4Control.dll".to_string(),
                "DS4Library.dll".to_string(),
                "HidLibrary.dll".to_string(),
            ],
            obsolete_extensions: vec!["ds4w".to_string()],
            blocking_processes: vec!["HidGuardHelper.exe".to_string()],
            reference_process: "explorer.exe".to_string(),
        }
    }
}

impl ProductProfile {
    pub fn main_image_name(&self) -> &str {
        &self.main_exe
    }

    /// Updater executable name without its extension.
    pub fn updater_stem(&self) -> &str {
        file_stem(&self.updater_exe)
    }

    /// Download file name for a packaged release, e.g. `DS4Windows_3.2.1_x64.zip`.
    pub fn package_file_name(&self, version: &str, arch: &str) -> String {
        format!("{}_{}_{}.zip", self.name, version, arch)
    }

    /// Whether `file_name` looks like a package archive left by an earlier run.
    pub fn is_package_file_name(&self, file_name: &str) -> bool {
        let Some(rest) = file_name.strip_prefix(&format!("{}_", self.name)) else {
            return false;
        };
        let Some(body) = rest.strip_suffix(".zip") else {
            return false;
        };
        match body.rsplit_once('_') {
            Some((version, arch)) => !version.is_empty() && !arch.is_empty(),
            None => false,
        }
    }
}

fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Architecture tag used in release asset names.
pub fn host_arch() -> &'static str {
    if cfg!(target_pointer_width = "64") {
        "x64"
    } else {
        "x86"
    }
}
