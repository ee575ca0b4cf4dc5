use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use crate::layout::InstallPaths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessProbe {
    Writable,
    ElevationRequired { dir: PathBuf },
}

impl AccessProbe {
    pub fn requires_elevation(&self) -> bool {
        matches!(self, Self::ElevationRequired { .. })
    }
}

/// Writes and deletes a throwaway file in the updater directory and, when it
/// differs, the target directory.
///
/// Access denied means elevation is required. Any other I/O failure is an
/// error.
pub fn probe_write_access(paths: &InstallPaths) -> Result<AccessProbe> {
    let mut dirs = vec![paths.updater_dir()];
    if !paths.shares_dir() {
        dirs.push(paths.target_dir());
    }

    for dir in dirs {
        match try_write_delete(dir) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                tracing::info!(dir = %dir.display(), "directory is not writable without elevation");
                return Ok(AccessProbe::ElevationRequired {
                    dir: dir.to_path_buf(),
                });
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to probe write access in {}", dir.display()))
            }
        }
    }
    Ok(AccessProbe::Writable)
}

fn try_write_delete(dir: &Path) -> io::Result<()> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let probe = dir.join(format!(".hotswap-probe-{}-{nanos}.tmp", std::process::id()));

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)?;
    file.write_all(b"probe")?;
    drop(file);
    std::fs::remove_file(&probe)
}
