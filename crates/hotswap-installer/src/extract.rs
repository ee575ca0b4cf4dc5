use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use hotswap_core::ProductProfile;
use zip::ZipArchive;

/// What a package archive holds, decided before anything is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    /// Top-level folder that is flattened away on extraction, if any.
    pub root: Option<String>,
    pub file_count: usize,
}

/// Opens `archive_path` and checks that it carries the main executable,
/// either at the archive root or inside a single folder named after the
/// product.
pub fn inspect_package(archive_path: &Path, profile: &ProductProfile) -> Result<PackageLayout> {
    let mut archive = open_archive(archive_path)?;
    let entries = entry_paths(&mut archive)?;

    let main_exe = Path::new(&profile.main_exe);
    let nested = entries.iter().any(|(path, is_dir)| {
        !is_dir
            && strip_root(path, Some(&profile.name))
                .map(|rel| same_path(&rel, main_exe))
                .unwrap_or(false)
    });
    let root = if nested {
        Some(profile.name.clone())
    } else if entries
        .iter()
        .any(|(path, is_dir)| !is_dir && same_path(path, main_exe))
    {
        None
    } else {
        return Err(anyhow!(
            "package {} does not contain {}",
            archive_path.display(),
            profile.main_exe
        ));
    };

    let file_count = entries
        .iter()
        .filter(|(path, is_dir)| !is_dir && strip_root(path, root.as_deref()).is_some())
        .count();
    Ok(PackageLayout { root, file_count })
}

/// Unpacks the package into `staging_dir`, flattening the product folder.
/// Entries outside the effective root are ignored.
pub fn extract_package(
    archive_path: &Path,
    staging_dir: &Path,
    profile: &ProductProfile,
) -> Result<PackageLayout> {
    let layout = inspect_package(archive_path, profile)?;
    extract_with_root(archive_path, staging_dir, layout.root.as_deref())?;
    tracing::debug!(
        files = layout.file_count,
        staging = %staging_dir.display(),
        "package extracted"
    );
    Ok(layout)
}

/// Unpacks every entry of `archive_path` into `dest`.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    extract_with_root(archive_path, dest, None)
}

fn extract_with_root(archive_path: &Path, dest: &Path, root: Option<&str>) -> Result<usize> {
    let mut archive = open_archive(archive_path)?;
    fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).with_context(|| {
            format!("failed to read entry {index} of {}", archive_path.display())
        })?;
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(anyhow!(
                "archive entry escapes extraction directory: {}",
                entry.name()
            ));
        };
        let Some(rel) = strip_root(&enclosed, root) else {
            continue;
        };

        let out_path = dest.join(&rel);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("failed to create {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract {}", out_path.display()))?;
        written += 1;
    }
    Ok(written)
}

fn open_archive(archive_path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open {}", archive_path.display()))?;
    ZipArchive::new(file)
        .with_context(|| format!("not a readable zip archive: {}", archive_path.display()))
}

fn entry_paths(archive: &mut ZipArchive<File>) -> Result<Vec<(PathBuf, bool)>> {
    let mut paths = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read archive entry {index}"))?;
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(anyhow!(
                "archive entry escapes extraction directory: {}",
                entry.name()
            ));
        };
        paths.push((enclosed, entry.is_dir()));
    }
    Ok(paths)
}

/// Path of `path` below `root`, or the whole path when there is no root.
/// Returns `None` for paths outside `root` and for `root` itself.
fn strip_root(path: &Path, root: Option<&str>) -> Option<PathBuf> {
    let mut components = path.components().filter_map(|component| match component {
        Component::Normal(value) => Some(value),
        _ => None,
    });

    if let Some(root) = root {
        let first = components.next()?;
        if !first.to_string_lossy().eq_ignore_ascii_case(root) {
            return None;
        }
    }

    let rest: PathBuf = components.collect();
    if rest.as_os_str().is_empty() {
        None
    } else {
        Some(rest)
    }
}

fn same_path(left: &Path, right: &Path) -> bool {
    left.to_string_lossy()
        .replace('\\', "/")
        .eq_ignore_ascii_case(&right.to_string_lossy().replace('\\', "/"))
}
