use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

pub fn remove_dir_all_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Relative paths of every file under `root` whose extension matches
/// `extension` case-insensitively. Directories whose names appear in
/// `skip_dirs` at the top level are not descended into.
pub fn collect_relative_files_with_extension(
    root: &Path,
    extension: &str,
    skip_dirs: &[&str],
) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let walker = WalkDir::new(root).min_depth(1).into_iter().filter_entry(|entry| {
        !(entry.depth() == 1
            && entry.file_type().is_dir()
            && skip_dirs
                .iter()
                .any(|skip| entry.file_name().to_string_lossy().eq_ignore_ascii_case(skip)))
    });

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), extension) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("failed to relativize {}", entry.path().display()))?;
        found.push(rel.to_path_buf());
    }
    found.sort();
    Ok(found)
}

/// Relative paths of every file under `root`, sorted.
pub fn collect_relative_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("failed to relativize {}", entry.path().display()))?;
        found.push(rel.to_path_buf());
    }
    found.sort();
    Ok(found)
}

/// Relative paths of every directory under `root`, parents before children.
pub fn collect_relative_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("failed to relativize {}", entry.path().display()))?;
        found.push(rel.to_path_buf());
    }
    Ok(found)
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Moves `src` to `dst`, falling back to copy and delete when a rename is
/// not possible (for example across volumes).
pub fn move_file_or_copy(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst).with_context(|| {
                format!("failed to copy {} to {}", src.display(), dst.display())
            })?;
            fs::remove_file(src)
                .with_context(|| format!("failed to remove staged file {}", src.display()))?;
            Ok(())
        }
    }
}

/// Case-insensitive comparison of two directories after normalizing
/// separators and trailing slashes.
pub fn same_directory(left: &Path, right: &Path) -> bool {
    normalize_dir(left).eq_ignore_ascii_case(&normalize_dir(right))
}

fn normalize_dir(path: &Path) -> String {
    let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    resolved
        .to_string_lossy()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_string()
}
