use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use hotswap_core::VersionToken;

pub fn write_marker(path: &Path, version: &VersionToken) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, version.as_str().trim())
        .with_context(|| format!("failed to write version marker {}", path.display()))
}

/// Reads the recorded version once and deletes the marker right away.
///
/// An absent or blank marker yields `None`.
pub fn consume_marker(path: &Path) -> Result<Option<VersionToken>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read version marker {}", path.display()))
        }
    };

    discard_marker(path)?;

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(VersionToken::parse(trimmed)))
}

pub fn discard_marker(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to delete version marker {}", path.display()))
        }
    }
}
