use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("elevation was declined or failed for {path}")]
    ElevationDeclined { path: PathBuf },

    #[error("failed to start {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{operation} is not supported on this host")]
    Unsupported { operation: &'static str },

    #[error("every launch strategy failed for {path}: {attempts}")]
    AllFallbacksFailed { path: PathBuf, attempts: String },
}

impl LaunchError {
    pub fn is_elevation_declined(&self) -> bool {
        matches!(self, Self::ElevationDeclined { .. })
    }
}

pub type Result<T> = std::result::Result<T, LaunchError>;
