use std::process::{Command, Stdio};

use crate::backend::LaunchBackend;
use crate::error::{LaunchError, Result};
use crate::spec::LaunchSpec;

/// Backend for hosts without identity delegation. Only inherited launches
/// are available.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableBackend;

impl LaunchBackend for PortableBackend {
    fn launch_as_current_user(&self, _spec: &LaunchSpec) -> Result<()> {
        Err(LaunchError::Unsupported {
            operation: "interactive-user launch",
        })
    }

    fn launch_elevated(&self, _spec: &LaunchSpec) -> Result<()> {
        Err(LaunchError::Unsupported {
            operation: "elevated launch",
        })
    }

    fn launch_inherited(&self, spec: &LaunchSpec) -> Result<()> {
        spawn_detached(spec)
    }

    fn open_with_shell(&self, _spec: &LaunchSpec) -> Result<()> {
        Err(LaunchError::Unsupported {
            operation: "desktop shell launch",
        })
    }
}

/// Spawns the process without waiting for it.
pub(crate) fn spawn_detached(spec: &LaunchSpec) -> Result<()> {
    let mut command = Command::new(&spec.executable_path);
    command
        .args(&spec.arguments)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(dir) = spec.effective_working_dir() {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(|source| LaunchError::Spawn {
        path: spec.executable_path.clone(),
        source,
    })?;
    tracing::debug!(pid = child.id(), "process started");
    Ok(())
}
