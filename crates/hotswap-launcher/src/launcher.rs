use crate::backend::LaunchBackend;
use crate::error::{LaunchError, Result};
use crate::spec::{IdentityMode, LaunchSpec};

/// Starts processes under the identity a [`LaunchSpec`] asks for.
#[derive(Debug, Clone)]
pub struct Launcher<B> {
    backend: B,
}

impl<B: LaunchBackend> Launcher<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn launch(&self, spec: &LaunchSpec) -> Result<()> {
        tracing::info!(
            path = %spec.executable_path.display(),
            mode = spec.identity_mode.as_str(),
            "launching process"
        );
        match spec.identity_mode {
            IdentityMode::Inherited => self.backend.launch_inherited(spec),
            IdentityMode::Elevated => self.backend.launch_elevated(spec).map_err(|err| {
                tracing::warn!("elevated launch failed: {err}");
                match err {
                    LaunchError::ElevationDeclined { .. } => err,
                    _ => LaunchError::ElevationDeclined {
                        path: spec.executable_path.clone(),
                    },
                }
            }),
            IdentityMode::InteractiveUser => self.launch_interactive(spec),
        }
    }

    /// Identity delegation, then the desktop shell, then a plain launch.
    fn launch_interactive(&self, spec: &LaunchSpec) -> Result<()> {
        let mut attempts = Vec::new();

        match self.backend.launch_as_current_user(spec) {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!("interactive-user launch failed, trying desktop shell: {err}");
                attempts.push(format!("interactive user: {err}"));
            }
        }

        match self.backend.open_with_shell(spec) {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!("desktop shell launch failed, trying inherited launch: {err}");
                attempts.push(format!("desktop shell: {err}"));
            }
        }

        match self.backend.launch_inherited(spec) {
            Ok(()) => Ok(()),
            Err(err) => {
                attempts.push(format!("inherited: {err}"));
                Err(LaunchError::AllFallbacksFailed {
                    path: spec.executable_path.clone(),
                    attempts: attempts.join("; "),
                })
            }
        }
    }
}
