use crate::error::Result;
use crate::spec::LaunchSpec;

/// Platform capabilities for starting a detached process. None of the
/// operations wait for the child to exit.
pub trait LaunchBackend {
    /// Starts the process as the interactive desktop user.
    fn launch_as_current_user(&self, spec: &LaunchSpec) -> Result<()>;

    fn launch_elevated(&self, spec: &LaunchSpec) -> Result<()>;

    fn launch_inherited(&self, spec: &LaunchSpec) -> Result<()>;

    /// Asks the desktop shell to open the executable.
    fn open_with_shell(&self, spec: &LaunchSpec) -> Result<()>;
}

impl<B: LaunchBackend + ?Sized> LaunchBackend for &B {
    fn launch_as_current_user(&self, spec: &LaunchSpec) -> Result<()> {
        (**self).launch_as_current_user(spec)
    }

    fn launch_elevated(&self, spec: &LaunchSpec) -> Result<()> {
        (**self).launch_elevated(spec)
    }

    fn launch_inherited(&self, spec: &LaunchSpec) -> Result<()> {
        (**self).launch_inherited(spec)
    }

    fn open_with_shell(&self, spec: &LaunchSpec) -> Result<()> {
        (**self).open_with_shell(spec)
    }
}

impl<B: LaunchBackend + ?Sized> LaunchBackend for Box<B> {
    fn launch_as_current_user(&self, spec: &LaunchSpec) -> Result<()> {
        (**self).launch_as_current_user(spec)
    }

    fn launch_elevated(&self, spec: &LaunchSpec) -> Result<()> {
        (**self).launch_elevated(spec)
    }

    fn launch_inherited(&self, spec: &LaunchSpec) -> Result<()> {
        (**self).launch_inherited(spec)
    }

    fn open_with_shell(&self, spec: &LaunchSpec) -> Result<()> {
        (**self).open_with_shell(spec)
    }
}
