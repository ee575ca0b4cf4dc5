mod backend;
mod error;
mod launcher;
mod portable;
mod processes;
mod spec;
#[cfg(windows)]
mod win32;

pub use backend::LaunchBackend;
pub use error::{LaunchError, Result};
pub use launcher::Launcher;
pub use portable::PortableBackend;
pub use processes::{
    find_process_ids, image_matches, ProcessControl, SystemProcesses, POLL_INTERVAL,
};
pub use spec::{quote_argument, IdentityMode, LaunchSpec};
#[cfg(windows)]
pub use win32::WindowsBackend;

/// Backend for the current host, borrowing the identity of
/// `reference_process` for interactive-user launches where supported.
pub fn host_backend(reference_process: &str) -> Box<dyn LaunchBackend + Send + Sync> {
    #[cfg(windows)]
    {
        Box::new(WindowsBackend::new(reference_process))
    }
    #[cfg(not(windows))]
    {
        let _ = reference_process;
        Box::new(PortableBackend)
    }
}
