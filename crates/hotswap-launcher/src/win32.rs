#![allow(unsafe_code)]

use std::ffi::c_void;
use std::io;
use std::mem::size_of;
use std::os::windows::ffi::OsStrExt;
use std::process::Command;

use windows::core::{w, HSTRING, PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, ERROR_CANCELLED, HANDLE};
use windows::Win32::Security::{
    DuplicateTokenEx, SecurityImpersonation, TokenPrimary, TOKEN_ACCESS_MASK,
    TOKEN_ADJUST_DEFAULT, TOKEN_ADJUST_SESSIONID, TOKEN_ASSIGN_PRIMARY, TOKEN_DUPLICATE,
    TOKEN_QUERY,
};
use windows::Win32::System::Environment::{CreateEnvironmentBlock, DestroyEnvironmentBlock};
use windows::Win32::System::Threading::{
    CreateProcessAsUserW, OpenProcess, OpenProcessToken, CREATE_UNICODE_ENVIRONMENT,
    PROCESS_INFORMATION, PROCESS_QUERY_INFORMATION, STARTUPINFOW,
};
use windows::Win32::UI::Shell::{ShellExecuteExW, SEE_MASK_NOCLOSEPROCESS, SHELLEXECUTEINFOW};
use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

use crate::backend::LaunchBackend;
use crate::error::{LaunchError, Result};
use crate::portable::spawn_detached;
use crate::processes::find_process_ids;
use crate::spec::{quote_argument, LaunchSpec};

/// Launch backend using the Win32 shell and token APIs.
#[derive(Debug, Clone)]
pub struct WindowsBackend {
    /// Image name of a process that runs in the interactive user's session.
    reference_process: String,
}

impl WindowsBackend {
    pub fn new(reference_process: impl Into<String>) -> Self {
        Self {
            reference_process: reference_process.into(),
        }
    }
}

impl Default for WindowsBackend {
    fn default() -> Self {
        Self::new("explorer.exe")
    }
}

struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

fn spawn_error(spec: &LaunchSpec, err: windows::core::Error) -> LaunchError {
    LaunchError::Spawn {
        path: spec.executable_path.clone(),
        source: io::Error::other(err.message()),
    }
}

fn wide(text: &str) -> Vec<u16> {
    std::ffi::OsStr::new(text)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

impl LaunchBackend for WindowsBackend {
    fn launch_as_current_user(&self, spec: &LaunchSpec) -> Result<()> {
        let pid = find_process_ids(&self.reference_process)
            .into_iter()
            .next()
            .ok_or_else(|| LaunchError::Spawn {
                path: spec.executable_path.clone(),
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} is not running", self.reference_process),
                ),
            })?;

        unsafe {
            let process = OwnedHandle(
                OpenProcess(PROCESS_QUERY_INFORMATION, false, pid)
                    .map_err(|err| spawn_error(spec, err))?,
            );

            let mut shell_token = HANDLE::default();
            OpenProcessToken(process.0, TOKEN_DUPLICATE, &mut shell_token)
                .map_err(|err| spawn_error(spec, err))?;
            let shell_token = OwnedHandle(shell_token);

            let access = TOKEN_ACCESS_MASK(
                TOKEN_QUERY.0
                    | TOKEN_ASSIGN_PRIMARY.0
                    | TOKEN_DUPLICATE.0
                    | TOKEN_ADJUST_DEFAULT.0
                    | TOKEN_ADJUST_SESSIONID.0,
            );
            let mut primary = HANDLE::default();
            DuplicateTokenEx(
                shell_token.0,
                access,
                None,
                SecurityImpersonation,
                TokenPrimary,
                &mut primary,
            )
            .map_err(|err| spawn_error(spec, err))?;
            let primary = OwnedHandle(primary);

            let mut environment: *mut c_void = std::ptr::null_mut();
            CreateEnvironmentBlock(&mut environment, Some(primary.0), false)
                .map_err(|err| spawn_error(spec, err))?;

            let application = HSTRING::from(spec.executable_path.as_os_str());
            let mut command_line = wide(&format!(
                "{} {}",
                quote_argument(&spec.executable_path.to_string_lossy()),
                spec.command_line_tail()
            ));
            let mut desktop = wide("winsta0\\default");
            let working_dir = spec
                .effective_working_dir()
                .map(|dir| HSTRING::from(dir.as_os_str()));

            let startup = STARTUPINFOW {
                cb: size_of::<STARTUPINFOW>() as u32,
                lpDesktop: PWSTR(desktop.as_mut_ptr()),
                ..Default::default()
            };
            let mut info = PROCESS_INFORMATION::default();

            let created = CreateProcessAsUserW(
                Some(primary.0),
                PCWSTR(application.as_ptr()),
                Some(PWSTR(command_line.as_mut_ptr())),
                None,
                None,
                false,
                CREATE_UNICODE_ENVIRONMENT,
                Some(environment as *const c_void),
                working_dir
                    .as_ref()
                    .map(|dir| PCWSTR(dir.as_ptr()))
                    .unwrap_or(PCWSTR::null()),
                &startup,
                &mut info,
            );
            let _ = DestroyEnvironmentBlock(environment);
            created.map_err(|err| spawn_error(spec, err))?;

            let _ = CloseHandle(info.hThread);
            let _ = CloseHandle(info.hProcess);
            tracing::debug!(pid = info.dwProcessId, "started process with shell token");
        }
        Ok(())
    }

    fn launch_elevated(&self, spec: &LaunchSpec) -> Result<()> {
        let file = HSTRING::from(spec.executable_path.as_os_str());
        let parameters = HSTRING::from(spec.command_line_tail());
        let directory = spec
            .effective_working_dir()
            .map(|dir| HSTRING::from(dir.as_os_str()));

        let mut info = SHELLEXECUTEINFOW {
            cbSize: size_of::<SHELLEXECUTEINFOW>() as u32,
            fMask: SEE_MASK_NOCLOSEPROCESS,
            lpVerb: w!("runas"),
            lpFile: PCWSTR(file.as_ptr()),
            lpParameters: PCWSTR(parameters.as_ptr()),
            lpDirectory: directory
                .as_ref()
                .map(|dir| PCWSTR(dir.as_ptr()))
                .unwrap_or(PCWSTR::null()),
            nShow: SW_SHOWNORMAL.0,
            ..Default::default()
        };

        match unsafe { ShellExecuteExW(&mut info) } {
            Ok(()) => {
                let _ = OwnedHandle(info.hProcess);
                Ok(())
            }
            Err(err) if err.code() == ERROR_CANCELLED.to_hresult() => {
                Err(LaunchError::ElevationDeclined {
                    path: spec.executable_path.clone(),
                })
            }
            Err(err) => Err(spawn_error(spec, err)),
        }
    }

    fn launch_inherited(&self, spec: &LaunchSpec) -> Result<()> {
        spawn_detached(spec)
    }

    fn open_with_shell(&self, spec: &LaunchSpec) -> Result<()> {
        let mut command = Command::new("explorer.exe");
        command.arg(&spec.executable_path);
        if let Some(dir) = spec.effective_working_dir() {
            command.current_dir(dir);
        }
        command
            .spawn()
            .map(|_| ())
            .map_err(|source| LaunchError::Spawn {
                path: spec.executable_path.clone(),
                source,
            })
    }
}
