use std::thread;
use std::time::{Duration, Instant};

use sysinfo::System;

/// Interval between checks while waiting for processes to exit.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Lookup and termination of running processes by image name.
pub trait ProcessControl {
    fn is_running(&self, image_name: &str) -> bool;

    /// Asks every matching process to terminate. Returns how many were
    /// signalled.
    fn terminate(&self, image_name: &str) -> usize;

    /// Polls until no matching process remains or `timeout` elapses.
    /// Returns whether the processes are gone.
    fn wait_for_exit(&self, image_name: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running(image_name) {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(image_name, ?timeout, "process still running after wait");
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// [`ProcessControl`] over the host process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl ProcessControl for SystemProcesses {
    fn is_running(&self, image_name: &str) -> bool {
        !find_process_ids(image_name).is_empty()
    }

    fn terminate(&self, image_name: &str) -> usize {
        let mut system = System::new();
        system.refresh_processes();
        let own_pid = std::process::id();

        let mut signalled = 0;
        for (pid, process) in system.processes() {
            if pid.as_u32() == own_pid || !image_matches(process.name(), image_name) {
                continue;
            }
            if process.kill() {
                tracing::info!(pid = pid.as_u32(), image_name, "terminated process");
                signalled += 1;
            } else {
                tracing::warn!(pid = pid.as_u32(), image_name, "failed to terminate process");
            }
        }
        signalled
    }
}

/// Ids of running processes whose image name matches `image_name`, excluding
/// the current process.
pub fn find_process_ids(image_name: &str) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes();
    let own_pid = std::process::id();

    let mut ids: Vec<u32> = system
        .processes()
        .iter()
        .filter(|(_, process)| image_matches(process.name(), image_name))
        .map(|(pid, _)| pid.as_u32())
        .filter(|pid| *pid != own_pid)
        .collect();
    ids.sort_unstable();
    ids
}

/// Case-insensitive match that tolerates a missing `.exe` suffix on either
/// side.
pub fn image_matches(process_name: &str, image_name: &str) -> bool {
    let strip = |name: &str| -> String {
        let lower = name.trim().to_ascii_lowercase();
        match lower.strip_suffix(".exe") {
            Some(stem) => stem.to_string(),
            None => lower,
        }
    };
    !image_name.trim().is_empty() && strip(process_name) == strip(image_name)
}
