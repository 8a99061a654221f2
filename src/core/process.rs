//! Process enumeration and identity resolution
//!
//! A [`ProcessDirectory`] answers two questions for the reconciler: which
//! processes are running right now, and which executable a pid maps to.
//! Identities are never cached across polls because pids are reused after a
//! process exits.

use crate::core::error::{Error, Result};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// A running process as seen in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: u32,
    /// Executable name, e.g. `firefox.exe`. Not unique across pids.
    pub name: String,
    /// Full executable path; `None` when it could not be resolved
    /// (insufficient privileges, or the process already exited).
    pub path: Option<PathBuf>,
}

impl ProcessIdentity {
    pub fn new(pid: u32, name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            pid,
            name: name.into(),
            path,
        }
    }
}

/// Read-only view of the operating system's process table.
pub trait ProcessDirectory {
    /// Takes a fresh snapshot of all running processes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Enumeration`] if no snapshot could be taken. Callers
    /// treat this as "no change this cycle".
    fn list_processes(&mut self) -> Result<Vec<ProcessIdentity>>;

    /// Resolves the executable path of a pid, `None` if it cannot be read.
    fn resolve_path(&mut self, pid: u32) -> Option<PathBuf>;

    /// Looks up the full identity of a single pid.
    fn identify(&mut self, pid: u32) -> Option<ProcessIdentity>;
}

/// [`ProcessDirectory`] backed by the `sysinfo` crate.
pub struct SysinfoDirectory {
    system: System,
}

impl Default for SysinfoDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoDirectory {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    // Executable paths are refreshed on every snapshot: a reused pid must
    // never inherit the path of the process that previously owned it.
    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::new().with_exe(UpdateKind::Always)
    }

    fn refresh_one(&mut self, pid: u32) -> Option<ProcessIdentity> {
        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            Self::refresh_kind(),
        );
        let process = self
            .system
            .process(sys_pid)
            .filter(|process| process.thread_kind().is_none())?;
        Some(ProcessIdentity::new(
            pid,
            process.name().to_string_lossy(),
            process.exe().map(Path::to_path_buf),
        ))
    }
}

impl ProcessDirectory for SysinfoDirectory {
    fn list_processes(&mut self) -> Result<Vec<ProcessIdentity>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(Error::Enumeration(
                "process enumeration is not supported on this platform".to_string(),
            ));
        }

        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());

        let processes: Vec<ProcessIdentity> = self
            .system
            .processes()
            .iter()
            // Linux lists every thread as its own task
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| {
                ProcessIdentity::new(
                    pid.as_u32(),
                    process.name().to_string_lossy(),
                    process
                        .exe()
                        .filter(|p| !p.as_os_str().is_empty())
                        .map(Path::to_path_buf),
                )
            })
            .collect();

        // Our own process is always running, so an empty table means the
        // snapshot itself failed.
        if processes.is_empty() {
            return Err(Error::Enumeration("empty process snapshot".to_string()));
        }

        Ok(processes)
    }

    fn resolve_path(&mut self, pid: u32) -> Option<PathBuf> {
        self.refresh_one(pid).and_then(|identity| identity.path)
    }

    fn identify(&mut self, pid: u32) -> Option<ProcessIdentity> {
        self.refresh_one(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_contains_self() {
        let mut directory = SysinfoDirectory::new();
        let own_pid = std::process::id();

        let processes = directory.list_processes().unwrap();
        assert!(processes.iter().any(|p| p.pid == own_pid));
    }

    #[test]
    fn test_identify_self() {
        let mut directory = SysinfoDirectory::new();
        let identity = directory.identify(std::process::id()).unwrap();

        assert!(!identity.name.is_empty());
        assert_eq!(directory.resolve_path(std::process::id()), identity.path);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_snapshot_excludes_threads() {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let worker = std::thread::spawn(move || {
            ready_tx.send(()).unwrap();
            done_rx.recv().ok();
        });
        ready_rx.recv().unwrap();

        let own_pid = std::process::id();
        let thread_ids: Vec<u32> = std::fs::read_dir("/proc/self/task")
            .unwrap()
            .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
            .filter(|tid| *tid != own_pid)
            .collect();
        assert!(!thread_ids.is_empty());

        let mut directory = SysinfoDirectory::new();
        let processes = directory.list_processes().unwrap();
        for tid in &thread_ids {
            assert!(processes.iter().all(|p| p.pid != *tid), "thread {tid} listed");
        }

        done_tx.send(()).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_unknown_pid_resolves_to_none() {
        let mut directory = SysinfoDirectory::new();
        // Pids are bounded well below this on every supported platform
        assert!(directory.identify(u32::MAX - 1).is_none());
        assert!(directory.resolve_path(u32::MAX - 1).is_none());
    }
}
