//! Shared test utilities for core module tests
//!
//! Provides scripted stand-ins for the OS collaborators so the reconciler and
//! the control loop can be tested without touching the real process table,
//! the real window manager or the real firewall.
//! This module is only compiled in test mode.

use crate::core::error::{Error, Result};
use crate::core::focus::FocusObserver;
use crate::core::process::{ProcessDirectory, ProcessIdentity};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

/// Mutex for tests that need exclusive access to environment variables.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("FOCUSWALL_FILTER_COMMAND", "/tmp/mock");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("FOCUSWALL_FILTER_COMMAND");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// Creates a resolvable process under `C:\Apps`.
pub fn process(pid: u32, name: &str) -> ProcessIdentity {
    ProcessIdentity::new(pid, name, Some(PathBuf::from(format!(r"C:\Apps\{name}"))))
}

/// In-memory process table.
#[derive(Debug, Default)]
pub struct FakeDirectory {
    processes: Vec<ProcessIdentity>,
    failing: bool,
}

impl FakeDirectory {
    pub fn new(processes: Vec<ProcessIdentity>) -> Self {
        Self {
            processes,
            failing: false,
        }
    }

    pub fn push(&mut self, process: ProcessIdentity) {
        self.processes.push(process);
    }

    pub fn remove(&mut self, pid: u32) {
        self.processes.retain(|p| p.pid != pid);
    }

    /// Makes `list_processes` fail as if the snapshot could not be taken.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }
}

impl ProcessDirectory for FakeDirectory {
    fn list_processes(&mut self) -> Result<Vec<ProcessIdentity>> {
        if self.failing {
            return Err(Error::Enumeration("snapshot unavailable".to_string()));
        }
        Ok(self.processes.clone())
    }

    fn resolve_path(&mut self, pid: u32) -> Option<PathBuf> {
        self.identify(pid).and_then(|p| p.path)
    }

    fn identify(&mut self, pid: u32) -> Option<ProcessIdentity> {
        self.processes.iter().find(|p| p.pid == pid).cloned()
    }
}

/// Focus observer that replays a script, one entry per poll.
///
/// Once the script runs out the last entry repeats.
#[derive(Debug, Default)]
pub struct ScriptedFocus {
    script: Mutex<VecDeque<Option<u32>>>,
    last: Mutex<Option<u32>>,
}

impl ScriptedFocus {
    pub fn new(script: impl IntoIterator<Item = Option<u32>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl FocusObserver for ScriptedFocus {
    fn current_focus_pid(&self) -> Option<u32> {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        *last
    }
}
