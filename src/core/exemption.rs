//! Exemption policy: processes that are never blocked
//!
//! The built-in list covers the processes that own the network stack,
//! authentication and the shell. Blocking any of them would cut the machine
//! off entirely, including the terminal focuswall runs in.

use std::collections::BTreeSet;

/// Executables that must keep network access regardless of focus.
pub const BUILTIN_EXEMPT: &[&str] = &[
    "System",
    "svchost.exe",
    "explorer.exe",
    "dwm.exe",
    "csrss.exe",
    "services.exe",
    "lsass.exe",
    "winlogon.exe",
];

/// Pids at or below this value are kernel pseudo-processes (idle, System).
pub const RESERVED_PID_CEILING: u32 = 4;

/// Case-insensitive allow-list of executable names plus the tool's own pid.
#[derive(Debug, Clone)]
pub struct ExemptionPolicy {
    names: BTreeSet<String>,
    own_pid: u32,
}

impl Default for ExemptionPolicy {
    fn default() -> Self {
        Self::new(std::process::id())
    }
}

impl ExemptionPolicy {
    /// Creates the built-in policy, exempting `own_pid`.
    pub fn new(own_pid: u32) -> Self {
        Self {
            names: BUILTIN_EXEMPT.iter().map(|n| n.to_lowercase()).collect(),
            own_pid,
        }
    }

    /// Adds configured names on top of the built-in list.
    ///
    /// Built-in entries can never be removed this way.
    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.names.extend(
            extra
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty()),
        );
        self
    }

    /// Returns `true` if the process must never be blocked.
    pub fn is_exempt(&self, name: &str, pid: u32) -> bool {
        pid == self.own_pid
            || pid <= RESERVED_PID_CEILING
            || self.names.contains(&name.to_lowercase())
    }

    pub fn own_pid(&self) -> u32 {
        self.own_pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_case_insensitive() {
        let policy = ExemptionPolicy::new(1000);
        assert!(policy.is_exempt("svchost.exe", 500));
        assert!(policy.is_exempt("SVCHOST.EXE", 500));
        assert!(policy.is_exempt("Explorer.EXE", 501));
        assert!(policy.is_exempt("system", 502));
    }

    #[test]
    fn test_regular_process_not_exempt() {
        let policy = ExemptionPolicy::new(1000);
        assert!(!policy.is_exempt("firefox.exe", 1234));
    }

    #[test]
    fn test_own_pid_always_exempt() {
        let policy = ExemptionPolicy::new(4242);
        assert!(policy.is_exempt("focuswall.exe", 4242));
        assert!(policy.is_exempt("anything", 4242));
        assert!(!policy.is_exempt("anything", 4243));
    }

    #[test]
    fn test_reserved_pids_exempt() {
        let policy = ExemptionPolicy::new(1000);
        assert!(policy.is_exempt("Idle", 0));
        assert!(policy.is_exempt("whatever", 4));
        assert!(!policy.is_exempt("whatever", 5));
    }

    #[test]
    fn test_extra_names_extend_builtin() {
        let policy = ExemptionPolicy::new(1000).with_extra(["  OneDrive.exe ", ""]);
        assert!(policy.is_exempt("onedrive.exe", 2000));
        assert!(policy.is_exempt("lsass.exe", 2001));
        assert!(!policy.is_exempt("", 2002));
    }
}
