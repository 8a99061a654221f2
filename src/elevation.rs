//! Privilege checks and filter tool resolution
//!
//! focuswall modifies the system firewall, so the whole process must run
//! elevated. Unlike a tool that elevates single commands, it checks once at
//! startup and refuses to enter the control loop without privileges.
//!
//! # Environment Variables
//!
//! - `FOCUSWALL_FILTER_COMMAND`: Use this program instead of `netsh`.
//!   The integration tests point it at a mock script.
//!
//! - `FOCUSWALL_TEST_NO_ELEVATION`: Bypass the privilege check (for testing only).
//!
//! # Security
//!
//! - Filter commands are constructed without shell interpolation
//! - Program paths and rule names are validated before they reach the command line
//! - The filter binary is checked for availability before the loop starts

use std::path::PathBuf;

/// Default filter program.
pub const DEFAULT_FILTER_PROGRAM: &str = "netsh";

/// Error type for privilege and tool-availability checks
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// The process is not running with administrative privileges
    #[error("focuswall must run with administrator privileges")]
    NotElevated,

    /// The filter program could not be found
    #[error("Filter program '{0}' is not available (binary not found)")]
    FilterProgramNotFound(String),
}

/// Checks if a binary exists in PATH
///
/// # Arguments
///
/// * `name` - Binary name to search for (e.g., "netsh")
///
/// # Returns
///
/// `true` if the binary is found in PATH, `false` otherwise
fn binary_exists(name: &str) -> bool {
    let candidates: Vec<String> = if cfg!(windows) && !name.to_lowercase().ends_with(".exe") {
        vec![name.to_string(), format!("{name}.exe")]
    } else {
        vec![name.to_string()]
    };

    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                candidates
                    .iter()
                    .map(|c| dir.join(c))
                    .find(|full_path| full_path.is_file())
            })
        })
        .is_some()
}

/// Returns the filter program to invoke, honouring `FOCUSWALL_FILTER_COMMAND`.
pub fn filter_program() -> String {
    std::env::var("FOCUSWALL_FILTER_COMMAND")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER_PROGRAM.to_string())
}

/// Verifies that `program` can be executed.
///
/// # Errors
///
/// Returns [`ElevationError::FilterProgramNotFound`] if the program is
/// neither an existing file nor found in PATH.
pub fn ensure_filter_program(program: &str) -> Result<(), ElevationError> {
    if PathBuf::from(program).is_file() || binary_exists(program) {
        Ok(())
    } else {
        Err(ElevationError::FilterProgramNotFound(program.to_string()))
    }
}

/// Returns `true` if the current process has administrative privileges.
pub fn is_elevated() -> bool {
    if std::env::var("FOCUSWALL_TEST_NO_ELEVATION").is_ok() {
        return true;
    }
    platform_is_elevated()
}

#[cfg(unix)]
fn platform_is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}

// `net session` only succeeds from an elevated token.
#[cfg(windows)]
fn platform_is_elevated() -> bool {
    std::process::Command::new("net")
        .arg("session")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
fn platform_is_elevated() -> bool {
    false
}

/// Fails unless the process is elevated.
///
/// # Errors
///
/// Returns [`ElevationError::NotElevated`] when privileges are missing.
pub fn require_elevation() -> Result<(), ElevationError> {
    if is_elevated() {
        Ok(())
    } else {
        Err(ElevationError::NotElevated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::ENV_VAR_MUTEX;

    #[cfg(unix)]
    #[test]
    fn test_binary_exists() {
        // sh should exist on all Unix systems
        assert!(binary_exists("sh"));
        // This should not exist
        assert!(!binary_exists("focuswall_nonexistent_binary_xyz"));
    }

    #[test]
    fn test_filter_program_override() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();

        unsafe {
            std::env::set_var("FOCUSWALL_FILTER_COMMAND", "/opt/mock/netsh");
        }
        let program = filter_program();
        unsafe {
            std::env::remove_var("FOCUSWALL_FILTER_COMMAND");
        }

        assert_eq!(program, "/opt/mock/netsh");
        assert_eq!(filter_program(), DEFAULT_FILTER_PROGRAM);
    }

    #[test]
    fn test_blank_override_ignored() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();

        unsafe {
            std::env::set_var("FOCUSWALL_FILTER_COMMAND", "   ");
        }
        let program = filter_program();
        unsafe {
            std::env::remove_var("FOCUSWALL_FILTER_COMMAND");
        }

        assert_eq!(program, DEFAULT_FILTER_PROGRAM);
    }

    #[test]
    fn test_missing_filter_program() {
        let result = ensure_filter_program("focuswall_nonexistent_binary_xyz");
        assert!(matches!(
            result,
            Err(ElevationError::FilterProgramNotFound(_))
        ));
    }

    #[test]
    fn test_elevation_bypass() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();

        unsafe {
            std::env::set_var("FOCUSWALL_TEST_NO_ELEVATION", "1");
        }
        let elevated = is_elevated();
        let required = require_elevation();
        unsafe {
            std::env::remove_var("FOCUSWALL_TEST_NO_ELEVATION");
        }

        assert!(elevated);
        assert!(required.is_ok());
    }
}
