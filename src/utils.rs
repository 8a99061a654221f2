//! Utility functions for directory management
//!
//! # Directory Structure
//!
//! - Data: per-user data directory (`~/.local/share/focuswall/`,
//!   `%APPDATA%\focuswall\focuswall\data`) - configuration file
//! - State: per-user state directory where the platform has one, falling back
//!   to the local data directory - audit log
//!
//! # Example
//!
//! ```
//! use focuswall::utils::{get_data_dir, ensure_dirs};
//!
//! // Ensure directories exist before use
//! ensure_dirs().expect("Failed to create directories");
//!
//! if let Some(data_path) = get_data_dir() {
//!     // Load configuration from data_path
//! }
//! ```

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "focuswall", "focuswall")
}

pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| pd.data_dir().to_path_buf())
}

/// Windows and macOS have no state directory; the local data directory
/// stands in for it there.
pub fn get_state_dir() -> Option<PathBuf> {
    project_dirs().map(|pd| {
        pd.state_dir()
            .unwrap_or_else(|| pd.data_local_dir())
            .to_path_buf()
    })
}

pub fn ensure_dirs() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        let mut builder = DirBuilder::new();
        builder.mode(0o700); // User read/write/execute only
        builder.recursive(true);

        if let Some(dir) = get_data_dir() {
            builder.create(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            builder.create(dir)?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(dir) = get_data_dir() {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            std::fs::create_dir_all(dir)?;
        }
    }

    Ok(())
}

/// Truncates a string to a maximum length and adds an ellipsis if needed
///
/// Used to keep `[FOCUS]` lines readable for long executable names.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        // Find the nearest character boundary to avoid splitting multi-byte characters
        let end = s
            .char_indices()
            .map(|(idx, _)| idx)
            .take_while(|&idx| idx <= max_len.saturating_sub(3))
            .last()
            .unwrap_or(0);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string_unchanged() {
        assert_eq!(truncate_string("app.exe", 20), "app.exe");
    }

    #[test]
    fn test_truncate_long_string() {
        let truncated = truncate_string("a-very-long-executable-name.exe", 12);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 12);
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        let truncated = truncate_string("ééééééééé.exe", 8);
        assert!(truncated.ends_with("..."));
    }
}
