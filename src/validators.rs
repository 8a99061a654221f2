//! Input validation and sanitization functions for focuswall
//!
//! Everything that ends up on the filter tool's command line passes through
//! here first: executable names become part of rule identifiers and program
//! paths become `program=` arguments.

/// Maximum length of the executable-name component of a rule identifier.
pub const MAX_NAME_COMPONENT: usize = 48;

/// Sanitizes an executable name for use inside a rule identifier.
///
/// Keeps ASCII alphanumerics and `-` `_` `.`, drops everything else and
/// limits the result to [`MAX_NAME_COMPONENT`] characters. Empty results
/// become `unknown` so identifiers never have an empty component.
///
/// SECURITY: Uses `is_ascii_alphanumeric()` to prevent Unicode-based bypasses
/// and keeps quotes, spaces and `=` out of `name=` arguments.
///
/// # Examples
///
/// ```
/// use focuswall::validators::sanitize_rule_component;
///
/// assert_eq!(sanitize_rule_component("chrome.exe"), "chrome.exe");
/// assert_eq!(sanitize_rule_component("My \"App\".exe"), "MyApp.exe");
/// assert_eq!(sanitize_rule_component("\u{202e}"), "unknown");
/// ```
pub fn sanitize_rule_component(input: &str) -> String {
    let sanitized: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .take(MAX_NAME_COMPONENT)
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// Validates a program path before it is passed as a `program=` argument.
///
/// # Errors
///
/// Returns `Err` if:
/// - The path is empty
/// - The path contains control characters or double quotes
/// - The path is not absolute
pub fn validate_program_path(path: &std::path::Path) -> Result<(), String> {
    let Some(text) = path.to_str() else {
        return Err("Path is not valid UTF-8".to_string());
    };

    if text.trim().is_empty() {
        return Err("Path is empty".to_string());
    }

    if text.chars().any(|c| c.is_control() || c == '"') {
        return Err("Path contains control characters or quotes".to_string());
    }

    if !is_absolute(text) {
        return Err(format!("Path is not absolute: {text}"));
    }

    Ok(())
}

/// Accepts both Windows (`C:\...`, `\\server\...`) and Unix absolute paths,
/// independent of the host the check runs on.
fn is_absolute(text: &str) -> bool {
    let bytes = text.as_bytes();
    let drive_path = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/');

    drive_path || text.starts_with("\\\\") || text.starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_sanitize_keeps_plain_names() {
        assert_eq!(sanitize_rule_component("firefox.exe"), "firefox.exe");
        assert_eq!(sanitize_rule_component("code-insiders"), "code-insiders");
    }

    #[test]
    fn test_sanitize_strips_dangerous_chars() {
        assert_eq!(sanitize_rule_component("a b\"c=d;e"), "abcde");
    }

    #[test]
    fn test_sanitize_empty_becomes_unknown() {
        assert_eq!(sanitize_rule_component(""), "unknown");
        assert_eq!(sanitize_rule_component("\"\"\""), "unknown");
    }

    #[test]
    fn test_validate_windows_path() {
        assert!(validate_program_path(Path::new(r"C:\Program Files\App\app.exe")).is_ok());
        assert!(validate_program_path(Path::new(r"\\server\share\tool.exe")).is_ok());
    }

    #[test]
    fn test_validate_unix_path() {
        assert!(validate_program_path(Path::new("/usr/bin/curl")).is_ok());
    }

    #[test]
    fn test_validate_rejects_relative_and_empty() {
        assert!(validate_program_path(Path::new("app.exe")).is_err());
        assert!(validate_program_path(Path::new("")).is_err());
        assert!(validate_program_path(Path::new("   ")).is_err());
    }

    #[test]
    fn test_validate_rejects_quotes() {
        assert!(validate_program_path(Path::new("C:\\evil\" action=allow \"x.exe")).is_err());
        assert!(validate_program_path(Path::new("/tmp/a\nb")).is_err());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_sanitize_never_exceeds_limit(input in "\\PC*") {
            let sanitized = sanitize_rule_component(&input);
            prop_assert!(sanitized.len() <= MAX_NAME_COMPONENT);
        }

        #[test]
        fn test_sanitize_never_empty(input in "\\PC*") {
            prop_assert!(!sanitize_rule_component(&input).is_empty());
        }

        #[test]
        fn test_sanitize_no_argument_breakers(input in "\\PC*") {
            let sanitized = sanitize_rule_component(&input);
            prop_assert!(!sanitized.contains('"'));
            prop_assert!(!sanitized.contains(' '));
            prop_assert!(!sanitized.contains('='));
            prop_assert!(sanitized.is_ascii());
        }

        #[test]
        fn test_sanitize_is_deterministic(input in "\\PC*") {
            prop_assert_eq!(sanitize_rule_component(&input), sanitize_rule_component(&input));
        }
    }
}
