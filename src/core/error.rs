use thiserror::Error;

/// Core error types for focuswall
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The process snapshot could not be taken; the caller skips this cycle
    #[error("Process enumeration failed: {0}")]
    Enumeration(String),

    /// The external filter tool rejected a command or could not be run
    #[error("Filter error: {message}")]
    Filter {
        message: String,
        /// Suggestions from [`FilterErrorPattern`], shown under the error
        hints: Vec<String>,
        exit_code: Option<i32>,
    },
}

impl Error {
    /// Builds a filter error from a failed tool invocation.
    pub fn filter(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        let message = message.into();
        let translation = FilterErrorPattern::match_error(&message);
        Self::translated_filter(message, exit_code, translation)
    }

    /// Builds a filter error whose output was already translated.
    pub fn translated_filter(
        message: String,
        exit_code: Option<i32>,
        translation: ErrorTranslation,
    ) -> Self {
        Error::Filter {
            message,
            hints: translation.suggestions,
            exit_code,
        }
    }

    /// Remediation hints attached to the error, if any.
    pub fn hints(&self) -> &[String] {
        match self {
            Error::Filter { hints, .. } => hints,
            _ => &[],
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Database of filter tool error patterns and their translations
pub struct FilterErrorPattern;

impl FilterErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        // Missing privileges
        if lower.contains("requires elevation")
            || lower.contains("access is denied")
            || lower.contains("permission denied")
            || lower.contains("operation not permitted")
        {
            return ErrorTranslation::new("Insufficient privileges to modify firewall rules")
                .with_suggestion("Run focuswall from an elevated (Administrator) terminal")
                .with_suggestion("Or use --dry-run to observe focus changes without touching the firewall");
        }

        // Absent rule
        if lower.contains("no rules match") {
            return ErrorTranslation::new("The firewall rule does not exist")
                .with_suggestion("Nothing to remove - the rule was already deleted");
        }

        // Missing tool
        if lower.contains("is not recognized")
            || lower.contains("no such file")
            || lower.contains("command not found")
        {
            return ErrorTranslation::new("The firewall command-line tool was not found")
                .with_suggestion("Ensure netsh is available in PATH")
                .with_suggestion("Set FOCUSWALL_FILTER_COMMAND to the full path of the tool");
        }

        // Firewall service down
        if lower.contains("service") && (lower.contains("not running") || lower.contains("stopped"))
        {
            return ErrorTranslation::new("The firewall service is not running")
                .with_suggestion("Start the firewall service: net start mpssvc")
                .with_suggestion("Check that no policy disables Windows Defender Firewall");
        }

        // Bad arguments
        if lower.contains("the following command was not found")
            || lower.contains("invalid")
            || lower.contains("usage:")
        {
            return ErrorTranslation::new("The firewall tool rejected the rule arguments")
                .with_suggestion("Check that the program path exists and contains no quotes")
                .with_suggestion("Run with --verbose to see the full command");
        }

        // Generic fallback
        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify the firewall is reachable: netsh advfirewall show currentprofile")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_required() {
        let translation = FilterErrorPattern::match_error(
            "The requested operation requires elevation (Run as administrator).",
        );
        assert!(translation.user_message.contains("privileges"));
        assert!(
            translation
                .suggestions
                .iter()
                .any(|s| s.contains("--dry-run"))
        );
    }

    #[test]
    fn test_absent_rule() {
        let translation =
            FilterErrorPattern::match_error("No rules match the specified criteria.");
        assert!(translation.user_message.contains("does not exist"));
    }

    #[test]
    fn test_missing_tool() {
        let translation = FilterErrorPattern::match_error(
            "'netsh' is not recognized as an internal or external command",
        );
        assert!(translation.user_message.contains("not found"));
        assert!(
            translation
                .suggestions
                .iter()
                .any(|s| s.contains("FOCUSWALL_FILTER_COMMAND"))
        );
    }

    #[test]
    fn test_service_stopped() {
        let translation =
            FilterErrorPattern::match_error("The Windows Firewall service is not running.");
        assert!(translation.user_message.contains("service"));
    }

    #[test]
    fn test_generic_fallback_keeps_message() {
        let translation = FilterErrorPattern::match_error("something odd happened");
        assert!(translation.user_message.contains("something odd happened"));
        assert_eq!(translation.suggestions.len(), 2);
    }

    #[test]
    fn test_filter_constructor() {
        let err = Error::filter("boom", Some(1));
        assert!(matches!(
            err,
            Error::Filter {
                exit_code: Some(1),
                ..
            }
        ));
        assert_eq!(err.to_string(), "Filter error: boom");
    }

    #[test]
    fn test_filter_error_carries_hints() {
        let err = Error::filter("Access is denied.", Some(1));
        assert!(err.hints().iter().any(|h| h.contains("elevated")));

        let err = Error::Enumeration("snapshot failed".to_string());
        assert!(err.hints().is_empty());
    }
}
