/// Audit logging for privileged operations
///
/// Every change focuswall makes to the system packet filter is recorded as
/// one JSON line: startup, focus transitions that triggered a pass, passes
/// that changed or failed to change rules, shutdown cleanup and manual
/// recovery sweeps.
use crate::core::reconciler::{CleanupReport, ReconcileReport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Types of auditable events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Startup,
    FocusChange,
    Reconcile,
    Shutdown,
    Cleanup,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub event_type: EventType,

    /// Whether the operation succeeded
    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }
}

/// Audit log writer
#[derive(Debug, Clone)]
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Creates an audit log in the per-user state directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push("audit.log");

        Ok(Self { log_path })
    }

    pub fn with_path(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Appends an event to the audit log
    ///
    /// Events are written as JSON-lines format (one JSON object per line)
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub async fn log(&self, event: AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(&event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Like [`AuditLog::log`], but a write failure only produces a warning.
    async fn record(
        &self,
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) {
        let event = AuditEvent::new(event_type, success, details, error);
        if let Err(e) = self.log(event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }

    /// Reads the most recent events from the log, newest first
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .take(count)
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        Ok(events)
    }

    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }

    /// Logs startup: whether stale rules were swept and allowances installed
    pub async fn log_startup(&self, dry_run: bool, swept: usize, allowance_failures: usize) {
        self.record(
            EventType::Startup,
            allowance_failures == 0,
            serde_json::json!({
                "dry_run": dry_run,
                "swept": swept,
                "allowance_failures": allowance_failures,
            }),
            None,
        )
        .await;
    }

    pub async fn log_focus_change(&self, pid: u32, name: &str) {
        self.record(
            EventType::FocusChange,
            true,
            serde_json::json!({ "pid": pid, "name": name }),
            None,
        )
        .await;
    }

    /// Logs a reconciliation pass
    ///
    /// Passes that changed nothing are not recorded.
    pub async fn log_reconcile(&self, report: &ReconcileReport) {
        if report.is_noop() {
            return;
        }
        let error = report
            .failures
            .first()
            .map(|f| format!("{}: {}", f.rule, f.error));
        self.record(
            EventType::Reconcile,
            report.failures.is_empty(),
            serde_json::json!({
                "focused_pid": report.focused_pid,
                "revoked": report.revoked,
                "blocked": report.blocked,
                "failed": report.failures.len(),
                "unresolved": report.unresolved,
            }),
            error,
        )
        .await;
    }

    pub async fn log_shutdown(&self, report: &CleanupReport, swept: usize) {
        self.record(
            EventType::Shutdown,
            report.failures.is_empty(),
            serde_json::json!({
                "revoked": report.revoked,
                "failed": report.failures.len(),
                "swept": swept,
            }),
            report.failures.first().map(|f| f.error.clone()),
        )
        .await;
    }

    pub async fn log_cleanup(&self, removed: usize, error: Option<String>) {
        self.record(
            EventType::Cleanup,
            error.is_none(),
            serde_json::json!({ "removed": removed }),
            error,
        )
        .await;
    }
}
