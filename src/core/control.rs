//! Focus control loop
//!
//! [`FocusLoop`] samples the focus observer at a fixed cadence and runs a
//! reconciliation pass whenever the focused pid changes. Passes run to
//! completion; shutdown is only honoured between them.
//!
//! ```text
//!   Idle ──(focus pid changed)──▶ Transitioning ──(pass done / exempt)──▶ Idle
//!                                       │
//!                                       └──(enumeration failed)──▶ Idle, focus not recorded
//! ```
//!
//! Until the first focus is observed nothing is blocked.

use crate::audit::AuditLog;
use crate::config::AppConfig;
use crate::core::filter::FilterController;
use crate::core::focus::FocusObserver;
use crate::core::process::ProcessDirectory;
use crate::core::reconciler::{CleanupReport, ReconcileReport, Reconciler, RuleFailure};
use crate::core::rules::{BLOCK_RULE_PREFIX, FilterRule, minimal_service_allowances};
use crate::shutdown::ShutdownListener;
use crate::utils::truncate_string;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Name shown for a focused pid whose identity cannot be resolved.
pub const UNKNOWN_PROCESS: &str = "Unknown";

const FOCUS_NAME_DISPLAY_LEN: usize = 64;

/// Timing and startup behaviour of the loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub poll_interval: Duration,
    pub refresh_interval: Option<Duration>,
    pub minimal_allowances: bool,
    pub sweep_on_startup: bool,
    /// Recorded in the audit log; the filter backend decides what actually happens
    pub dry_run: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            refresh_interval: config.refresh_interval(),
            minimal_allowances: config.minimal_allowances,
            sweep_on_startup: config.sweep_on_startup,
            dry_run: false,
        }
    }
}

/// What a single poll did.
#[derive(Debug)]
pub enum PollOutcome {
    /// Focus unchanged and no refresh due
    Idle,
    /// Observer had no actionable signal
    NoFocus,
    /// Focus moved to a new pid and was recorded
    Transitioned {
        pid: u32,
        name: String,
        /// `None` when the new focus is exempt and no pass ran
        report: Option<ReconcileReport>,
    },
    /// Periodic re-reconciliation of the current target
    Refreshed(ReconcileReport),
    /// The pass could not take a process snapshot; retried next poll
    Deferred { pid: u32 },
}

#[derive(Debug, Default, Clone)]
pub struct StartupReport {
    /// Stale block rules removed by the recovery sweep
    pub swept: usize,
    pub allowances_installed: usize,
    pub allowance_failures: Vec<RuleFailure>,
}

#[derive(Debug, Default, Clone)]
pub struct ShutdownReport {
    /// Ledger and allowance revokes
    pub cleanup: CleanupReport,
    /// Block rules found by the final prefix sweep
    pub swept: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.cleanup.failures.is_empty()
    }
}

/// The focus-tracking state machine.
pub struct FocusLoop<O, D, F> {
    observer: O,
    directory: D,
    reconciler: Reconciler<F>,
    settings: LoopSettings,
    /// Last focused pid that was fully handled
    focus_state: Option<u32>,
    /// Last non-exempt focus a pass ran for
    target: Option<u32>,
    last_pass: Option<Instant>,
    /// Last focus printed as a `[FOCUS]` line
    announced: Option<u32>,
    /// Allowance rules installed at startup, revoked at shutdown
    allowances: Vec<FilterRule>,
    audit: Option<AuditLog>,
}

impl<O, D, F> FocusLoop<O, D, F>
where
    O: FocusObserver,
    D: ProcessDirectory,
    F: FilterController,
{
    pub fn new(observer: O, directory: D, reconciler: Reconciler<F>, settings: LoopSettings) -> Self {
        Self {
            observer,
            directory,
            reconciler,
            settings,
            focus_state: None,
            target: None,
            last_pass: None,
            announced: None,
            allowances: Vec::new(),
            audit: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn focus_state(&self) -> Option<u32> {
        self.focus_state
    }

    /// Focus named by the most recent `[FOCUS]` line.
    pub fn announced(&self) -> Option<u32> {
        self.announced
    }

    pub fn reconciler(&self) -> &Reconciler<F> {
        &self.reconciler
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Optionally sweeps rules left by a previous run, then installs the
    /// minimal allowances. Failures are logged and never abort startup.
    pub async fn startup(&mut self) -> StartupReport {
        let mut report = StartupReport::default();
        let filter = self.reconciler.filter();

        if self.settings.sweep_on_startup {
            match filter.revoke_all_with_prefix(BLOCK_RULE_PREFIX).await {
                Ok(0) => {}
                Ok(n) => {
                    info!("Removed {n} stale block rule(s) from a previous run");
                    report.swept = n;
                }
                Err(e) => warn!("Recovery sweep failed: {e}"),
            }
        }

        if self.settings.minimal_allowances {
            for rule in minimal_service_allowances() {
                match filter.install(&rule).await {
                    Ok(()) => {
                        debug!("Installed allowance {}", rule.name);
                        self.allowances.push(rule);
                    }
                    Err(e) => {
                        warn!("Could not install allowance {}: {e}", rule.name);
                        report.allowance_failures.push(RuleFailure {
                            rule: rule.name,
                            error: e.to_string(),
                        });
                    }
                }
            }
            report.allowances_installed = self.allowances.len();
        }

        if let Some(audit) = &self.audit {
            audit
                .log_startup(self.settings.dry_run, report.swept, report.allowance_failures.len())
                .await;
        }

        report
    }

    /// Samples focus once and acts on it.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let observed = self.observer.current_focus_pid();

        match observed {
            Some(pid) if self.focus_state != Some(pid) => self.transition(pid).await,
            _ if self.refresh_due() => self.refresh().await,
            None => PollOutcome::NoFocus,
            Some(_) => PollOutcome::Idle,
        }
    }

    async fn transition(&mut self, pid: u32) -> PollOutcome {
        let name = self
            .directory
            .identify(pid)
            .map(|p| p.name)
            .unwrap_or_else(|| UNKNOWN_PROCESS.to_string());

        if self.reconciler.policy().is_exempt(&name, pid) {
            debug!("Focused process {name} ({pid}) is exempt, rules unchanged");
            self.focus_state = Some(pid);
            self.announce(pid, &name);
            return PollOutcome::Transitioned {
                pid,
                name,
                report: None,
            };
        }

        match self.reconciler.reconcile(&mut self.directory, pid).await {
            Ok(report) => {
                self.focus_state = Some(pid);
                self.target = Some(pid);
                self.last_pass = Some(Instant::now());
                self.announce(pid, &name);
                if let Some(audit) = &self.audit {
                    audit.log_focus_change(pid, &name).await;
                    audit.log_reconcile(&report).await;
                }
                PollOutcome::Transitioned {
                    pid,
                    name,
                    report: Some(report),
                }
            }
            Err(e) => {
                warn!("Skipping pass for {name} ({pid}): {e}");
                PollOutcome::Deferred { pid }
            }
        }
    }

    /// Prints the `[FOCUS]` line once a transition has been recorded.
    fn announce(&mut self, pid: u32, name: &str) {
        println!("[FOCUS] {} ({pid})", truncate_string(name, FOCUS_NAME_DISPLAY_LEN));
        self.announced = Some(pid);
    }

    fn refresh_due(&self) -> bool {
        match (self.target, self.settings.refresh_interval, self.last_pass) {
            (Some(_), Some(interval), Some(last)) => last.elapsed() >= interval,
            _ => false,
        }
    }

    async fn refresh(&mut self) -> PollOutcome {
        let Some(pid) = self.target else {
            return PollOutcome::Idle;
        };
        self.last_pass = Some(Instant::now());

        match self.reconciler.reconcile(&mut self.directory, pid).await {
            Ok(report) => {
                if let Some(audit) = &self.audit {
                    audit.log_reconcile(&report).await;
                }
                PollOutcome::Refreshed(report)
            }
            Err(e) => {
                debug!("Refresh skipped: {e}");
                PollOutcome::Deferred { pid }
            }
        }
    }

    /// Polls until `listener` fires.
    ///
    /// The flag is checked before every poll, and the inter-poll sleep ends
    /// early when shutdown is requested.
    pub async fn run(&mut self, mut listener: ShutdownListener) {
        loop {
            if listener.is_triggered() {
                break;
            }

            self.poll_once().await;

            tokio::select! {
                () = tokio::time::sleep(self.settings.poll_interval) => {}
                () = listener.triggered() => break,
            }
        }
        info!("Shutdown requested, leaving control loop");
    }

    /// Revokes every ledger rule and every installed allowance, then sweeps
    /// any block rule the ledger lost track of.
    ///
    /// Safe to call when [`FocusLoop::startup`] never ran.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let mut cleanup = self.reconciler.release_all().await;
        let filter = self.reconciler.filter();

        for rule in std::mem::take(&mut self.allowances) {
            match filter.revoke(&rule.name).await {
                Ok(()) => cleanup.revoked += 1,
                Err(e) => {
                    warn!("Cleanup could not revoke allowance {}: {e}", rule.name);
                    cleanup.failures.push(RuleFailure {
                        rule: rule.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        let swept = match filter.revoke_all_with_prefix(BLOCK_RULE_PREFIX).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Final sweep failed: {e}");
                cleanup.failures.push(RuleFailure {
                    rule: format!("{BLOCK_RULE_PREFIX}*"),
                    error: e.to_string(),
                });
                0
            }
        };

        self.focus_state = None;
        self.target = None;

        if let Some(audit) = &self.audit {
            audit.log_shutdown(&cleanup, swept).await;
        }

        ShutdownReport { cleanup, swept }
    }
}
