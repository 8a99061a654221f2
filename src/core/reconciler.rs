//! Rule reconciliation
//!
//! The [`Reconciler`] owns the ledger of block rules believed to be
//! installed and converges it, one pass at a time, on
//! "every non-exempt running process except the focused one".
//!
//! # Pass structure
//!
//! 1. Snapshot the process table
//! 2. Build the desired set: skip exempt processes, the focused pid and
//!    processes whose executable path cannot be resolved
//! 3. Diff against the ledger
//! 4. Apply every revoke, then every install
//! 5. Record what actually happened in the ledger
//!
//! Revokes always run first so the newly focused process regains access
//! before any new block lands.
//!
//! # Ledger after partial failure
//!
//! The ledger is best-effort and never retries within a pass:
//! - a failed install is left out of the ledger, so the next pass retries it
//! - a failed revoke stays in the ledger, so the next pass retries it
//!
//! Anything the ledger loses track of is caught by the prefix sweep at
//! shutdown.

use crate::core::error::Result;
use crate::core::exemption::ExemptionPolicy;
use crate::core::filter::FilterController;
use crate::core::process::{ProcessDirectory, ProcessIdentity};
use crate::core::rules::FilterRule;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// One block rule the reconciler believes is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedEntry {
    pub pid: u32,
    pub name: String,
    pub path: PathBuf,
}

/// A filter call that failed during a pass or during cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub rule: String,
    pub error: String,
}

/// The computed difference between the ledger and the desired state.
#[derive(Debug, Default, Clone)]
pub struct ReconcilePlan {
    /// Rule names to revoke, applied first
    pub to_remove: Vec<String>,
    /// Rules to install, applied after all removals
    pub to_add: Vec<(FilterRule, BlockedEntry)>,
    /// Non-exempt processes skipped because their path was unresolvable
    pub unresolved: usize,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone)]
pub struct ReconcileReport {
    pub focused_pid: u32,
    pub revoked: Vec<String>,
    pub blocked: Vec<String>,
    pub failures: Vec<RuleFailure>,
    pub unresolved: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.revoked.is_empty() && self.blocked.is_empty() && self.failures.is_empty()
    }
}

/// Outcome of releasing every ledger rule at shutdown.
#[derive(Debug, Default, Clone)]
pub struct CleanupReport {
    pub revoked: usize,
    pub failures: Vec<RuleFailure>,
}

/// Owner of the block-rule ledger.
pub struct Reconciler<F> {
    filter: F,
    policy: ExemptionPolicy,
    ledger: BTreeMap<String, BlockedEntry>,
}

impl<F: FilterController> Reconciler<F> {
    pub fn new(filter: F, policy: ExemptionPolicy) -> Self {
        Self {
            filter,
            policy,
            ledger: BTreeMap::new(),
        }
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    pub fn policy(&self) -> &ExemptionPolicy {
        &self.policy
    }

    /// Read-only view of the ledger, keyed by rule name.
    pub fn ledger(&self) -> &BTreeMap<String, BlockedEntry> {
        &self.ledger
    }

    /// Pids currently blocked according to the ledger.
    pub fn blocked_pids(&self) -> BTreeSet<u32> {
        self.ledger.values().map(|e| e.pid).collect()
    }

    /// Computes the diff for `focused_pid` against a process snapshot.
    pub fn plan(&self, snapshot: &[ProcessIdentity], focused_pid: u32) -> ReconcilePlan {
        let mut unresolved = 0;
        let mut desired: BTreeMap<String, (FilterRule, BlockedEntry)> = BTreeMap::new();

        for process in snapshot {
            if process.pid == focused_pid || self.policy.is_exempt(&process.name, process.pid) {
                continue;
            }
            let Some(rule) = FilterRule::block_process(process) else {
                unresolved += 1;
                continue;
            };
            let entry = BlockedEntry {
                pid: process.pid,
                name: process.name.clone(),
                path: process.path.clone().unwrap_or_default(),
            };
            desired.insert(rule.name.clone(), (rule, entry));
        }

        // A ledger entry is stale if it is no longer desired, or if its pid
        // was reused by a same-named executable at a different path.
        let to_remove: Vec<String> = self
            .ledger
            .iter()
            .filter(|(name, entry)| {
                desired
                    .get(*name)
                    .is_none_or(|(_, wanted)| wanted.path != entry.path)
            })
            .map(|(name, _)| name.clone())
            .collect();

        let to_add: Vec<(FilterRule, BlockedEntry)> = desired
            .into_iter()
            .filter(|(name, (_, wanted))| {
                self.ledger
                    .get(name)
                    .is_none_or(|existing| existing.path != wanted.path)
            })
            .map(|(_, pair)| pair)
            .collect();

        ReconcilePlan {
            to_remove,
            to_add,
            unresolved,
        }
    }

    /// Runs one reconciliation pass for `focused_pid`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Enumeration`] if no process snapshot could be
    /// taken; the ledger is untouched in that case. Individual filter
    /// failures never fail the pass, they are reported in
    /// [`ReconcileReport::failures`].
    pub async fn reconcile<D: ProcessDirectory>(
        &mut self,
        directory: &mut D,
        focused_pid: u32,
    ) -> Result<ReconcileReport> {
        let snapshot = directory.list_processes()?;
        let plan = self.plan(&snapshot, focused_pid);

        let mut report = ReconcileReport {
            focused_pid,
            unresolved: plan.unresolved,
            ..ReconcileReport::default()
        };

        for name in plan.to_remove {
            match self.filter.revoke(&name).await {
                Ok(()) => {
                    if let Some(entry) = self.ledger.remove(&name) {
                        info!("[UNBLOCKED] {} ({})", entry.name, entry.pid);
                    }
                    report.revoked.push(name);
                }
                Err(e) => {
                    warn!("Could not revoke {name}, will retry next pass: {e}");
                    report.failures.push(RuleFailure {
                        rule: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        for (rule, entry) in plan.to_add {
            // A failed revoke of a reused pid leaves the old rule in place;
            // installing under the same name would be a no-op.
            if self.ledger.contains_key(&rule.name) {
                continue;
            }
            match self.filter.install(&rule).await {
                Ok(()) => {
                    info!("[BLOCKED] {} ({})", entry.name, entry.pid);
                    report.blocked.push(rule.name.clone());
                    self.ledger.insert(rule.name, entry);
                }
                Err(e) => {
                    warn!("Could not block {}, will retry next pass: {e}", rule.name);
                    report.failures.push(RuleFailure {
                        rule: rule.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        debug!(
            focused_pid,
            revoked = report.revoked.len(),
            blocked = report.blocked.len(),
            failed = report.failures.len(),
            unresolved = report.unresolved,
            ledger = self.ledger.len(),
            "Reconciliation pass complete"
        );

        Ok(report)
    }

    /// Revokes every rule in the ledger.
    ///
    /// Failures are logged and skipped; the ledger is emptied regardless
    /// because the process is about to exit and the caller follows up with
    /// a prefix sweep.
    pub async fn release_all(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let ledger = std::mem::take(&mut self.ledger);

        for name in ledger.into_keys() {
            match self.filter.revoke(&name).await {
                Ok(()) => report.revoked += 1,
                Err(e) => {
                    warn!("Cleanup could not revoke {name}: {e}");
                    report.failures.push(RuleFailure {
                        rule: name,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
