//! Packet filter control
//!
//! [`FilterController`] is the seam between the reconciler and the external
//! firewall. Every operation is idempotent: installing a rule that already
//! exists and revoking one that is already gone both succeed.
//!
//! - [`NetshController`]: drives `netsh advfirewall firewall`, one blocking
//!   subprocess per call
//! - [`MemoryController`]: keeps rules in memory and records every call;
//!   backs `--dry-run` and the reconciler tests

use crate::core::error::{Error, FilterErrorPattern, Result};
use crate::core::rules::FilterRule;
use std::collections::{BTreeMap, BTreeSet};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Marker netsh prints when a named rule does not exist.
const NOT_FOUND_MARKER: &str = "no rules match";

/// Idempotent operations against the external packet filter.
#[allow(async_fn_in_trait)]
pub trait FilterController {
    /// Installs `rule`. A rule with the same name already present is a
    /// no-op success.
    async fn install(&self, rule: &FilterRule) -> Result<()>;

    /// Removes the rule called `name`. An absent rule is a no-op success.
    async fn revoke(&self, name: &str) -> Result<()>;

    /// Removes every installed rule whose name starts with `prefix` and
    /// returns how many were removed.
    async fn revoke_all_with_prefix(&self, prefix: &str) -> Result<usize>;
}

/// Output of one filter tool invocation.
#[derive(Debug)]
struct ToolOutput {
    success: bool,
    exit_code: Option<i32>,
    /// stdout and stderr combined; netsh reports errors on stdout
    text: String,
}

impl ToolOutput {
    fn is_not_found(&self) -> bool {
        self.text.to_lowercase().contains(NOT_FOUND_MARKER)
    }

    fn into_error(self) -> Error {
        Error::filter(self.text, self.exit_code)
    }

    /// Logs the translated failure and turns it into an error carrying its hints.
    fn into_logged_error(self, action: &str) -> Error {
        let translation = FilterErrorPattern::match_error(&self.text);
        warn!("Failed to {action}: {}", translation.user_message);
        for hint in &translation.suggestions {
            debug!("  hint: {hint}");
        }
        Error::translated_filter(self.text, self.exit_code, translation)
    }
}

/// [`FilterController`] backed by `netsh advfirewall firewall`.
#[derive(Debug, Clone)]
pub struct NetshController {
    program: String,
}

impl Default for NetshController {
    fn default() -> Self {
        Self::new()
    }
}

impl NetshController {
    /// Uses the program resolved by [`crate::elevation::filter_program`].
    pub fn new() -> Self {
        Self::with_program(crate::elevation::filter_program())
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<ToolOutput> {
        let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();
        debug!("{} advfirewall firewall {}", self.program, args.join(" "));

        let output = tokio::process::Command::new(&self.program)
            .args(["advfirewall", "firewall"])
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::filter(format!("Failed to spawn {}: {e}", self.program), None))?;

        let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr.trim());
        }

        Ok(ToolOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            text,
        })
    }

    /// Returns `true` if a rule named `name` is installed.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the tool fails for any reason other than "not found".
    pub async fn rule_exists(&self, name: &str) -> Result<bool> {
        let name_arg = format!("name={name}");
        let output = self.run(&["show", "rule", name_arg.as_str()]).await?;
        if output.success {
            Ok(true)
        } else if output.is_not_found() {
            Ok(false)
        } else {
            Err(output.into_error())
        }
    }

    /// Lists the names of all installed outbound rules.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the listing command fails.
    pub async fn list_rule_names(&self) -> Result<Vec<String>> {
        let output = self.run(&["show", "rule", "name=all", "dir=out"]).await?;
        if output.success {
            Ok(parse_rule_names(&output.text))
        } else if output.is_not_found() {
            Ok(Vec::new())
        } else {
            Err(output.into_error())
        }
    }
}

impl FilterController for NetshController {
    async fn install(&self, rule: &FilterRule) -> Result<()> {
        if self.rule_exists(&rule.name).await? {
            debug!("Rule {} already installed", rule.name);
            return Ok(());
        }

        let output = self.run(&rule.to_add_args()).await?;
        if output.success {
            info!("Installed rule {rule}");
            Ok(())
        } else {
            Err(output.into_logged_error(&format!("install {}", rule.name)))
        }
    }

    async fn revoke(&self, name: &str) -> Result<()> {
        let name_arg = format!("name={name}");
        let output = self.run(&["delete", "rule", name_arg.as_str()]).await?;

        if output.success {
            info!("Revoked rule {name}");
            Ok(())
        } else if output.is_not_found() {
            debug!("Rule {name} already absent");
            Ok(())
        } else {
            Err(output.into_logged_error(&format!("revoke {name}")))
        }
    }

    async fn revoke_all_with_prefix(&self, prefix: &str) -> Result<usize> {
        let names: Vec<String> = self
            .list_rule_names()
            .await?
            .into_iter()
            .filter(|n| n.starts_with(prefix))
            .collect();

        let mut removed = 0;
        for name in &names {
            match self.revoke(name).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Sweep could not remove {name}: {e}"),
            }
        }

        if !names.is_empty() {
            info!("Swept {removed}/{} rule(s) with prefix {prefix}", names.len());
        }
        Ok(removed)
    }
}

/// Extracts rule names from `netsh advfirewall firewall show rule` output.
///
/// Names are returned once each, in first-seen order.
pub fn parse_rule_names(output: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Rule Name:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}

/// One recorded call against a [`MemoryController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterCall {
    Install(String),
    Revoke(String),
    RevokePrefix(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    rules: BTreeMap<String, FilterRule>,
    calls: Vec<FilterCall>,
    failing: BTreeSet<String>,
    fail_all: bool,
}

impl MemoryState {
    fn should_fail(&self, name: &str) -> bool {
        self.fail_all || self.failing.contains(name)
    }
}

/// In-memory [`FilterController`] that records every call.
///
/// Failures can be injected per rule name to exercise the reconciler's
/// best-effort ledger.
#[derive(Debug, Default)]
pub struct MemoryController {
    state: Mutex<MemoryState>,
}

impl MemoryController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Names of all installed rules.
    pub fn installed_names(&self) -> BTreeSet<String> {
        self.lock().rules.keys().cloned().collect()
    }

    /// Looks up an installed rule by name.
    pub fn rule(&self, name: &str) -> Option<FilterRule> {
        self.lock().rules.get(name).cloned()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<FilterCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Makes every install/revoke of `name` fail until cleared.
    pub fn fail_on(&self, name: impl Into<String>) {
        self.lock().failing.insert(name.into());
    }

    /// Makes every call fail, as if privileges were missing.
    pub fn set_fail_all(&self, fail: bool) {
        self.lock().fail_all = fail;
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing.clear();
        state.fail_all = false;
    }
}

impl FilterController for MemoryController {
    async fn install(&self, rule: &FilterRule) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(FilterCall::Install(rule.name.clone()));
        if state.should_fail(&rule.name) {
            return Err(Error::filter(
                "The requested operation requires elevation (Run as administrator).",
                Some(1),
            ));
        }
        if !state.rules.contains_key(&rule.name) {
            info!("[dry-run] install {rule}");
            state.rules.insert(rule.name.clone(), rule.clone());
        }
        Ok(())
    }

    async fn revoke(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(FilterCall::Revoke(name.to_string()));
        if state.should_fail(name) {
            return Err(Error::filter(
                "The requested operation requires elevation (Run as administrator).",
                Some(1),
            ));
        }
        if state.rules.remove(name).is_some() {
            info!("[dry-run] revoke {name}");
        }
        Ok(())
    }

    async fn revoke_all_with_prefix(&self, prefix: &str) -> Result<usize> {
        let mut state = self.lock();
        state.calls.push(FilterCall::RevokePrefix(prefix.to_string()));
        if state.fail_all {
            return Err(Error::filter("listing rules failed", Some(1)));
        }

        let matching: Vec<String> = state
            .rules
            .keys()
            .filter(|n| n.starts_with(prefix) && !state.failing.contains(*n))
            .cloned()
            .collect();
        for name in &matching {
            state.rules.remove(name);
        }
        Ok(matching.len())
    }
}
