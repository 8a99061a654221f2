//! Firewall rule data structures
//!
//! A [`FilterRule`] is one outbound rule as the filter tool sees it: a name,
//! an action and a single match criterion (a program path or a
//! protocol/port pair).
//!
//! # Naming
//!
//! - Block rules: `Block_<executable-name>_<pid>`, see [`block_rule_name`]
//! - Minimal service allowances: fixed `Min_<ServiceTag>` names
//!
//! Names are deterministic so the reconciler's set arithmetic is stable
//! across passes.

use crate::core::exemption::BUILTIN_EXEMPT;
use crate::core::process::ProcessIdentity;
use crate::validators::{sanitize_rule_component, validate_program_path};
use std::fmt;
use std::path::PathBuf;

/// Prefix shared by every block rule; used for recovery sweeps.
pub const BLOCK_RULE_PREFIX: &str = "Block_";

/// Prefix shared by every minimal service allowance.
pub const ALLOWANCE_RULE_PREFIX: &str = "Min_";

/// What the rule does with matching traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Action {
    #[strum(serialize = "allow")]
    Allow,
    #[strum(serialize = "block")]
    Block,
}

/// Transport protocol for port-based rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Protocol {
    #[strum(serialize = "TCP")]
    Tcp,
    #[strum(serialize = "UDP")]
    Udp,
}

/// The single criterion a rule matches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// All traffic originated by this executable
    Program(PathBuf),
    /// Traffic to these remote ports (`"53"`, `"67-68"`)
    RemotePort { protocol: Protocol, ports: String },
}

/// One outbound firewall rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub name: String,
    pub action: Action,
    pub matcher: Matcher,
}

impl FilterRule {
    pub fn allow(name: impl Into<String>, matcher: Matcher) -> Self {
        Self {
            name: name.into(),
            action: Action::Allow,
            matcher,
        }
    }

    pub fn block(name: impl Into<String>, matcher: Matcher) -> Self {
        Self {
            name: name.into(),
            action: Action::Block,
            matcher,
        }
    }

    /// Builds the block rule for a process, or `None` if its path is
    /// missing or unsafe to put on a command line.
    pub fn block_process(identity: &ProcessIdentity) -> Option<Self> {
        let path = identity.path.as_ref()?;
        if let Err(e) = validate_program_path(path) {
            tracing::debug!(pid = identity.pid, name = %identity.name, "Skipping process: {e}");
            return None;
        }
        Some(Self::block(
            block_rule_name(&identity.name, identity.pid),
            Matcher::Program(path.clone()),
        ))
    }

    /// Returns the `netsh advfirewall firewall add rule` arguments for this rule.
    pub fn to_add_args(&self) -> Vec<String> {
        let mut args = vec![
            "add".to_string(),
            "rule".to_string(),
            format!("name={}", self.name),
            "dir=out".to_string(),
            format!("action={}", self.action),
        ];
        match &self.matcher {
            Matcher::Program(path) => args.push(format!("program={}", path.display())),
            Matcher::RemotePort { protocol, ports } => {
                args.push(format!("protocol={protocol}"));
                args.push(format!("remoteport={ports}"));
            }
        }
        args.push("enable=yes".to_string());
        args
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matcher {
            Matcher::Program(path) => {
                write!(f, "{} {} program={}", self.name, self.action, path.display())
            }
            Matcher::RemotePort { protocol, ports } => {
                write!(f, "{} {} {protocol}/{ports}", self.name, self.action)
            }
        }
    }
}

/// Deterministic block-rule identifier for `(executable name, pid)`.
///
/// ```
/// use focuswall::core::rules::block_rule_name;
///
/// assert_eq!(block_rule_name("chrome.exe", 4120), "Block_chrome.exe_4120");
/// ```
pub fn block_rule_name(name: &str, pid: u32) -> String {
    format!("{BLOCK_RULE_PREFIX}{}_{pid}", sanitize_rule_component(name))
}

/// Coarse always-allow rules installed at startup and removed at shutdown.
///
/// DNS, DHCP and web egress stay open, and every exempt executable gets an
/// explicit program allowance under `System32`.
pub fn minimal_service_allowances() -> Vec<FilterRule> {
    let port = |tag: &str, protocol, ports: &str| {
        FilterRule::allow(
            format!("{ALLOWANCE_RULE_PREFIX}{tag}"),
            Matcher::RemotePort {
                protocol,
                ports: ports.to_string(),
            },
        )
    };

    let mut rules = vec![
        port("DNS", Protocol::Udp, "53"),
        port("DNS_TCP", Protocol::Tcp, "53"),
        port("DHCP", Protocol::Udp, "67-68"),
        port("HTTP", Protocol::Tcp, "80"),
        port("HTTPS", Protocol::Tcp, "443"),
    ];

    // `System` is the kernel and has no image to match on
    rules.extend(
        BUILTIN_EXEMPT
            .iter()
            .filter_map(|exe| exe.strip_suffix(".exe").map(|stem| (*exe, stem)))
            .map(|(exe, stem)| {
                FilterRule::allow(
                    format!("{ALLOWANCE_RULE_PREFIX}{}", allowance_tag(stem)),
                    Matcher::Program(system32_program(exe)),
                )
            }),
    );

    rules
}

/// `svchost` -> `Svchost`
fn allowance_tag(stem: &str) -> String {
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Full path of an executable under `%SystemRoot%\System32`.
///
/// Built as a string so the Windows separator survives on any host.
fn system32_program(exe: &str) -> PathBuf {
    let root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".to_string());
    PathBuf::from(format!(r"{root}\System32\{exe}"))
}
