//! focuswall - network access for the focused window only
//!
//! While running, every process except the one owning the foreground window
//! (and a fixed list of system services) is blocked from opening outbound
//! connections. On exit every rule focuswall created is removed again.
//!
//! # Usage
//!
//! ```bash
//! # Run from an elevated terminal; Ctrl+C restores network access
//! focuswall
//!
//! # Watch focus changes without touching the firewall
//! focuswall --dry-run --verbose
//!
//! # Remove every Block_/Min_ rule left behind by a crashed run
//! focuswall cleanup
//!
//! # Show or create the configuration file
//! focuswall config
//! focuswall config --init
//! ```

use clap::{Parser, Subcommand};
use focuswall::audit::AuditLog;
use focuswall::config::{self, AppConfig};
use focuswall::core::control::{FocusLoop, LoopSettings};
use focuswall::core::exemption::ExemptionPolicy;
use focuswall::core::focus::PlatformObserver;
use focuswall::core::process::SysinfoDirectory;
use focuswall::core::rules::{ALLOWANCE_RULE_PREFIX, BLOCK_RULE_PREFIX};
use focuswall::elevation::{self, ElevationError};
use focuswall::{FilterController, MemoryController, NetshController, Reconciler, shutdown, utils};
use std::process::ExitCode;
use tracing::warn;

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "focuswall")]
#[command(version = build::PKG_VERSION, long_version = build::CLAP_LONG_VERSION)]
#[command(about = "Only the focused window keeps network access", long_about = None)]
struct Cli {
    /// Keep rules in memory instead of changing the system firewall
    #[arg(long)]
    dry_run: bool,

    /// Focus poll interval in milliseconds (overrides the config file)
    #[arg(long, value_name = "MS")]
    poll_ms: Option<u64>,

    /// Log every filter command and reconciliation pass
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove every focuswall rule from the firewall
    Cleanup,
    /// Show the active configuration
    Config {
        /// Write the default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = utils::ensure_dirs() {
        warn!("Could not create data directories: {e}");
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            None => run(cli.dry_run, cli.poll_ms).await,
            Some(Commands::Cleanup) => cleanup().await,
            Some(Commands::Config { init }) => show_config(init).await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolves the filter program and checks privileges, printing hints on failure.
fn netsh_controller() -> Result<NetshController, ElevationError> {
    let program = elevation::filter_program();
    let checks = elevation::ensure_filter_program(&program).and_then(|()| elevation::require_elevation());

    match &checks {
        Err(ElevationError::NotElevated) => {
            eprintln!("  hint: Run focuswall from an elevated (Administrator) terminal");
            eprintln!("  hint: Or use --dry-run to watch focus changes without touching the firewall");
        }
        Err(ElevationError::FilterProgramNotFound(_)) => {
            eprintln!("  hint: Ensure netsh is available in PATH");
            eprintln!("  hint: Or set FOCUSWALL_FILTER_COMMAND to the full path of the tool");
        }
        _ => {}
    }

    checks.map(|()| NetshController::with_program(program))
}

async fn run(dry_run: bool, poll_ms: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = config::load_config().await;
    if let Some(ms) = poll_ms {
        config.poll_interval_ms = ms;
    }

    let policy = ExemptionPolicy::default().with_extra(&config.extra_exempt);
    let mut settings = LoopSettings::from_config(&config);
    settings.dry_run = dry_run;

    let audit = if config.enable_audit_log {
        AuditLog::new()
            .map_err(|e| warn!("Audit log disabled: {e}"))
            .ok()
    } else {
        None
    };

    if dry_run {
        println!("Dry run: rules are kept in memory, the firewall is not modified.");
        drive(MemoryController::new(), policy, settings, audit).await;
    } else {
        let filter = netsh_controller()?;
        drive(filter, policy, settings, audit).await;
    }

    Ok(())
}

async fn drive<F: FilterController>(
    filter: F,
    policy: ExemptionPolicy,
    settings: LoopSettings,
    audit: Option<AuditLog>,
) {
    let (signal, listener) = shutdown::channel();
    let signal_task = shutdown::install_signal_handlers(signal);

    let reconciler = Reconciler::new(filter, policy);
    let mut focus_loop = FocusLoop::new(
        PlatformObserver::default(),
        SysinfoDirectory::new(),
        reconciler,
        settings,
    );
    if let Some(audit) = audit {
        focus_loop = focus_loop.with_audit(audit);
    }

    println!("Initializing...");
    let startup = focus_loop.startup().await;
    if startup.swept > 0 {
        println!("Removed {} stale rule(s) left by a previous run.", startup.swept);
    }
    if focus_loop.settings().minimal_allowances {
        println!(
            "Minimal service allowances: {}/{} installed.",
            startup.allowances_installed,
            startup.allowances_installed + startup.allowance_failures.len()
        );
    }
    println!("Only the focused window keeps network access. Press Ctrl+C to exit.");

    focus_loop.run(listener).await;
    signal_task.abort();

    println!("Cleaning up...");
    let report = focus_loop.shutdown().await;
    if report.is_clean() {
        println!("Cleanup complete. Network access restored for all processes.");
    } else {
        for failure in &report.cleanup.failures {
            eprintln!("  could not remove {}: {}", failure.rule, failure.error);
        }
        println!(
            "Cleanup finished with {} failure(s). Run `focuswall cleanup` as administrator to remove leftovers.",
            report.cleanup.failures.len()
        );
    }
}

async fn cleanup() -> Result<(), Box<dyn std::error::Error>> {
    let filter = netsh_controller()?;
    let audit = AuditLog::new().ok();

    let mut removed = 0;
    let mut first_error = None;
    for prefix in [BLOCK_RULE_PREFIX, ALLOWANCE_RULE_PREFIX] {
        match filter.revoke_all_with_prefix(prefix).await {
            Ok(n) => {
                println!("Removed {n} {prefix}* rule(s).");
                removed += n;
            }
            Err(e) => {
                eprintln!("Could not remove {prefix}* rules: {e}");
                for hint in e.hints() {
                    eprintln!("  hint: {hint}");
                }
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(audit) = &audit {
        audit
            .log_cleanup(removed, first_error.as_ref().map(ToString::to_string))
            .await;
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => {
            println!("Cleanup complete. Network access restored for all processes.");
            Ok(())
        }
    }
}

async fn show_config(init: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config::config_path().ok_or("No data directory available on this platform")?;

    if init && !path.exists() {
        config::save_config_to(&AppConfig::default(), &path).await?;
        println!("Wrote default configuration to {}", path.display());
    }

    let config = config::load_config_from(&path).await;
    println!("Config file: {}", path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
