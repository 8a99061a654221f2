use crate::utils::get_data_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Bounds for the focus poll cadence in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u64 = 50;
pub const MAX_POLL_INTERVAL_MS: u64 = 5000;

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// How often the foreground window is sampled
    ///
    /// Clamped to 50..=5000 ms when read through [`AppConfig::poll_interval`].
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Re-reconcile the current target this often so exited and newly started
    /// processes converge without a focus change (0 disables)
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Executable names exempt in addition to the built-in list
    #[serde(default)]
    pub extra_exempt: Vec<String>,
    /// Install the `Min_` allow rules for DNS, DHCP, web ports and core services
    #[serde(default = "default_true")]
    pub minimal_allowances: bool,
    /// Remove `Block_` rules left behind by an unclean previous run
    #[serde(default = "default_true")]
    pub sweep_on_startup: bool,
    #[serde(default = "default_true")]
    pub enable_audit_log: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            refresh_interval_secs: default_refresh_interval_secs(),
            extra_exempt: Vec::new(),
            minimal_allowances: true,
            sweep_on_startup: true,
            enable_audit_log: true,
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        )
    }

    /// `None` when periodic refresh is disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_refresh_interval_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Location of the config file, if the platform has a data directory.
pub fn config_path() -> Option<PathBuf> {
    get_data_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Saves the app config to `path` using an atomic write pattern.
/// 1. Writes to a temporary file next to the target.
/// 2. Sets restrictive permissions (0o600).
/// 3. Atomically renames to the target path.
///
/// # Security
///
/// On Unix systems, files are created with mode 0o600 (user read/write only).
/// On Windows, files inherit directory permissions.
pub async fn save_config_to(config: &AppConfig, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");

    // Create file with restrictive permissions from the start to prevent
    // race condition where file is briefly world-readable
    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(&temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })
}

/// Loads the app config from the default location, or returns defaults.
pub async fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path).await,
        None => AppConfig::default(),
    }
}

/// Loads the app config from `path`.
///
/// A missing file yields defaults silently; an unreadable or malformed file
/// yields defaults with a warning.
pub async fn load_config_from(path: &Path) -> AppConfig {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AppConfig::default(),
        Err(e) => {
            tracing::warn!("Could not read {}: {e}; using defaults", path.display());
            return AppConfig::default();
        }
    };

    serde_json::from_str(&json).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed {}: {e}", path.display());
        AppConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(10)));
        assert!(config.minimal_allowances);
        assert!(config.sweep_on_startup);
        assert!(config.extra_exempt.is_empty());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"extra_exempt":["steam.exe"]}"#).unwrap();
        assert_eq!(config.extra_exempt, vec!["steam.exe".to_string()]);
        assert_eq!(config.poll_interval_ms, 500);
        assert!(config.enable_audit_log);
    }

    #[test]
    fn test_poll_interval_clamped() {
        let fast = AppConfig {
            poll_interval_ms: 1,
            ..AppConfig::default()
        };
        assert_eq!(fast.poll_interval(), Duration::from_millis(MIN_POLL_INTERVAL_MS));

        let slow = AppConfig {
            poll_interval_ms: 60_000,
            ..AppConfig::default()
        };
        assert_eq!(slow.poll_interval(), Duration::from_millis(MAX_POLL_INTERVAL_MS));
    }

    #[test]
    fn test_refresh_disabled() {
        let config = AppConfig {
            refresh_interval_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.refresh_interval(), None);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = AppConfig {
            poll_interval_ms: 250,
            extra_exempt: vec!["obs64.exe".to_string()],
            sweep_on_startup: false,
            ..AppConfig::default()
        };

        save_config_to(&config, &path).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_config_from(&path).await, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_load_missing_or_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert_eq!(load_config_from(&path).await, AppConfig::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config_from(&path).await, AppConfig::default());
    }
}
