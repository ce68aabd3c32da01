//! TOML-based configuration for the Arbor daemon.
//!
//! One file describes the watched repository, the poll cadences and the
//! external scanner command that produces snapshots.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::scheduler::PollIntervals;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon process settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// The repository whose branch tree is displayed.
    pub repository: RepositoryConfig,

    /// Adaptive poll cadences.
    #[serde(default)]
    pub poll: PollConfig,

    /// External scanner invocation.
    pub scanner: ScannerConfig,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// When set, logs are also written to a daily rolling file here.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Identifier used in events. Defaults to the last component of
    /// `local_path`.
    #[serde(default)]
    pub id: Option<String>,

    /// Working copy handed to the scanner.
    pub local_path: PathBuf,

    /// Parent assigned to new branches the scanner gives no parent.
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".into()
}

impl RepositoryConfig {
    /// The configured `id`, or the file name of `local_path`.
    pub fn repo_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => self
                .local_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.local_path.display().to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Poll
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Start with automatic polling on.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_active_dirty")]
    pub active_dirty_secs: u64,

    #[serde(default = "default_active_clean")]
    pub active_clean_secs: u64,

    #[serde(default = "default_hidden")]
    pub hidden_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_active_dirty() -> u64 {
    30
}
fn default_active_clean() -> u64 {
    60
}
fn default_hidden() -> u64 {
    300
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            active_dirty_secs: default_active_dirty(),
            active_clean_secs: default_active_clean(),
            hidden_secs: default_hidden(),
        }
    }
}

impl PollConfig {
    pub fn intervals(&self) -> PollIntervals {
        PollIntervals {
            active_dirty: Duration::from_secs(self.active_dirty_secs),
            active_clean: Duration::from_secs(self.active_clean_secs),
            hidden: Duration::from_secs(self.hidden_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// The command that prints a snapshot as JSON on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub command: String,

    /// Leading arguments. The repository path is appended after these.
    #[serde(default)]
    pub args: Vec<String>,

    /// Seconds before a running scan is killed (default 120).
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,
}

fn default_scan_timeout() -> u64 {
    120
}

impl ScannerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.local_path.as_os_str().is_empty() {
            return Err(invalid("repository.local_path", "local path must not be empty"));
        }
        if self.repository.default_branch.trim().is_empty() {
            return Err(invalid(
                "repository.default_branch",
                "default branch must not be empty",
            ));
        }
        if self.repository.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(invalid("repository.id", "id must not be empty when set"));
        }
        if self.scanner.command.trim().is_empty() {
            return Err(invalid("scanner.command", "scanner command must not be empty"));
        }
        if self.scanner.timeout_secs == 0 {
            return Err(invalid("scanner.timeout_secs", "timeout must be > 0"));
        }

        for (field, secs) in [
            ("poll.active_dirty_secs", self.poll.active_dirty_secs),
            ("poll.active_clean_secs", self.poll.active_clean_secs),
            ("poll.hidden_secs", self.poll.hidden_secs),
        ] {
            if secs == 0 {
                return Err(invalid(field, "poll interval must be > 0"));
            }
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(field: &str, detail: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[daemon]
log_level = "debug"
log_dir = "/tmp/arbor-logs"

[repository]
id = "widgets"
local_path = "/src/widgets"
default_branch = "develop"

[poll]
enabled = false
active_dirty_secs = 10
active_clean_secs = 20
hidden_secs = 600

[scanner]
command = "arbor-scan"
args = ["--json", "--with-prs"]
timeout_secs = 45
"#
    }

    fn minimal_toml() -> &'static str {
        r#"
[repository]
local_path = "/src/widgets"

[scanner]
command = "arbor-scan"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.daemon.log_dir, Some(PathBuf::from("/tmp/arbor-logs")));
        assert_eq!(config.repository.repo_id(), "widgets");
        assert_eq!(config.repository.default_branch, "develop");
        assert!(!config.poll.enabled);
        assert_eq!(config.scanner.args, vec!["--json", "--with-prs"]);
        assert_eq!(config.scanner.timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.log_dir.is_none());
        assert_eq!(config.repository.default_branch, "main");
        assert!(config.poll.enabled);
        assert_eq!(config.poll.intervals(), PollIntervals::default());
        assert!(config.scanner.args.is_empty());
        assert_eq!(config.scanner.timeout_secs, 120);
        config.validate().unwrap();
    }

    #[test]
    fn test_repo_id_defaults_to_directory_name() {
        let config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.repository.repo_id(), "widgets");
    }

    #[test]
    fn test_poll_intervals() {
        let config: AppConfig = toml::from_str(sample_toml()).unwrap();
        let intervals = config.poll.intervals();
        assert_eq!(intervals.active_dirty, Duration::from_secs(10));
        assert_eq!(intervals.active_clean, Duration::from_secs(20));
        assert_eq!(intervals.hidden, Duration::from_secs(600));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbor.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_and_validate(&path).expect("load_and_validate failed");
        assert_eq!(config.scanner.command, "arbor-scan");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/arbor.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbor.toml");
        std::fs::write(&path, "[repository\nlocal_path = 3").unwrap();

        let result = AppConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_scanner_section_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbor.toml");
        std::fs::write(&path, "[repository]\nlocal_path = \"/src/x\"\n").unwrap();

        let result = AppConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        config.scanner.command = "  ".into();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "scanner.command"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        config.poll.hidden_secs = 0;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "poll.hidden_secs"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_default_branch() {
        let mut config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        config.repository.default_branch = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "repository.default_branch"
        ));
    }
}
