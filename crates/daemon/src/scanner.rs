//! External scanner invocation.
//!
//! The scanner is any executable that prints a snapshot as JSON on stdout.
//! The repository path is passed as its last argument.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument, warn};

use arbor_core::config::ScannerConfig;
use arbor_core::errors::ScanError;
use arbor_core::ingest::parse_snapshot;
use arbor_core::models::ScanSnapshot;

#[derive(Debug, Clone)]
pub struct CommandScanner {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandScanner {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ScannerConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone(), config.timeout())
    }

    /// Run the scanner against `local_path` and return its validated output.
    #[instrument(skip(self), fields(command = %self.command))]
    pub async fn scan(&self, local_path: &str) -> Result<ScanSnapshot, ScanError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(local_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(args = ?self.args, "running scanner");
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ScanError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ScanError::BinaryNotFound(self.command.clone())
                } else {
                    ScanError::IoError(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "scanner command failed");
            return Err(ScanError::CommandFailed { exit_code, stderr });
        }

        parse_snapshot(&String::from_utf8_lossy(&output.stdout))
    }
}
