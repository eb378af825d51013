//! Elevation policy: "can this process run a command with elevated rights,
//! non-interactively, right now?"
//!
//! The executor only ever asks `available()` and, if the answer is yes, hands
//! the command to `run()`. Nothing here prompts for a password.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::error::ProbeError;
use super::executor::{spawn, ExecutionResult, ProbeCommand};
use crate::{platform, tools};

/// Bound on the one-time `sudo -n true` check.
const SUDO_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait ElevationPolicy: Send + Sync {
    /// Idempotent and side-effect free from the caller's point of view.
    async fn available(&self) -> bool;

    /// Run `command` elevated, keeping at most `limit` bytes of stdout.
    async fn run(&self, command: &ProbeCommand, limit: usize) -> ExecutionResult;
}

/// Never elevates.
pub struct Unprivileged;

#[async_trait]
impl ElevationPolicy for Unprivileged {
    async fn available(&self) -> bool {
        false
    }

    async fn run(&self, _command: &ProbeCommand, _limit: usize) -> ExecutionResult {
        ExecutionResult::failed(ProbeError::ElevationUnavailable)
    }
}

/// The process already has an effective uid of 0.
pub struct AlreadyRoot;

#[async_trait]
impl ElevationPolicy for AlreadyRoot {
    async fn available(&self) -> bool {
        true
    }

    async fn run(&self, command: &ProbeCommand, limit: usize) -> ExecutionResult {
        spawn("sh", &["-c", &command.script()], command.timeout, limit).await
    }
}

/// Passwordless sudo, checked once per run.
///
/// Our own signals cannot reach root-owned pipeline stages, so when
/// coreutils `timeout` is installed the elevated side runs under it and
/// kills its own process group at the deadline.
pub struct Sudo {
    usable: OnceCell<bool>,
    bounded: bool,
}

impl Sudo {
    pub fn new() -> Self {
        Self {
            usable: OnceCell::new(),
            bounded: tools::find("timeout").is_some(),
        }
    }

    fn argv(&self, command: &ProbeCommand) -> Vec<String> {
        let mut argv = vec!["-n".to_string()];
        if self.bounded {
            argv.extend([
                "timeout".to_string(),
                "-k".to_string(),
                "1".to_string(),
                format!("{:.3}", command.timeout.as_secs_f64()),
            ]);
        }
        argv.extend(["sh".to_string(), "-c".to_string(), command.script()]);
        argv
    }
}

impl Default for Sudo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ElevationPolicy for Sudo {
    async fn available(&self) -> bool {
        *self
            .usable
            .get_or_init(|| async {
                let check = spawn("sudo", &["-n", "true"], SUDO_CHECK_TIMEOUT, 0).await;
                let usable = check.succeeded();
                info!(usable, "checked non-interactive sudo");
                usable
            })
            .await
    }

    async fn run(&self, command: &ProbeCommand, limit: usize) -> ExecutionResult {
        let argv = self.argv(command);
        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        spawn("sudo", &args, command.timeout, limit).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElevationMode {
    /// Use passwordless sudo when it is installed and usable.
    #[default]
    Auto,
    /// Always go through sudo, even if the lookup cannot find it.
    Sudo,
    Never,
}

impl FromStr for ElevationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "auto" => Ok(ElevationMode::Auto),
            "sudo" => Ok(ElevationMode::Sudo),
            "never" => Ok(ElevationMode::Never),
            other => bail!(
                "unknown elevation mode '{}' (expected 'auto', 'sudo' or 'never')",
                other
            ),
        }
    }
}

impl fmt::Display for ElevationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElevationMode::Auto => write!(f, "auto"),
            ElevationMode::Sudo => write!(f, "sudo"),
            ElevationMode::Never => write!(f, "never"),
        }
    }
}

/// Pick the policy for this run. Running as root counts as elevated in
/// every mode.
pub fn from_mode(mode: ElevationMode) -> Arc<dyn ElevationPolicy> {
    if platform::is_root() {
        debug!("running as root");
        return Arc::new(AlreadyRoot);
    }
    match mode {
        ElevationMode::Never => Arc::new(Unprivileged),
        ElevationMode::Sudo => Arc::new(Sudo::new()),
        ElevationMode::Auto if tools::find("sudo").is_some() => Arc::new(Sudo::new()),
        ElevationMode::Auto => {
            debug!("sudo not installed, elevation disabled");
            Arc::new(Unprivileged)
        }
    }
}
