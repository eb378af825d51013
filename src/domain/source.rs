//! Data sources: one fact, resolved through an ordered chain of candidates.
//!
//! Candidates are tried in declared order (structured tool, then legacy tool,
//! then raw file). The first one whose requirements are present and whose
//! invocation succeeds wins. Exhausting the chain is a valid outcome and
//! resolves to an `unavailable` entry.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::capability::CapabilityProbe;
use super::elevation::ElevationPolicy;
use super::error::ProbeError;
use super::executor::{Capture, Executor, ProbeCommand};
use super::report::{Entry, EntryStatus};

/// Everything a data source needs to probe the host for one run.
pub struct ProbeContext {
    pub capabilities: Arc<dyn CapabilityProbe>,
    pub executor: Arc<dyn Executor>,
    pub elevation: Arc<dyn ElevationPolicy>,
    pub default_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    None,
    /// Elevate when possible, otherwise run unprivileged and report the
    /// value as permission-limited.
    Optional,
    /// Skip the candidate unless elevation is available.
    Mandatory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Shell(String),
    ReadFile(PathBuf),
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Shell(cmd) => write!(f, "{}", cmd),
            Method::ReadFile(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub method: Method,
    pub requires: Vec<String>,
    pub elevation: Elevation,
    /// Blank output is a real answer ("nothing to upgrade") rather than a
    /// failed probe.
    pub accept_empty: bool,
    pub capture: Capture,
    pub timeout: Option<Duration>,
}

impl Candidate {
    /// A shell command whose first word is the required tool.
    pub fn shell(command: impl Into<String>) -> Self {
        let command = command.into();
        let requires = command
            .split_whitespace()
            .next()
            .map(|tool| vec![tool.to_string()])
            .unwrap_or_default();
        Self {
            method: Method::Shell(command),
            requires,
            elevation: Elevation::None,
            accept_empty: false,
            capture: Capture::Stdout,
            timeout: None,
        }
    }

    /// A raw file read; the file itself is the requirement.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            requires: vec![path.to_string_lossy().to_string()],
            method: Method::ReadFile(path),
            elevation: Elevation::None,
            accept_empty: false,
            capture: Capture::Stdout,
            timeout: None,
        }
    }

    /// A shell script whose first word is not a tool (assignments,
    /// compound commands); every tool it runs is listed explicitly.
    pub fn script(command: impl Into<String>, requires: &[&str]) -> Self {
        Self {
            requires: requires.iter().map(|r| r.to_string()).collect(),
            ..Self::shell(command)
        }
    }

    /// Add a requirement beyond the command's own tool (pipeline stages,
    /// directories it lists).
    pub fn requires(mut self, name: impl Into<String>) -> Self {
        self.requires.push(name.into());
        self
    }

    pub fn elevate(mut self, elevation: Elevation) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn accept_empty(mut self) -> Self {
        self.accept_empty = true;
        self
    }

    pub fn combined(mut self) -> Self {
        self.capture = Capture::Combined;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn attempt(&self, label: &str, ctx: &ProbeContext) -> Result<Entry, ProbeError> {
        if let Some(missing) = self.requires.iter().find(|r| !ctx.capabilities.has(r)) {
            return Err(ProbeError::ToolAbsent(missing.clone()));
        }

        let elevate = match self.elevation {
            Elevation::None => false,
            Elevation::Optional => true,
            Elevation::Mandatory => {
                if !ctx.elevation.available().await {
                    return Err(ProbeError::ElevationUnavailable);
                }
                true
            }
        };

        let result = match &self.method {
            Method::Shell(shell) => {
                let command = ProbeCommand {
                    elevate,
                    capture: self.capture,
                    ..ProbeCommand::new(shell.clone(), self.timeout.unwrap_or(ctx.default_timeout))
                };
                ctx.executor.run(&command).await
            }
            Method::ReadFile(path) => ctx.executor.read_file(path).await,
        };

        if let Some(failure) = result.failure {
            return Err(failure);
        }

        let text = result.output.trim_end();
        let method = self.method.to_string();
        if text.trim().is_empty() {
            return if self.accept_empty {
                Ok(Entry::resolved(label, EntryStatus::Empty, "", method))
            } else {
                Err(ProbeError::EmptyOutput)
            };
        }

        let status = if self.elevation == Elevation::Optional && !result.elevated {
            EntryStatus::Limited
        } else {
            EntryStatus::Ok
        };
        Ok(Entry::resolved(label, status, text, method))
    }
}

#[derive(Debug, Clone)]
pub struct DataSource {
    pub label: String,
    pub candidates: Vec<Candidate>,
}

impl DataSource {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            candidates: Vec::new(),
        }
    }

    pub fn candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub async fn resolve(&self, ctx: &ProbeContext) -> Entry {
        let mut last_failure = None;
        for candidate in &self.candidates {
            match candidate.attempt(&self.label, ctx).await {
                Ok(entry) => {
                    debug!(source = %self.label, method = %candidate.method, status = ?entry.status, "source resolved");
                    return entry;
                }
                Err(e) if e.is_execution_failure() => {
                    debug!(source = %self.label, method = %candidate.method, error = %e, "candidate failed");
                    last_failure = Some(e);
                }
                Err(e) => {
                    trace!(source = %self.label, method = %candidate.method, error = %e, "candidate skipped");
                    last_failure = Some(e);
                }
            }
        }
        debug!(source = %self.label, "no candidate succeeded");
        Entry::unavailable(&self.label, last_failure)
    }
}
