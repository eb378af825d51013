//! Executor: runs one probe command under a timeout and captures its output.
//!
//! A failed invocation is a value (`ExecutionResult::failure`), never an
//! error: non-zero exits, timeouts and spawn failures only fail the candidate
//! that issued them.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use super::elevation::ElevationPolicy;
use super::error::ProbeError;
use crate::tools;

/// Default cap on captured output per invocation (256 KiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 256 * 1024;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    Stdout,
    /// stderr folded into stdout, for tools that report on stderr.
    Combined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    pub shell: String,
    pub timeout: Duration,
    pub elevate: bool,
    pub capture: Capture,
}

impl ProbeCommand {
    pub fn new(shell: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            timeout,
            elevate: false,
            capture: Capture::Stdout,
        }
    }

    /// The script handed to `sh -c`.
    pub fn script(&self) -> String {
        match self.capture {
            Capture::Stdout => self.shell.clone(),
            Capture::Combined => format!("exec 2>&1; {}", self.shell),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output: String,
    pub failure: Option<ProbeError>,
    pub elevated: bool,
}

impl ExecutionResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            failure: None,
            elevated: false,
        }
    }

    pub fn failed(failure: ProbeError) -> Self {
        Self {
            output: String::new(),
            failure: Some(failure),
            elevated: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, command: &ProbeCommand) -> ExecutionResult;

    /// Read a raw file (usually a pseudo-file under /proc or /sys).
    async fn read_file(&self, path: &Path) -> ExecutionResult {
        read(path, DEFAULT_MAX_OUTPUT_BYTES).await
    }
}

/// Runs probe commands through `sh -c` on the local host.
pub struct ShellExecutor {
    elevation: Arc<dyn ElevationPolicy>,
    max_output_bytes: usize,
}

impl ShellExecutor {
    pub fn new(elevation: Arc<dyn ElevationPolicy>, max_output_bytes: usize) -> Self {
        Self {
            elevation,
            max_output_bytes,
        }
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn run(&self, command: &ProbeCommand) -> ExecutionResult {
        if command.elevate && self.elevation.available().await {
            let mut result = self.elevation.run(command, self.max_output_bytes).await;
            result.elevated = true;
            return result;
        }
        if command.elevate {
            debug!(command = %command.shell, "elevation unavailable, running unprivileged");
        }
        spawn(
            "sh",
            &["-c", &command.script()],
            command.timeout,
            self.max_output_bytes,
        )
        .await
    }

    async fn read_file(&self, path: &Path) -> ExecutionResult {
        read(path, self.max_output_bytes).await
    }
}

/// Sends SIGKILL to the child's whole process group when dropped, so
/// pipeline stages die with the shell on timeout or when the run abandons
/// the probe.
struct ProcessGroup(Option<i32>);

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.0 {
            // SAFETY: killpg only sends a signal; a group that already
            // exited yields ESRCH, which is ignored.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
}

/// Spawn `program` with `args` in a fresh process group, wait at most
/// `timeout`, and classify the outcome. At most `limit` bytes of stdout are
/// kept; the rest is drained and discarded.
pub(crate) async fn spawn(
    program: &str,
    args: &[&str],
    timeout: Duration,
    limit: usize,
) -> ExecutionResult {
    let child = Command::new(program)
        .args(args)
        .env("LC_ALL", "C")
        .env("PATH", tools::search_path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .process_group(0)
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => return ExecutionResult::failed(ProbeError::Spawn(e.to_string())),
    };
    let _group = ProcessGroup(child.id().map(|pid| pid as i32));

    let waited = tokio::time::timeout(timeout, async {
        let captured = match child.stdout.take() {
            Some(stdout) => read_capped(stdout, limit).await?,
            None => Captured::default(),
        };
        let status = child.wait().await?;
        Ok::<_, io::Error>((captured, status))
    })
    .await;

    let (captured, status) = match waited {
        Ok(Ok(done)) => done,
        Ok(Err(e)) => return ExecutionResult::failed(ProbeError::Spawn(e.to_string())),
        Err(_) => return ExecutionResult::failed(ProbeError::TimedOut(timeout)),
    };

    match status.code() {
        Some(0) => ExecutionResult::ok(captured.into_text()),
        Some(code) => ExecutionResult::failed(ProbeError::NonZeroExit(code)),
        None => ExecutionResult::failed(ProbeError::Signaled),
    }
}

async fn read(path: &Path, limit: usize) -> ExecutionResult {
    let read_failure = |e: io::Error| {
        ExecutionResult::failed(ProbeError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    };
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => return read_failure(e),
    };
    match read_capped(file, limit).await {
        Ok(captured) => ExecutionResult::ok(captured.into_text()),
        Err(e) => read_failure(e),
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

/// Keep the first `limit` bytes; read past them only to let the writer
/// finish.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> io::Result<Captured> {
    let mut bytes = Vec::new();
    (&mut reader)
        .take(limit as u64 + 1)
        .read_to_end(&mut bytes)
        .await?;

    let truncated = bytes.len() > limit;
    if truncated {
        bytes.truncate(limit);
        tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    }
    Ok(Captured { bytes, truncated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::elevation::Unprivileged;

    fn executor() -> ShellExecutor {
        ShellExecutor::new(Arc::new(Unprivileged), DEFAULT_MAX_OUTPUT_BYTES)
    }

    #[tokio::test]
    async fn captures_stdout() {
        let cmd = ProbeCommand::new("echo hello", Duration::from_secs(5));
        let result = executor().run(&cmd).await;
        assert!(result.succeeded());
        assert_eq!(result.output.trim(), "hello");
        assert!(!result.elevated);
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure_value() {
        let cmd = ProbeCommand::new("echo partial; exit 3", Duration::from_secs(5));
        let result = executor().run(&cmd).await;
        assert_eq!(result.failure, Some(ProbeError::NonZeroExit(3)));
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn timeout_is_distinguishable() {
        let cmd = ProbeCommand::new("sleep 5", Duration::from_millis(100));
        let result = executor().run(&cmd).await;
        assert_eq!(
            result.failure,
            Some(ProbeError::TimedOut(Duration::from_millis(100)))
        );
    }

    #[tokio::test]
    async fn combined_capture_includes_stderr() {
        let mut cmd = ProbeCommand::new("echo oops >&2", Duration::from_secs(5));
        let quiet = executor().run(&cmd).await;
        assert!(quiet.output.is_empty());

        cmd.capture = Capture::Combined;
        let combined = executor().run(&cmd).await;
        assert_eq!(combined.output.trim(), "oops");
    }

    #[tokio::test]
    async fn elevation_downgrades_silently() {
        let mut cmd = ProbeCommand::new("echo plain", Duration::from_secs(5));
        cmd.elevate = true;
        let result = executor().run(&cmd).await;
        assert!(result.succeeded());
        assert!(!result.elevated);
        assert_eq!(result.output.trim(), "plain");
    }

    #[tokio::test]
    async fn missing_file_is_a_read_failure() {
        let result = executor()
            .read_file(Path::new("/hostscan/no/such/file"))
            .await;
        assert!(matches!(result.failure, Some(ProbeError::Read { .. })));
    }

    #[tokio::test]
    async fn output_is_capped() {
        let exec = ShellExecutor::new(Arc::new(Unprivileged), 8);
        let cmd = ProbeCommand::new("printf 'abcdefghijklmnop'", Duration::from_secs(5));
        let result = exec.run(&cmd).await;
        assert!(result.output.starts_with("abcdefgh"));
        assert!(result.output.ends_with("[output truncated]"));
    }

    #[tokio::test]
    async fn capped_read_stops_keeping_bytes_at_the_limit() {
        let data = vec![b'x'; 64 * 1024];
        let captured = read_capped(&data[..], 10).await.unwrap();
        assert_eq!(captured.bytes.len(), 10);
        assert!(captured.truncated);

        let exact = read_capped(&b"abc"[..], 3).await.unwrap();
        assert_eq!(exact.bytes, b"abc");
        assert!(!exact.truncated);
    }

    #[tokio::test]
    async fn cap_cutting_a_character_stays_valid_text() {
        let captured = read_capped("ééé".as_bytes(), 3).await.unwrap();
        let text = captured.into_text();
        assert!(text.starts_with('é'));
        assert!(text.ends_with("[output truncated]"));
    }

    #[tokio::test]
    async fn large_output_is_drained_and_exit_status_kept() {
        let exec = ShellExecutor::new(Arc::new(Unprivileged), 16);
        let cmd = ProbeCommand::new(
            "i=0; while [ $i -lt 2000 ]; do echo line-$i; i=$((i+1)); done",
            Duration::from_secs(10),
        );
        let result = exec.run(&cmd).await;
        assert!(result.succeeded());
        assert!(result.output.starts_with("line-0\nline-1\n"));
        assert!(result.output.ends_with("[output truncated]"));
    }

    #[tokio::test]
    async fn file_reads_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big");
        std::fs::write(&path, "0123456789abcdef").unwrap();
        let exec = ShellExecutor::new(Arc::new(Unprivileged), 4);
        let result = exec.read_file(&path).await;
        assert_eq!(result.output, "0123\n[output truncated]");
    }

    #[tokio::test]
    async fn children_see_sbin_on_their_path() {
        let cmd = ProbeCommand::new("echo \"$PATH\"", Duration::from_secs(5));
        let result = executor().run(&cmd).await;
        let dirs: Vec<&str> = result.output.trim().split(':').collect();
        assert!(dirs.contains(&"/usr/sbin"));
        assert!(dirs.contains(&"/sbin"));
    }

    #[tokio::test]
    async fn every_tool_found_is_runnable_by_name() {
        for name in ["sh", "ip", "ss", "sysctl", "ldconfig", "blkid"] {
            if tools::find(name).is_none() {
                continue;
            }
            let cmd = ProbeCommand::new(format!("command -v {}", name), Duration::from_secs(5));
            let result = executor().run(&cmd).await;
            assert!(result.succeeded(), "{} found but not runnable: {:?}", name, result.failure);
        }
    }

    /// Whether `pid` is a live (non-zombie) process.
    fn running(pid: i32) -> bool {
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .ok()
            .and_then(|stat| {
                stat.rsplit_once(')')
                    .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            })
            .unwrap_or(false)
    }

    async fn gone_within(pid: i32, limit: Duration) -> bool {
        let started = std::time::Instant::now();
        while started.elapsed() < limit {
            if !running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    /// A pipeline whose first stage records its pid and then sleeps.
    fn sleeping_pipeline(pidfile: &Path) -> String {
        format!(
            "sh -c 'echo $$ > {}; exec sleep 30' | cat",
            pidfile.display()
        )
    }

    fn recorded_pid(pidfile: &Path) -> i32 {
        std::fs::read_to_string(pidfile)
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn timeout_kills_every_pipeline_stage() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("stage.pid");
        let cmd = ProbeCommand::new(sleeping_pipeline(&pidfile), Duration::from_millis(500));

        let result = executor().run(&cmd).await;
        assert!(matches!(result.failure, Some(ProbeError::TimedOut(_))));

        let pid = recorded_pid(&pidfile);
        assert!(gone_within(pid, Duration::from_secs(3)).await, "sleep {} survived", pid);
    }

    #[tokio::test]
    async fn abandoned_probe_kills_its_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("stage.pid");
        let cmd = ProbeCommand::new(sleeping_pipeline(&pidfile), Duration::from_secs(30));

        let exec = executor();
        let abandoned = tokio::time::timeout(Duration::from_millis(500), exec.run(&cmd)).await;
        assert!(abandoned.is_err());

        let pid = recorded_pid(&pidfile);
        assert!(gone_within(pid, Duration::from_secs(3)).await, "sleep {} survived", pid);
    }
}
