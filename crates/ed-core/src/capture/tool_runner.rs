//! Tool runner with optional timeout and output cap.
//!
//! Runs diagnostic commands either through the platform shell
//! ([`ToolRunner::run_shell`]) or directly ([`ToolRunner::run_tool`]):
//!
//! - Optional per-command timeout with SIGTERM → SIGKILL escalation
//! - Output size cap to prevent memory exhaustion
//! - Shell runs merge stderr into stdout so the log reads like a terminal
//! - `LC_ALL=C` for stable, parseable output
//!
//! # Example
//!
//! ```ignore
//! use ed_core::capture::tool_runner::ToolRunnerBuilder;
//! use std::time::Duration;
//!
//! let runner = ToolRunnerBuilder::new().timeout(Some(Duration::from_secs(30))).build();
//! let output = runner.run_shell("df -h")?;
//! println!("{}", output.stdout_str());
//! ```

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};

/// Default maximum output size in bytes (10MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 500;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("command failed to spawn: {0}")]
    SpawnFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Output from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Command line that was executed.
    pub command: String,

    /// Standard output (may be truncated). Includes stderr for shell runs.
    pub stdout: Vec<u8>,

    /// Standard error (may be truncated). Empty for shell runs.
    pub stderr: Vec<u8>,

    /// Exit code (None when killed by a signal).
    pub exit_code: Option<i32>,

    /// Whether output was truncated.
    pub truncated: bool,

    /// Execution duration.
    pub duration: Duration,

    /// Whether the command was killed for exceeding the timeout.
    pub timed_out: bool,
}

impl ToolOutput {
    /// Get stdout as string (lossy UTF-8 conversion).
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Stdout followed by stderr, lossy UTF-8.
    pub fn combined_str(&self) -> String {
        let mut text = self.stdout_str();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }

    /// Exit code 0 within the time limit.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Configuration for the tool runner.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Per-command timeout; `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// Maximum output size per stream in bytes.
    pub max_output_bytes: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Sequential command runner.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    config: ToolConfig,
}

impl ToolRunner {
    /// Create a new tool runner with the given configuration.
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    /// Create a tool runner with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ToolConfig::default())
    }

    /// Run a command line through the platform shell (`sh -c` / `cmd /C`).
    ///
    /// Shell operators (`||`, pipes) are allowed; stderr is merged into stdout.
    #[instrument(skip(self))]
    pub fn run_shell(&self, line: &str) -> Result<ToolOutput, ToolError> {
        if line.trim().is_empty() {
            return Err(ToolError::InvalidCommand("empty command line".to_string()));
        }
        let mut command = shell_command(line);
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());
        self.spawn_and_capture(line, command)
    }

    /// Run a program directly with arguments, capturing stdout and stderr.
    #[instrument(skip(self), fields(cmd = %cmd))]
    pub fn run_tool(&self, cmd: &str, args: &[&str]) -> Result<ToolOutput, ToolError> {
        validate_program(cmd)?;
        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let label = std::iter::once(cmd)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.spawn_and_capture(&label, command)
    }

    fn spawn_and_capture(
        &self,
        label: &str,
        mut command: Command,
    ) -> Result<ToolOutput, ToolError> {
        command.env("LC_ALL", "C").env("LANG", "C");

        // Own process group so a timeout can take down the whole pipeline.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        debug!(
            command = label,
            timeout_ms = self.config.timeout.map(|t| t.as_millis() as u64),
            max_output = self.config.max_output_bytes,
            "running tool"
        );

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            debug!(command = label, error = %e, "failed to spawn");
            ToolError::SpawnFailed(format!("{}: {}", label, e))
        })?;

        let deadline = self.config.timeout.map(|t| start + t);
        let (stdout, stderr, exit_code, truncated, timed_out) =
            self.execute_with_deadline(&mut child, deadline, self.config.max_output_bytes)?;

        let duration = start.elapsed();
        if truncated {
            warn!(
                command = label,
                limit = self.config.max_output_bytes,
                "tool output truncated"
            );
        }
        debug!(
            command = label,
            exit_code = ?exit_code,
            timed_out,
            duration_ms = duration.as_millis() as u64,
            "tool execution complete"
        );

        Ok(ToolOutput {
            command: label.to_string(),
            stdout,
            stderr,
            exit_code,
            truncated,
            duration,
            timed_out,
        })
    }

    /// Read the child's pipes until it exits or the deadline passes.
    #[allow(clippy::type_complexity)]
    fn execute_with_deadline(
        &self,
        child: &mut Child,
        deadline: Option<Instant>,
        max_output: usize,
    ) -> Result<(Vec<u8>, Vec<u8>, Option<i32>, bool, bool), ToolError> {
        let mut stdout_buf = Vec::with_capacity(max_output.min(65536));
        let mut stderr_buf = Vec::new();
        let mut truncated = false;
        let mut timed_out = false;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let mut chunk = vec![0u8; 8192];

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                timed_out = true;
                warn!("command timed out, sending SIGTERM");
                kill_with_grace(child);
                break;
            }

            let mut did_read = false;

            if let Some(ref mut out) = stdout {
                if let Ok(n) = try_read_nonblocking(out, &mut chunk) {
                    if n > 0 {
                        did_read = true;
                        append_capped(&mut stdout_buf, &chunk[..n], max_output, &mut truncated);
                    }
                }
            }

            if let Some(ref mut err) = stderr {
                if let Ok(n) = try_read_nonblocking(err, &mut chunk) {
                    if n > 0 {
                        did_read = true;
                        append_capped(&mut stderr_buf, &chunk[..n], max_output, &mut truncated);
                    }
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    if let Some(ref mut out) = stdout {
                        let _ = drain_to_limit(out, &mut stdout_buf, max_output, &mut truncated);
                    }
                    if let Some(ref mut err) = stderr {
                        let _ = drain_to_limit(err, &mut stderr_buf, max_output, &mut truncated);
                    }
                    let exit_code = status.code();
                    trace!(exit_code = ?exit_code, "process exited");
                    return Ok((stdout_buf, stderr_buf, exit_code, truncated, timed_out));
                }
                Ok(None) => {
                    if !did_read {
                        thread::sleep(Duration::from_millis(10));
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to wait for child");
                    return Err(ToolError::Io(e));
                }
            }
        }

        let status = child.wait().ok();
        let exit_code = status.and_then(|s| s.code());
        Ok((stdout_buf, stderr_buf, exit_code, truncated, timed_out))
    }
}

fn shell_command(line: &str) -> Command {
    #[cfg(windows)]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(format!("({}) 2>&1", line));
        command
    }
    #[cfg(not(windows))]
    {
        let mut command = Command::new("sh");
        command.arg("-c").arg(format!("exec 2>&1; {}", line));
        command
    }
}

/// Direct program invocations must not smuggle shell syntax.
///
/// Absolute paths are already resolved and are exempt: directory names may
/// legitimately contain these characters.
fn validate_program(cmd: &str) -> Result<(), ToolError> {
    if cmd.trim().is_empty() {
        return Err(ToolError::InvalidCommand("empty program name".to_string()));
    }
    if Path::new(cmd).is_absolute() {
        return Ok(());
    }
    if cmd.contains(['|', '&', ';', '$', '`', '\n', '\r']) {
        return Err(ToolError::InvalidCommand(format!(
            "program contains shell metacharacters: {}",
            cmd
        )));
    }
    Ok(())
}

fn append_capped(buf: &mut Vec<u8>, data: &[u8], max: usize, truncated: &mut bool) {
    let space = max.saturating_sub(buf.len());
    if space > 0 {
        let to_copy = data.len().min(space);
        buf.extend_from_slice(&data[..to_copy]);
        if data.len() > space {
            *truncated = true;
        }
    } else if !data.is_empty() {
        *truncated = true;
    }
}

/// Drain remaining data from a stream up to the limit.
///
/// Non-blocking, so a grandchild still holding the pipe open cannot hang us.
fn drain_to_limit<R: Read + AsFdLike>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) -> std::io::Result<()> {
    let mut chunk = vec![0u8; 8192];
    loop {
        if *truncated {
            break;
        }
        match try_read_nonblocking(stream, &mut chunk) {
            Ok(0) => break,
            Ok(n) => append_capped(buf, &chunk[..n], max, truncated),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Kill the child's process group with SIGTERM, then SIGKILL after a grace period.
#[cfg(unix)]
fn kill_with_grace(child: &mut Child) {
    let pgid = child.id() as i32;

    // SAFETY: signalling a process group we created; no memory is touched.
    unsafe {
        libc::kill(-pgid, libc::SIGTERM);
    }
    debug!(pgid, "sent SIGTERM");

    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

    match child.try_wait() {
        Ok(Some(_)) => {
            trace!(pgid, "process exited after SIGTERM");
        }
        Ok(None) => {
            warn!(pgid, "process did not exit after SIGTERM, sending SIGKILL");
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
            let _ = child.wait();
        }
        Err(e) => {
            error!(pgid, error = %e, "failed to check process status");
        }
    }
}

#[cfg(not(unix))]
fn kill_with_grace(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
use std::os::unix::io::AsRawFd as AsFdLike;

#[cfg(not(unix))]
trait AsFdLike {}
#[cfg(not(unix))]
impl<T> AsFdLike for T {}

/// Try to read from a stream without blocking.
///
/// Sets O_NONBLOCK for the duration of the read and restores the original
/// flags. Returns Ok(0) if no data is available (EAGAIN/EWOULDBLOCK).
#[cfg(unix)]
fn try_read_nonblocking<R: Read + AsFdLike>(
    stream: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    // SAFETY: fd is owned by `stream` and stays open for this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

/// Falls back to a blocking read.
#[cfg(not(unix))]
fn try_read_nonblocking<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    stream.read(buf)
}

/// Builder for creating a tool runner with custom configuration.
#[derive(Debug, Default)]
pub struct ToolRunnerBuilder {
    config: ToolConfig,
}

impl ToolRunnerBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-command timeout (`None` disables it).
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the maximum output size.
    pub fn max_output(mut self, max_bytes: usize) -> Self {
        self.config.max_output_bytes = max_bytes;
        self
    }

    /// Build the tool runner.
    pub fn build(self) -> ToolRunner {
        ToolRunner::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_run_shell_echo() {
        let runner = ToolRunner::with_defaults();
        let output = runner.run_shell("echo hello world").unwrap();

        assert!(output.success());
        assert_eq!(output.stdout_str(), "hello world\n");
        assert_eq!(output.command, "echo hello world");
        assert!(!output.truncated);
        assert!(!output.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_shell_merges_stderr() {
        let runner = ToolRunner::with_defaults();
        let output = runner.run_shell("echo out; echo err >&2").unwrap();

        assert!(output.success());
        let text = output.stdout_str();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
        assert!(output.stderr.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_shell_fallback_operator() {
        let runner = ToolRunner::with_defaults();
        let output = runner
            .run_shell("definitely-missing-tool-xyz || echo fallback")
            .unwrap();

        assert!(output.success());
        assert!(output.stdout_str().contains("fallback"));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit() {
        let runner = ToolRunner::with_defaults();
        let output = runner.run_shell("exit 42").unwrap();

        assert!(!output.success());
        assert_eq!(output.exit_code, Some(42));
    }

    #[test]
    fn test_empty_command_line() {
        let runner = ToolRunner::with_defaults();
        assert!(matches!(
            runner.run_shell("   "),
            Err(ToolError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_run_tool_missing_program() {
        let runner = ToolRunner::with_defaults();
        let result = runner.run_tool("/nonexistent/command/that/does/not/exist", &[]);
        assert!(matches!(result, Err(ToolError::SpawnFailed(_))));
    }

    #[test]
    fn test_run_tool_rejects_metachars() {
        let runner = ToolRunner::with_defaults();
        match runner.run_tool("echo; rm -rf /", &[]) {
            Err(ToolError::InvalidCommand(_)) => {}
            other => panic!("expected InvalidCommand, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_absolute_path_with_metachars() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let bin = dir.path().join("opt$tools;v2&x");
        std::fs::create_dir_all(&bin).unwrap();
        let script = bin.join("report");
        std::fs::write(&script, "#!/bin/sh\necho \"report $1\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = ToolRunner::with_defaults();
        let output = runner
            .run_tool(script.to_str().unwrap(), &["--incident"])
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout_str(), "report --incident\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_captures_both_streams() {
        let runner = ToolRunner::with_defaults();
        let output = runner
            .run_tool("sh", &["-c", "echo out; echo err >&2"])
            .unwrap();

        assert!(output.success());
        assert_eq!(output.command, "sh -c echo out; echo err >&2");
        assert_eq!(output.stdout_str(), "out\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
        assert_eq!(output.combined_str(), "out\nerr\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout() {
        let runner = ToolRunnerBuilder::new()
            .timeout(Some(Duration::from_millis(200)))
            .build();

        let output = runner.run_shell("sleep 10").unwrap();

        assert!(output.timed_out, "expected timed_out, got {:?}", output);
        assert!(!output.success());
        assert!(output.duration < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_truncation() {
        let runner = ToolRunnerBuilder::new().max_output(100).build();

        let output = runner.run_shell("yes | head -n 1000").unwrap();

        assert!(output.truncated);
        assert!(output.stdout.len() <= 100);
    }

    #[test]
    fn test_append_capped() {
        let mut buf = Vec::new();
        let mut truncated = false;

        append_capped(&mut buf, b"abc", 5, &mut truncated);
        assert!(!truncated);
        append_capped(&mut buf, b"defg", 5, &mut truncated);
        assert!(truncated);
        assert_eq!(buf, b"abcde");
    }

    #[test]
    fn test_config_defaults() {
        let config = ToolConfig::default();
        assert_eq!(config.timeout, None);
        assert_eq!(config.max_output_bytes, 10 * 1024 * 1024);
    }
}
