//! Capture orchestrator: run every catalog module against a bundle.
//!
//! Best effort throughout. A command that fails is skipped, a module whose
//! commands all fail is recorded as failed, and a log write that fails
//! downgrades only that module. After each module the manifest is
//! checkpointed so a crash leaves a record of everything completed.

use chrono::Local;
use ed_bundle::{BundleManager, CommandLogEntry, Incident};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::catalog::{catalog, CaptureModule, TargetOs};
use super::tool_runner::ToolRunner;

/// Separator used when recording a module's command lines in the manifest.
pub const COMMAND_SEPARATOR: &str = "; ";

/// Why a module did not contribute diagnostics.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no commands available for this platform")]
    NoCommands,

    #[error("no command produced usable output")]
    NoOutput,

    #[error("failed to write log {}: {source}", path.display())]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one module. Only its derived log entry and log file persist.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub name: String,
    pub display_name: String,
    /// At least one command exited 0 (and its output was persisted).
    pub success: bool,
    /// Aggregated output, each block headed by the command that produced it.
    pub output: String,
    pub error_msg: Option<String>,
    pub duration: Duration,
    /// Log file written for this module, if any.
    pub log_path: Option<PathBuf>,
}

impl CaptureResult {
    /// Derived 0/1 flag recorded as `exit_code` in the manifest.
    pub fn exit_flag(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

/// Header block for one contributing command.
pub fn format_block(command: &str, output: &str) -> String {
    let mut block = format!("=== {} ===\n{}", command, output);
    if !output.is_empty() && !output.ends_with('\n') {
        block.push('\n');
    }
    block
}

/// Runs the fixed module catalog, sequentially, against one incident.
pub struct CaptureOrchestrator<'a> {
    manager: &'a BundleManager,
    modules: Vec<CaptureModule>,
    runner: ToolRunner,
}

impl<'a> CaptureOrchestrator<'a> {
    pub fn new(
        manager: &'a BundleManager,
        modules: Vec<CaptureModule>,
        runner: ToolRunner,
    ) -> Self {
        Self {
            manager,
            modules,
            runner,
        }
    }

    /// Orchestrator for the catalog of `os`.
    pub fn for_os(manager: &'a BundleManager, os: TargetOs, runner: ToolRunner) -> Self {
        Self::new(manager, catalog(os), runner)
    }

    pub fn modules(&self) -> &[CaptureModule] {
        &self.modules
    }

    /// Run every module in catalog order, appending one entry per module to
    /// `incident` and checkpointing the manifest after each.
    pub fn run_all(&self, incident: &mut Incident, dry_run: bool) -> Vec<CaptureResult> {
        info!(
            incident_id = %incident.id,
            modules = self.modules.len(),
            dry_run,
            "Starting diagnostic capture"
        );

        let mut results = Vec::with_capacity(self.modules.len());
        for module in &self.modules {
            let started_at = Local::now();
            let mut result = self.run_module(module, dry_run);
            let ended_at = Local::now();

            if !dry_run && !result.output.is_empty() {
                match persist_log(&incident.logs_path, &module.name, &result.output) {
                    Ok(path) => result.log_path = Some(path),
                    Err(e) => {
                        warn!(module = %module.name, error = %e, "module log write failed");
                        result.success = false;
                        result.error_msg = Some(e.to_string());
                    }
                }
            }

            incident.record(CommandLogEntry {
                name: module.name.clone(),
                command: module.commands.join(COMMAND_SEPARATOR),
                started_at: started_at.to_rfc3339(),
                ended_at: ended_at.to_rfc3339(),
                exit_code: result.exit_flag(),
                output_len: result.output.len() as u64,
            });
            self.manager.checkpoint(incident);

            if result.success {
                info!(
                    module = %module.name,
                    output_len = result.output.len(),
                    duration_ms = result.duration.as_millis() as u64,
                    "capture module complete"
                );
            } else {
                warn!(
                    module = %module.name,
                    reason = result.error_msg.as_deref().unwrap_or("unknown"),
                    "capture module produced nothing"
                );
            }
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            incident_id = %incident.id,
            succeeded,
            failed = results.len() - succeeded,
            "Diagnostic capture finished"
        );
        results
    }

    /// Attempt every command of one module and aggregate what succeeded.
    ///
    /// Does not touch the filesystem.
    pub fn run_module(&self, module: &CaptureModule, dry_run: bool) -> CaptureResult {
        let start = Instant::now();
        let mut output = String::new();
        let mut success = false;

        for command in &module.commands {
            if dry_run {
                info!(module = %module.name, command = %command, "[dry-run] would run");
                output.push_str(&format_block(
                    command,
                    &format!("[dry-run] would run: {}\n", command),
                ));
                success = true;
                continue;
            }

            match self.runner.run_shell(command) {
                Ok(out) if out.success() => {
                    output.push_str(&format_block(command, &out.stdout_str()));
                    success = true;
                }
                Ok(out) => {
                    debug!(
                        module = %module.name,
                        command = %command,
                        exit_code = ?out.exit_code,
                        timed_out = out.timed_out,
                        "command failed, skipping"
                    );
                }
                Err(e) => {
                    debug!(
                        module = %module.name,
                        command = %command,
                        error = %e,
                        "command did not run, skipping"
                    );
                }
            }
        }

        let error_msg = if success {
            None
        } else if module.commands.is_empty() {
            Some(CaptureError::NoCommands.to_string())
        } else {
            Some(CaptureError::NoOutput.to_string())
        };

        CaptureResult {
            name: module.name.clone(),
            display_name: module.display_name.clone(),
            success,
            output,
            error_msg,
            duration: start.elapsed(),
            log_path: None,
        }
    }
}

fn persist_log(logs_path: &Path, name: &str, output: &str) -> Result<PathBuf, CaptureError> {
    let path = logs_path.join(format!("{}.log", name));
    fs::write(&path, output.as_bytes()).map_err(|source| CaptureError::LogWrite {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
