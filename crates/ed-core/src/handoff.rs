//! Hand the finished bundle to an external analysis tool.
//!
//! Known tool names are probed on `PATH` in order; the first one found is
//! run as `<tool> --incident <bundle path>`. Probe results and the tool's
//! output land in `logs/handoff.log`.

use ed_bundle::Incident;
use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::capture::tool_runner::ToolRunner;

/// Log written by a real handoff.
pub const HANDOFF_LOG_NAME: &str = "handoff";

/// Flag passing the bundle directory to the tool.
pub const INCIDENT_FLAG: &str = "--incident";

/// What the handoff did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// None of the tools is on PATH.
    NoTool,
    /// The bundle directory is missing, so there is nothing to hand over.
    NoBundle,
    /// Dry run: the tool that would have been started.
    Planned { tool: String, path: PathBuf },
    /// The tool ran to completion (or timed out).
    Ran {
        tool: String,
        path: PathBuf,
        exit_code: Option<i32>,
        success: bool,
    },
    /// The tool was found but could not be started.
    SpawnFailed { tool: String, error: String },
}

/// Locate an executable named `name` in a `PATH`-style list.
///
/// Resolution (executable bit, `PATHEXT` on Windows) is delegated to `which`.
pub fn find_in_path(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_default();
    match which::which_in(name, Some(path_var), cwd) {
        Ok(path) => Some(path),
        Err(e) => {
            debug!(tool = name, error = %e, "tool not found on PATH");
            None
        }
    }
}

/// Hand the bundle to the first of `tools` found on the process `PATH`.
pub fn handoff(
    incident: &Incident,
    tools: &[String],
    runner: &ToolRunner,
    dry_run: bool,
) -> HandoffOutcome {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    handoff_with_path(incident, tools, runner, dry_run, &path_var)
}

/// [`handoff`] against an explicit search path.
pub fn handoff_with_path(
    incident: &Incident,
    tools: &[String],
    runner: &ToolRunner,
    dry_run: bool,
    path_var: &OsStr,
) -> HandoffOutcome {
    let mut log = String::new();
    let mut chosen = None;
    for tool in tools {
        match find_in_path(tool, path_var) {
            Some(path) => {
                let _ = writeln!(log, "probe {}: {}", tool, path.display());
                chosen = Some((tool.clone(), path));
                break;
            }
            None => {
                let _ = writeln!(log, "probe {}: not found", tool);
            }
        }
    }

    let Some((tool, path)) = chosen else {
        info!(tools = ?tools, "No analysis tool on PATH, skipping handoff");
        if !dry_run {
            let _ = writeln!(log, "no analysis tool found");
            write_log(incident, &log);
        }
        return HandoffOutcome::NoTool;
    };

    if dry_run {
        info!(
            tool = %tool,
            path = %path.display(),
            incident = %incident.path.display(),
            "[dry-run] would hand off incident"
        );
        return HandoffOutcome::Planned { tool, path };
    }

    if !incident.path.is_dir() {
        warn!(path = %incident.path.display(), "bundle directory missing, skipping handoff");
        return HandoffOutcome::NoBundle;
    }

    info!(tool = %tool, incident = %incident.path.display(), "Handing off incident");
    let program = path.to_string_lossy().into_owned();
    let bundle = incident.path.to_string_lossy().into_owned();
    let outcome = match runner.run_tool(&program, &[INCIDENT_FLAG, &bundle]) {
        Ok(out) => {
            let _ = writeln!(
                log,
                "ran: {} {} {}\nexit code: {}{}",
                program,
                INCIDENT_FLAG,
                bundle,
                out.exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                if out.timed_out { " (timed out)" } else { "" }
            );
            let text = out.combined_str();
            if !text.is_empty() {
                let _ = writeln!(log, "--- output ---\n{}", text.trim_end());
            }
            if !out.success() {
                warn!(tool = %tool, exit_code = ?out.exit_code, "analysis tool failed");
            }
            HandoffOutcome::Ran {
                tool,
                path,
                exit_code: out.exit_code,
                success: out.success(),
            }
        }
        Err(e) => {
            warn!(tool = %tool, error = %e, "analysis tool did not start");
            let _ = writeln!(log, "spawn failed: {}", e);
            HandoffOutcome::SpawnFailed {
                tool,
                error: e.to_string(),
            }
        }
    };

    write_log(incident, &log);
    outcome
}

fn write_log(incident: &Incident, text: &str) {
    let path = incident.log_file(HANDOFF_LOG_NAME);
    if let Err(e) = fs::write(&path, text.as_bytes()) {
        warn!(path = %path.display(), error = %e, "failed to write handoff log");
    }
}
