//! The `trigger` workflow: one emergency capture run from start to finish.
//!
//! create bundle → capture modules → backup → handoff → receipt
//!
//! Only bundle creation and the receipt write can fail the run. Everything
//! in between is best effort and reported in the returned summary.

use ed_bundle::{BundleManager, Incident};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::info;

use crate::backup::{run_backup, BackupPlan, BackupReport};
use crate::capture::{CaptureOrchestrator, CaptureResult, TargetOs, ToolConfig, ToolRunner};
use crate::config::Settings;
use crate::handoff::{handoff, HandoffOutcome};

/// Everything a trigger run needs, resolved from config and flags.
#[derive(Debug, Clone)]
pub struct TriggerOptions {
    pub base_dir: PathBuf,
    pub dry_run: bool,
    /// Catalog variant to run.
    pub os: TargetOs,
    pub capture: ToolConfig,
    /// Empty disables backup.
    pub backup_sources: Vec<PathBuf>,
    /// Defaults to `base_dir`.
    pub backup_dest: Option<PathBuf>,
    /// `None` disables handoff.
    pub handoff_tools: Option<Vec<String>>,
    pub handoff: ToolConfig,
}

impl TriggerOptions {
    /// Options from file settings, before CLI overrides.
    pub fn from_settings(settings: &Settings, dry_run: bool) -> Self {
        Self {
            base_dir: settings.bundle.base_dir.clone(),
            dry_run,
            os: TargetOs::detect(),
            capture: settings.capture.tool_config(),
            backup_sources: settings.backup.sources.clone(),
            backup_dest: settings.backup.dest.clone(),
            handoff_tools: None,
            handoff: settings
                .handoff
                .tool_config(settings.capture.max_output_bytes),
        }
    }
}

/// Outcome of a completed trigger run.
#[derive(Debug)]
pub struct TriggerReport {
    pub incident: Incident,
    pub results: Vec<CaptureResult>,
    pub backup: Option<BackupReport>,
    pub handoff: Option<HandoffOutcome>,
    pub receipt_path: PathBuf,
}

impl TriggerReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Console summary printed on stdout.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.incident.dry_run {
            let _ = writeln!(out, "[dry-run] nothing was written");
        }
        let _ = writeln!(out, "Incident bundle: {}", self.incident.path.display());

        let width = self.results.iter().map(|r| r.name.len()).max().unwrap_or(0);
        for r in &self.results {
            let mark = if r.success { "✓" } else { "✗" };
            match &r.error_msg {
                Some(msg) => {
                    let _ = writeln!(
                        out,
                        "  {} {:<width$}  {} ({})",
                        mark, r.name, r.display_name, msg
                    );
                }
                None => {
                    let _ = writeln!(out, "  {} {:<width$}  {}", mark, r.name, r.display_name);
                }
            }
        }
        let _ = writeln!(
            out,
            "Modules: {} succeeded, {} failed",
            self.succeeded(),
            self.results.len() - self.succeeded()
        );

        if let Some(backup) = &self.backup {
            if backup.dry_run {
                let _ = writeln!(
                    out,
                    "Backup: would copy {} source(s) to {}",
                    backup.plan.items.len(),
                    backup.plan.root.display()
                );
            } else {
                let _ = writeln!(
                    out,
                    "Backup: {} copied, {} failed -> {}",
                    backup.succeeded(),
                    backup.failed(),
                    backup.plan.root.display()
                );
            }
        }

        if let Some(outcome) = &self.handoff {
            let line = match outcome {
                HandoffOutcome::NoTool => "no analysis tool found".to_string(),
                HandoffOutcome::NoBundle => "skipped, bundle missing".to_string(),
                HandoffOutcome::Planned { tool, .. } => format!("would run {}", tool),
                HandoffOutcome::Ran { tool, success, .. } => {
                    format!("{} {}", tool, if *success { "completed" } else { "failed" })
                }
                HandoffOutcome::SpawnFailed { tool, error } => {
                    format!("{} did not start: {}", tool, error)
                }
            };
            let _ = writeln!(out, "Handoff: {}", line);
        }

        let _ = writeln!(out, "Receipt: {}", self.receipt_path.display());
        out
    }
}

/// Run one full emergency capture.
pub fn run_trigger(
    manager: &BundleManager,
    options: &TriggerOptions,
) -> ed_bundle::Result<TriggerReport> {
    let mut incident = manager.create_bundle(&options.base_dir, options.dry_run)?;

    let runner = ToolRunner::new(options.capture.clone());
    let orchestrator = CaptureOrchestrator::for_os(manager, options.os, runner.clone());
    let results = orchestrator.run_all(&mut incident, options.dry_run);

    let backup = if options.backup_sources.is_empty() {
        None
    } else {
        let dest = options
            .backup_dest
            .clone()
            .unwrap_or_else(|| options.base_dir.clone());
        let plan = BackupPlan::build(&options.backup_sources, &dest, &incident.created_at);
        Some(run_backup(&incident, plan, &runner, options.dry_run))
    };

    let handoff = options.handoff_tools.as_ref().map(|tools| {
        let runner = ToolRunner::new(options.handoff.clone());
        handoff(&incident, tools, &runner, options.dry_run)
    });

    let receipt_path = manager.write_receipt(&incident)?;

    info!(
        incident_id = %incident.id,
        path = %incident.path.display(),
        modules = results.len(),
        succeeded = results.iter().filter(|r| r.success).count(),
        "Emergency capture complete"
    );

    Ok(TriggerReport {
        incident,
        results,
        backup,
        handoff,
        receipt_path,
    })
}
