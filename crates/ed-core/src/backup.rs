//! Whole-directory backup of user data alongside an incident.
//!
//! Each source directory is copied to
//! `<dest>/emergency-backup-<YYYYMMDD-HHmmss>/<basename>` with the platform
//! copy tool. The plan and the per-source outcome are written into the
//! bundle's `logs/` directory. Nothing here is fatal to the run.

use chrono::{DateTime, Local};
use ed_bundle::Incident;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::capture::tool_runner::ToolRunner;

/// Prefix of the per-run backup directory under the destination.
pub const BACKUP_DIR_PREFIX: &str = "emergency-backup-";

/// Log written before copying.
pub const PLAN_LOG_NAME: &str = "backup_plan";

/// Log written after copying.
pub const RESULT_LOG_NAME: &str = "backup_result";

/// One source directory and where it will land.
#[derive(Debug, Clone, Serialize)]
pub struct BackupItem {
    pub source: PathBuf,
    pub target: PathBuf,
    pub files: u64,
    pub bytes: u64,
    /// Why the source cannot be copied, if it cannot.
    pub problem: Option<String>,
}

/// The full set of copies for one run.
#[derive(Debug, Clone, Serialize)]
pub struct BackupPlan {
    /// `<dest>/emergency-backup-<timestamp>`
    pub root: PathBuf,
    pub items: Vec<BackupItem>,
}

impl BackupPlan {
    /// Plan copies of `sources` under `dest`, stamped with `timestamp`.
    ///
    /// Walks each source to size it; an unreadable source stays in the plan
    /// with its problem recorded.
    pub fn build(sources: &[PathBuf], dest: &Path, timestamp: &DateTime<Local>) -> Self {
        let root = dest.join(format!(
            "{}{}",
            BACKUP_DIR_PREFIX,
            timestamp.format("%Y%m%d-%H%M%S")
        ));

        let items = sources
            .iter()
            .map(|source| {
                let name = source
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| "root".into());
                let target = root.join(name);

                let (files, bytes, problem) = if !source.is_dir() {
                    (0, 0, Some("not a directory".to_string()))
                } else {
                    match walk(source) {
                        Ok(stats) => (stats.files, stats.bytes, None),
                        Err(e) => (0, 0, Some(e.to_string())),
                    }
                };

                BackupItem {
                    source: source.clone(),
                    target,
                    files,
                    bytes,
                    problem,
                }
            })
            .collect();

        Self { root, items }
    }

    pub fn total_files(&self) -> u64 {
        self.items.iter().map(|i| i.files).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|i| i.bytes).sum()
    }

    /// Plain-text plan for `backup_plan.log`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Backup root: {}", self.root.display());
        for item in &self.items {
            let _ = writeln!(
                out,
                "{} -> {} ({} files, {} bytes){}",
                item.source.display(),
                item.target.display(),
                item.files,
                item.bytes,
                item.problem
                    .as_deref()
                    .map(|p| format!(" [skip: {}]", p))
                    .unwrap_or_default()
            );
        }
        let _ = writeln!(
            out,
            "Total: {} files, {} bytes",
            self.total_files(),
            self.total_bytes()
        );
        out
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct WalkStats {
    files: u64,
    bytes: u64,
}

/// Count regular files and their bytes below `dir`. Symlinks are not followed.
fn walk(dir: &Path) -> Result<WalkStats, walkdir::Error> {
    let mut stats = WalkStats::default();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            stats.files += 1;
            stats.bytes += entry.metadata()?.len();
        }
    }
    Ok(stats)
}

/// Result of copying one source.
#[derive(Debug, Clone, Serialize)]
pub struct BackupOutcome {
    pub source: PathBuf,
    pub target: PathBuf,
    pub ok: bool,
    pub exit_code: Option<i32>,
    /// Tool output or the reason the copy did not run.
    pub detail: String,
}

/// Everything a backup run did.
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub plan: BackupPlan,
    pub outcomes: Vec<BackupOutcome>,
    pub dry_run: bool,
}

impl BackupReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.ok).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Plain-text outcome for `backup_result.log`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for o in &self.outcomes {
            let _ = writeln!(
                out,
                "[{}] {} -> {} (exit {})",
                if o.ok { "ok" } else { "failed" },
                o.source.display(),
                o.target.display(),
                o.exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            if !o.detail.is_empty() {
                let _ = writeln!(out, "{}", o.detail.trim_end());
            }
        }
        let _ = writeln!(
            out,
            "Summary: {} copied, {} failed",
            self.succeeded(),
            self.failed()
        );
        out
    }
}

/// Copy every planned source, logging plan and result into the bundle.
///
/// In dry-run nothing is created or copied and the plan is only logged.
pub fn run_backup(
    incident: &Incident,
    plan: BackupPlan,
    runner: &ToolRunner,
    dry_run: bool,
) -> BackupReport {
    info!(
        incident_id = %incident.id,
        root = %plan.root.display(),
        sources = plan.items.len(),
        files = plan.total_files(),
        bytes = plan.total_bytes(),
        dry_run,
        "Backup planned"
    );

    if dry_run {
        for item in &plan.items {
            info!(
                source = %item.source.display(),
                target = %item.target.display(),
                "[dry-run] would copy"
            );
        }
        return BackupReport {
            plan,
            outcomes: Vec::new(),
            dry_run,
        };
    }

    write_log(incident, PLAN_LOG_NAME, &plan.render());

    let outcomes = match fs::create_dir_all(&plan.root) {
        Ok(()) => plan.items.iter().map(|item| copy_item(item, runner)).collect(),
        Err(e) => {
            warn!(root = %plan.root.display(), error = %e, "cannot create backup root");
            plan.items
                .iter()
                .map(|item| BackupOutcome {
                    source: item.source.clone(),
                    target: item.target.clone(),
                    ok: false,
                    exit_code: None,
                    detail: format!("cannot create {}: {}", plan.root.display(), e),
                })
                .collect()
        }
    };

    let report = BackupReport {
        plan,
        outcomes,
        dry_run,
    };
    write_log(incident, RESULT_LOG_NAME, &report.render());

    if report.failed() > 0 {
        warn!(
            copied = report.succeeded(),
            failed = report.failed(),
            "Backup finished with failures"
        );
    } else {
        info!(copied = report.succeeded(), "Backup finished");
    }
    report
}

fn copy_item(item: &BackupItem, runner: &ToolRunner) -> BackupOutcome {
    let mut outcome = BackupOutcome {
        source: item.source.clone(),
        target: item.target.clone(),
        ok: false,
        exit_code: None,
        detail: String::new(),
    };

    if let Some(problem) = &item.problem {
        outcome.detail = format!("skipped: {}", problem);
        return outcome;
    }
    if item.target.exists() {
        outcome.detail = "skipped: target already exists".to_string();
        return outcome;
    }

    let source = item.source.to_string_lossy();
    let target = item.target.to_string_lossy();
    let (program, args) = copy_command(&source, &target);

    match runner.run_tool(program, &args) {
        Ok(out) => {
            outcome.ok = out.success();
            outcome.exit_code = out.exit_code;
            outcome.detail = out.combined_str();
            if !outcome.ok {
                warn!(source = %source, exit_code = ?out.exit_code, "copy failed");
            }
        }
        Err(e) => {
            warn!(source = %source, error = %e, "copy tool did not run");
            outcome.detail = e.to_string();
        }
    }
    outcome
}

#[cfg(not(windows))]
fn copy_command<'a>(source: &'a str, target: &'a str) -> (&'static str, Vec<&'a str>) {
    ("cp", vec!["-R", source, target])
}

#[cfg(windows)]
fn copy_command<'a>(source: &'a str, target: &'a str) -> (&'static str, Vec<&'a str>) {
    ("xcopy", vec![source, target, "/E", "/I", "/H", "/Y"])
}

fn write_log(incident: &Incident, name: &str, text: &str) {
    let path = incident.log_file(name);
    if let Err(e) = fs::write(&path, text.as_bytes()) {
        warn!(path = %path.display(), error = %e, "failed to write backup log");
    }
}
