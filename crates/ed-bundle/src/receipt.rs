//! Human-readable receipt (`receipt.adoc`).
//!
//! AsciiDoc document with sections Summary, Commands Executed, Log Files,
//! Next Steps and License. Table columns are `Field|Value` and
//! `Command|Exit Code|Output Size`. Raw command output is never embedded.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use crate::host::HostFacts;
use crate::incident::LOGS_DIR_NAME;
use crate::manifest::MANIFEST_FILE_NAME;
use crate::Incident;

/// Receipt file name within the bundle.
pub const RECEIPT_FILE_NAME: &str = "receipt.adoc";

/// A file found under `logs/` when the receipt is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileEntry {
    pub name: String,
    pub bytes: u64,
}

/// List regular files in `logs_path`, sorted by name.
///
/// A missing directory (dry-run, or nothing captured yet) is an empty list.
pub fn list_log_files(logs_path: &Path) -> io::Result<Vec<LogFileEntry>> {
    let entries = match fs::read_dir(logs_path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            files.push(LogFileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                bytes: metadata.len(),
            });
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Render the receipt for a completed run.
pub fn render_receipt(
    incident: &Incident,
    host: &HostFacts,
    version: &str,
    log_files: &[LogFileEntry],
) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "= Incident Receipt: {}", incident.id);
    let _ = writeln!(out, ":toc:");
    let _ = writeln!(out);

    let _ = writeln!(out, "== Summary");
    let _ = writeln!(out);
    let _ = writeln!(out, "[cols=\"1,3\", options=\"header\"]");
    let _ = writeln!(out, "|===");
    let _ = writeln!(out, "|Field|Value");
    let rows = [
        ("Incident ID", incident.id.clone()),
        ("Created", incident.created_at.to_rfc3339()),
        ("Hostname", host.hostname.clone()),
        ("User", host.username.clone()),
        ("Working Directory", host.working_dir.clone()),
        ("Platform", format!("{}/{}", host.os, host.arch)),
        ("Kernel", host.kernel.clone()),
        ("Tool Version", version.to_string()),
        ("Dry Run", yes_no(incident.dry_run).to_string()),
        ("Bundle Path", incident.path.display().to_string()),
    ];
    for (field, value) in rows {
        let _ = writeln!(out, "|{}|{}", field, escape_cell(&value));
    }
    let _ = writeln!(out, "|===");
    let _ = writeln!(out);

    let _ = writeln!(out, "== Commands Executed");
    let _ = writeln!(out);
    let _ = writeln!(out, "[cols=\"2,1,1\", options=\"header\"]");
    let _ = writeln!(out, "|===");
    let _ = writeln!(out, "|Command|Exit Code|Output Size");
    for entry in &incident.commands {
        let _ = writeln!(
            out,
            "|{}|{}|{}",
            escape_cell(&entry.name),
            entry.exit_code,
            entry.output_len
        );
    }
    let _ = writeln!(out, "|===");
    let _ = writeln!(out);

    let _ = writeln!(out, "== Log Files");
    let _ = writeln!(out);
    if log_files.is_empty() {
        let _ = writeln!(out, "_No log files were captured._");
    } else {
        for file in log_files {
            let _ = writeln!(
                out,
                "* `{}/{}` ({} bytes)",
                LOGS_DIR_NAME, file.name, file.bytes
            );
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "== Next Steps");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        ". Review `{}` for the full command audit trail.",
        MANIFEST_FILE_NAME
    );
    let _ = writeln!(
        out,
        ". Inspect `{}/` for captured diagnostic output; failed modules produced nothing.",
        LOGS_DIR_NAME
    );
    let _ = writeln!(
        out,
        ". Attach the whole `{}` directory to the incident ticket before changing the host.",
        incident.id
    );
    let _ = writeln!(out, ". Re-run the trigger after remediation to capture a comparison bundle.");
    let _ = writeln!(out);

    let _ = writeln!(out, "== License");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated by emergency {}. Distributed under the MIT License.",
        version
    );

    out
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Table cells are delimited by `|`.
fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|")
}
