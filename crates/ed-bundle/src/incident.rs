//! The in-memory bundle handle.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::CommandLogEntry;

/// Prefix of every bundle directory name.
pub const INCIDENT_ID_PREFIX: &str = "incident-";

/// Per-module log directory inside the bundle.
pub const LOGS_DIR_NAME: &str = "logs";

/// Bundle identity for a creation timestamp.
///
/// Format: `incident-YYYYMMDD-HHmmss` (second resolution).
pub fn incident_id(ts: &DateTime<Local>) -> String {
    format!("{}{}", INCIDENT_ID_PREFIX, ts.format("%Y%m%d-%H%M%S"))
}

/// Handle for one bundle, owned by the run that created it.
///
/// Only its JSON projection ([`IncidentManifest`](crate::IncidentManifest))
/// is ever persisted.
#[derive(Debug, Clone)]
pub struct Incident {
    pub id: String,
    /// Bundle root directory (`<base_dir>/<id>`).
    pub path: PathBuf,
    /// Per-module log directory (`<path>/logs`).
    pub logs_path: PathBuf,
    pub created_at: DateTime<Local>,
    /// Whether this run mutates the filesystem at all.
    pub dry_run: bool,
    /// Log entries in module execution order.
    pub commands: Vec<CommandLogEntry>,
}

impl Incident {
    /// Describe the bundle for `created_at` under `base_dir` without touching disk.
    pub fn new(base_dir: &Path, created_at: DateTime<Local>, dry_run: bool) -> Self {
        let id = incident_id(&created_at);
        let path = base_dir.join(&id);
        let logs_path = path.join(LOGS_DIR_NAME);
        Self {
            id,
            path,
            logs_path,
            created_at,
            dry_run,
            commands: Vec::new(),
        }
    }

    /// Append a log entry. Entries are never modified after this.
    pub fn record(&mut self, entry: CommandLogEntry) {
        self.commands.push(entry);
    }

    /// Path of a module's log file.
    pub fn log_file(&self, module_name: &str) -> PathBuf {
        self.logs_path.join(format!("{}.log", module_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_incident_id_format() {
        let ts = Local.with_ymd_and_hms(2026, 1, 15, 14, 30, 22).unwrap();
        assert_eq!(incident_id(&ts), "incident-20260115-143022");
    }

    #[test]
    fn test_incident_paths() {
        let ts = Local.with_ymd_and_hms(2026, 1, 15, 9, 5, 3).unwrap();
        let incident = Incident::new(Path::new("/var/tmp"), ts, true);

        assert_eq!(incident.id, "incident-20260115-090503");
        assert_eq!(
            incident.path,
            PathBuf::from("/var/tmp/incident-20260115-090503")
        );
        assert_eq!(
            incident.logs_path,
            PathBuf::from("/var/tmp/incident-20260115-090503/logs")
        );
        assert_eq!(
            incident.log_file("disk"),
            PathBuf::from("/var/tmp/incident-20260115-090503/logs/disk.log")
        );
        assert!(incident.dry_run);
        assert!(incident.commands.is_empty());
    }
}
