//! Incident manifest types and serialization.
//!
//! The manifest (`incident.json`) is the machine-readable projection of an
//! [`Incident`](crate::Incident):
//! - Bundle identity and creation time
//! - Host facts (hostname, user, working directory, platform)
//! - Trigger parameters (tool version, dry-run flag, raw arguments)
//! - One log entry per capture module, in execution order
//!
//! Field order follows struct declaration order, so two encodings of the
//! same state are byte-identical.

use serde::{Deserialize, Serialize};

use crate::host::HostFacts;
use crate::{BundleError, Incident, Result};

/// Current manifest schema version.
pub const MANIFEST_SCHEMA_VERSION: &str = "1.0";

/// Manifest file name within the bundle.
pub const MANIFEST_FILE_NAME: &str = "incident.json";

/// The `incident.json` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentManifest {
    /// Manifest format version, always [`MANIFEST_SCHEMA_VERSION`].
    pub schema_version: String,

    /// Bundle identity (`incident-YYYYMMDD-HHmmss`).
    pub id: String,

    /// When the bundle was created (RFC3339).
    pub created_at: String,

    pub hostname: String,
    pub username: String,
    pub working_dir: String,

    pub platform: PlatformInfo,

    pub trigger: TriggerInfo,

    /// Snapshot of every command log entry recorded so far.
    pub commands: Vec<CommandLogEntry>,
}

/// Platform facts sampled when the manifest is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    /// Kernel version, or `"unknown"` when the probe failed.
    pub kernel: String,
}

/// What started this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInfo {
    /// Version of the tool that produced the bundle.
    pub version: String,
    pub dry_run: bool,
    /// Raw argument string the tool was invoked with.
    pub args: String,
}

/// Audit record for one capture module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLogEntry {
    /// Module identifier (e.g. `disk`).
    pub name: String,

    /// Command line(s) attempted, joined with `"; "`.
    pub command: String,

    pub started_at: String,
    pub ended_at: String,

    /// Derived success flag kept under its historical name: `0` when at least
    /// one command of the module succeeded, `1` otherwise. This is not a
    /// process exit status.
    pub exit_code: i32,

    /// Byte length of the aggregated output (the output itself lives in
    /// `logs/<name>.log`).
    pub output_len: u64,
}

impl CommandLogEntry {
    /// Whether the module contributed any output.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

impl IncidentManifest {
    /// Build a manifest snapshot from the handle and freshly gathered host facts.
    pub fn build(
        incident: &Incident,
        host: &HostFacts,
        version: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            id: incident.id.clone(),
            created_at: incident.created_at.to_rfc3339(),
            hostname: host.hostname.clone(),
            username: host.username.clone(),
            working_dir: host.working_dir.clone(),
            platform: PlatformInfo {
                os: host.os.clone(),
                arch: host.arch.clone(),
                kernel: host.kernel.clone(),
            },
            trigger: TriggerInfo {
                version: version.into(),
                dry_run: incident.dry_run,
                args: args.into(),
            },
            commands: incident.commands.clone(),
        }
    }

    /// Reject manifests this version cannot interpret.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(BundleError::UnsupportedVersion {
                version: self.schema_version.clone(),
                supported: MANIFEST_SCHEMA_VERSION.to_string(),
            });
        }

        if self.id.is_empty() {
            return Err(BundleError::CorruptedManifest("id is empty".to_string()));
        }

        for entry in &self.commands {
            if entry.name.is_empty() {
                return Err(BundleError::CorruptedManifest(
                    "command entry has empty name".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Parse and validate a manifest.
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::path::Path;

    fn host() -> HostFacts {
        HostFacts {
            hostname: "web-01".to_string(),
            username: "oncall".to_string(),
            working_dir: "/srv".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            kernel: "6.1.0".to_string(),
        }
    }

    fn incident() -> Incident {
        let ts = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let mut incident = Incident::new(Path::new("/tmp"), ts, false);
        incident.record(CommandLogEntry {
            name: "disk".to_string(),
            command: "df -h".to_string(),
            started_at: ts.to_rfc3339(),
            ended_at: ts.to_rfc3339(),
            exit_code: 0,
            output_len: 42,
        });
        incident
    }

    #[test]
    fn test_build_copies_handle_state() {
        let manifest = IncidentManifest::build(&incident(), &host(), "0.1.0", "trigger");

        assert_eq!(manifest.schema_version, "1.0");
        assert_eq!(manifest.id, "incident-20260304-050607");
        assert_eq!(manifest.platform.kernel, "6.1.0");
        assert_eq!(manifest.trigger.args, "trigger");
        assert!(!manifest.trigger.dry_run);
        assert_eq!(manifest.commands.len(), 1);
        assert!(manifest.commands[0].succeeded());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let manifest = IncidentManifest::build(&incident(), &host(), "0.1.0", "trigger");

        let first = manifest.encode().unwrap();
        let second = manifest.encode().unwrap();

        assert_eq!(first, second);
        assert!(first.ends_with(b"}\n"));
    }

    #[test]
    fn test_encode_field_order() {
        let manifest = IncidentManifest::build(&incident(), &host(), "0.1.0", "trigger");
        let text = String::from_utf8(manifest.encode().unwrap()).unwrap();

        let keys = [
            "\"schema_version\"",
            "\"id\"",
            "\"created_at\"",
            "\"hostname\"",
            "\"username\"",
            "\"working_dir\"",
            "\"platform\"",
            "\"trigger\"",
            "\"commands\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| text.find(k).unwrap()).collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);

        // Pretty-printed
        assert!(text.contains("\n  \"id\": \"incident-20260304-050607\""));
    }

    #[test]
    fn test_from_json_rejects_unknown_version() {
        let mut manifest = IncidentManifest::build(&incident(), &host(), "0.1.0", "trigger");
        manifest.schema_version = "2.0".to_string();
        let json = serde_json::to_string(&manifest).unwrap();

        match IncidentManifest::from_json(&json) {
            Err(BundleError::UnsupportedVersion { version, .. }) => assert_eq!(version, "2.0"),
            other => panic!("expected UnsupportedVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_roundtrip() {
        let manifest = IncidentManifest::build(&incident(), &host(), "0.1.0", "trigger");
        let bytes = manifest.encode().unwrap();
        let parsed = IncidentManifest::from_json(std::str::from_utf8(&bytes).unwrap()).unwrap();

        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_failed_entry_flag() {
        let entry = CommandLogEntry {
            name: "memory".to_string(),
            command: String::new(),
            started_at: String::new(),
            ended_at: String::new(),
            exit_code: 1,
            output_len: 0,
        };
        assert!(!entry.succeeded());
    }
}
