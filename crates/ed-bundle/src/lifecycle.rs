//! Bundle lifecycle: create the directory tree, checkpoint the manifest,
//! write the receipt.
//!
//! Every write path honors the handle's dry-run flag by logging what it
//! would have written and touching nothing.

use chrono::{DateTime, Local, SubsecRound};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::host::HostFacts;
use crate::manifest::MANIFEST_FILE_NAME;
use crate::receipt::{list_log_files, render_receipt, RECEIPT_FILE_NAME};
use crate::{BundleError, Incident, IncidentManifest, Result};

/// Creates and maintains incident bundles.
///
/// Carries the run-wide values that end up in every manifest, so nothing
/// here reads process globals.
#[derive(Debug, Clone)]
pub struct BundleManager {
    version: String,
    args: String,
}

impl BundleManager {
    /// `version` is the tool version, `args` the raw invocation arguments.
    pub fn new(version: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            args: args.into(),
        }
    }

    /// Create a bundle under `base_dir` stamped with the current time.
    pub fn create_bundle(&self, base_dir: &Path, dry_run: bool) -> Result<Incident> {
        self.create_bundle_at(base_dir, dry_run, Local::now())
    }

    /// Create a bundle for an explicit creation time.
    ///
    /// Fails with [`BundleError::AlreadyExists`] if the directory is present,
    /// leaving it untouched. In dry-run mode the same check runs but nothing
    /// is created.
    pub fn create_bundle_at(
        &self,
        base_dir: &Path,
        dry_run: bool,
        created_at: DateTime<Local>,
    ) -> Result<Incident> {
        let incident = Incident::new(base_dir, created_at.trunc_subsecs(0), dry_run);

        if incident.path.exists() {
            return Err(BundleError::AlreadyExists {
                path: incident.path.clone(),
            });
        }

        if dry_run {
            info!(
                incident_id = %incident.id,
                path = %incident.path.display(),
                logs = %incident.logs_path.display(),
                "[dry-run] would create incident bundle"
            );
            return Ok(incident);
        }

        fs::create_dir_all(base_dir).map_err(|e| BundleError::io(base_dir, e))?;

        // create_dir (not create_dir_all) so a concurrent run in the same
        // second loses the race instead of sharing the directory.
        fs::create_dir(&incident.path).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                BundleError::AlreadyExists {
                    path: incident.path.clone(),
                }
            } else {
                BundleError::io(&incident.path, e)
            }
        })?;
        fs::create_dir(&incident.logs_path)
            .map_err(|e| BundleError::io(&incident.logs_path, e))?;

        self.write_manifest(&incident)?;

        info!(
            incident_id = %incident.id,
            path = %incident.path.display(),
            "Incident bundle created"
        );
        Ok(incident)
    }

    /// Rebuild the manifest from the handle and rewrite `incident.json` wholesale.
    pub fn write_manifest(&self, incident: &Incident) -> Result<PathBuf> {
        let path = incident.path.join(MANIFEST_FILE_NAME);
        let host = HostFacts::gather();
        let manifest = IncidentManifest::build(incident, &host, &self.version, &self.args);
        let bytes = manifest.encode()?;

        if incident.dry_run {
            info!(
                path = %path.display(),
                bytes = bytes.len(),
                commands = manifest.commands.len(),
                "[dry-run] would write manifest"
            );
            return Ok(path);
        }

        write_atomic(&path, &bytes)?;
        debug!(
            path = %path.display(),
            commands = manifest.commands.len(),
            "Manifest written"
        );
        Ok(path)
    }

    /// Checkpoint the manifest; failure is logged and absorbed.
    ///
    /// Returns whether the checkpoint landed (always true in dry-run).
    pub fn checkpoint(&self, incident: &Incident) -> bool {
        match self.write_manifest(incident) {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    incident_id = %incident.id,
                    error = %e,
                    "manifest checkpoint failed, continuing"
                );
                false
            }
        }
    }

    /// Render and write `receipt.adoc`. Call after all capture modules ran.
    pub fn write_receipt(&self, incident: &Incident) -> Result<PathBuf> {
        let path = incident.path.join(RECEIPT_FILE_NAME);
        let host = HostFacts::gather();
        let log_files = list_log_files(&incident.logs_path)
            .map_err(|e| BundleError::io(&incident.logs_path, e))?;
        let text = render_receipt(incident, &host, &self.version, &log_files);

        if incident.dry_run {
            info!(
                path = %path.display(),
                bytes = text.len(),
                commands = incident.commands.len(),
                "[dry-run] would write receipt"
            );
            return Ok(path);
        }

        fs::write(&path, text.as_bytes()).map_err(|e| BundleError::io(&path, e))?;
        info!(
            path = %path.display(),
            commands = incident.commands.len(),
            log_files = log_files.len(),
            "Receipt written"
        );
        Ok(path)
    }
}

/// Write through a sibling temp file and rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(MANIFEST_FILE_NAME);
    let tmp_path = path.with_file_name(format!("{}.tmp.{}", file_name, std::process::id()));
    {
        let mut file = fs::File::create(&tmp_path).map_err(|e| BundleError::io(&tmp_path, e))?;
        file.write_all(bytes)
            .map_err(|e| BundleError::io(&tmp_path, e))?;
        let _ = file.sync_all();
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        BundleError::io(path, e)
    })
}
