//! Incident bundle layout, manifest and receipt for emergency diagnostics.
//!
//! One run produces one self-contained directory:
//!
//! ```text
//! incident-YYYYMMDD-HHmmss/
//!   incident.json      manifest, rewritten after every capture module
//!   receipt.adoc       human-readable summary, written last
//!   logs/<name>.log    captured output, one per module that produced any
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ed_bundle::BundleManager;
//! use std::path::Path;
//!
//! let manager = BundleManager::new("0.1.0", "trigger");
//! let mut incident = manager.create_bundle(Path::new("."), false).unwrap();
//! // ... capture modules append entries and checkpoint ...
//! manager.checkpoint(&incident);
//! manager.write_receipt(&incident).unwrap();
//! ```

pub mod error;
pub mod host;
pub mod incident;
pub mod lifecycle;
pub mod manifest;
pub mod receipt;

pub use error::{BundleError, Result};
pub use host::HostFacts;
pub use incident::{incident_id, Incident, LOGS_DIR_NAME};
pub use lifecycle::BundleManager;
pub use manifest::{
    CommandLogEntry, IncidentManifest, PlatformInfo, TriggerInfo, MANIFEST_FILE_NAME,
    MANIFEST_SCHEMA_VERSION,
};
pub use receipt::{list_log_files, render_receipt, LogFileEntry, RECEIPT_FILE_NAME};
