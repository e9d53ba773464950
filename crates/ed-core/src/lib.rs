//! Emergency diagnostics core library.
//!
//! - Capture catalog, tool runner and orchestrator
//! - Backup and handoff collaborators
//! - Configuration, logging and exit codes for the CLI
//!
//! Bundle layout and the manifest live in `ed-bundle`. The binary entry
//! point is in `main.rs`.

pub mod backup;
pub mod capture;
pub mod config;
pub mod exit_codes;
pub mod handoff;
pub mod logging;
pub mod trigger;
