//! Best-effort host fact probes.
//!
//! Every probe degrades to [`UNKNOWN`]; a failing probe is logged and never
//! surfaces as an error.

use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, trace};

/// Placeholder for facts that could not be determined.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Error)]
enum ProbeError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with status {status}")]
    Failed { command: String, status: String },

    #[error("{command} produced no output")]
    Empty { command: String },
}

/// Host identity and platform facts recorded in the manifest and receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub hostname: String,
    pub username: String,
    pub working_dir: String,
    pub os: String,
    pub arch: String,
    pub kernel: String,
}

impl HostFacts {
    /// Sample the live host.
    pub fn gather() -> Self {
        Self {
            hostname: hostname(),
            username: username(),
            working_dir: working_dir(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            kernel: kernel_version(),
        }
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn hostname() -> String {
    if let Some(name) = first_env(&["HOSTNAME", "COMPUTERNAME"]) {
        return name;
    }
    probe("hostname", &[]).unwrap_or_else(|e| {
        debug!(error = %e, "hostname probe failed");
        UNKNOWN.to_string()
    })
}

fn username() -> String {
    first_env(&["USER", "USERNAME", "LOGNAME"]).unwrap_or_else(|| UNKNOWN.to_string())
}

fn working_dir() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| UNKNOWN.to_string())
}

fn kernel_version() -> String {
    #[cfg(windows)]
    let result = probe("cmd", &["/C", "ver"]);
    #[cfg(not(windows))]
    let result = probe("uname", &["-r"]);

    result.unwrap_or_else(|e| {
        debug!(error = %e, "kernel probe failed");
        UNKNOWN.to_string()
    })
}

/// Run a short probe command and return its trimmed stdout.
fn probe(program: &str, args: &[&str]) -> Result<String, ProbeError> {
    trace!(program, ?args, "probing host");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|source| ProbeError::Spawn {
            command: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ProbeError::Failed {
            command: program.to_string(),
            status: output.status.to_string(),
        });
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        return Err(ProbeError::Empty {
            command: program.to_string(),
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_never_empty() {
        let facts = HostFacts::gather();

        assert!(!facts.hostname.is_empty());
        assert!(!facts.username.is_empty());
        assert!(!facts.working_dir.is_empty());
        assert_eq!(facts.os, std::env::consts::OS);
        assert_eq!(facts.arch, std::env::consts::ARCH);
        assert!(!facts.kernel.is_empty());
    }

    #[test]
    fn test_gather_is_stable() {
        assert_eq!(HostFacts::gather(), HostFacts::gather());
    }

    #[test]
    fn test_probe_missing_program() {
        let err = probe("definitely-not-a-real-binary-xyz", &[]).unwrap_err();
        assert!(matches!(err, ProbeError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_nonzero_exit() {
        let err = probe("false", &[]).unwrap_err();
        assert!(matches!(err, ProbeError::Failed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_empty_output() {
        let err = probe("true", &[]).unwrap_err();
        assert!(matches!(err, ProbeError::Empty { .. }));
    }
}
