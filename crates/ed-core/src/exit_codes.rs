//! Exit codes for the emergency CLI.
//!
//! Capture is best effort, so a run that produced a bundle and a receipt
//! exits 0 no matter how many modules failed. Non-zero codes mean there is
//! no usable bundle.
//!
//! Exit code ranges:
//! - 0: bundle and receipt written (or planned, in dry-run)
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: internal errors

/// Exit codes for emergency operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Run completed
    Clean = 0,

    /// Invalid arguments
    ArgsError = 10,

    /// Config file missing or malformed
    ConfigError = 11,

    /// Bundle directory for this second already exists
    BundleExists = 14,

    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error creating the bundle or writing the receipt
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Stable name for machine-readable output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::BundleExists => "ERR_BUNDLE_EXISTS",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&ed_bundle::BundleError> for ExitCode {
    fn from(err: &ed_bundle::BundleError) -> Self {
        use ed_bundle::BundleError;
        match err {
            BundleError::AlreadyExists { .. } => ExitCode::BundleExists,
            BundleError::Io { .. } => ExitCode::IoError,
            BundleError::Json(_)
            | BundleError::UnsupportedVersion { .. }
            | BundleError::CorruptedManifest(_) => ExitCode::InternalError,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed_bundle::BundleError;
    use std::path::PathBuf;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::ConfigError.as_i32(), 11);
        assert_eq!(ExitCode::BundleExists.as_i32(), 14);
        assert_eq!(ExitCode::InternalError.as_i32(), 20);
        assert_eq!(ExitCode::IoError.as_i32(), 21);
    }

    #[test]
    fn test_from_bundle_error() {
        let exists = BundleError::AlreadyExists {
            path: PathBuf::from("/tmp/incident-x"),
        };
        assert_eq!(ExitCode::from(&exists), ExitCode::BundleExists);

        let io = BundleError::Io {
            path: PathBuf::from("/tmp/incident-x"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(ExitCode::from(&io), ExitCode::IoError);
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::BundleExists.to_string(), "ERR_BUNDLE_EXISTS (14)");
    }
}
