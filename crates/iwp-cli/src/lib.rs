//! iwp - package and publish Win32 apps as `.intunewin` content
//!
//! This crate provides a command-line interface for:
//! - Packaging an installer or directory into a portal package
//! - Publishing a package to the device-management service, creating or
//!   updating the app
//! - Verifying and extracting the payload of a portal package

pub mod cli;
pub mod config;
pub mod output;

use iwp_package::PackageError;
use iwp_publish::PublishError;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{OutputFormat, OutputFormatter};

/// Exit codes for CLI operations
///
/// - 0: Success
/// - 1: General error
/// - 2: Invalid input - bad arguments, missing files, unusable config
/// - 3: Authentication failed - token missing or rejected
/// - 4: Timeout - remote state never reached
/// - 5: Type mismatch - existing app is of another kind
/// - 6: Upload failed - block upload or remote commit failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidInput = 2,
    AuthenticationFailed = 3,
    Timeout = 4,
    TypeMismatch = 5,
    UploadFailed = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::AuthenticationFailed => "AUTH_FAILED",
            ExitCode::Timeout => "TIMEOUT",
            ExitCode::TypeMismatch => "TYPE_MISMATCH",
            ExitCode::UploadFailed => "UPLOAD_FAILED",
        }
    }
}

impl From<&PackageError> for ExitCode {
    fn from(err: &PackageError) -> Self {
        match err {
            PackageError::NotFound(_)
            | PackageError::InvalidInstallerData { .. }
            | PackageError::InvalidPackage(_)
            | PackageError::Crypto(_) => ExitCode::InvalidInput,
            _ => ExitCode::GeneralError,
        }
    }
}

impl From<&PublishError> for ExitCode {
    fn from(err: &PublishError) -> Self {
        match err {
            PublishError::TypeMismatch { .. } => ExitCode::TypeMismatch,
            PublishError::RemoteStateTimeout { .. } => ExitCode::Timeout,
            PublishError::TransientUpload { .. }
            | PublishError::UploadFailed { .. }
            | PublishError::RemoteStateFailure { .. }
            | PublishError::Blob(_) => ExitCode::UploadFailed,
            PublishError::Backend { status: 401 | 403, .. } => ExitCode::AuthenticationFailed,
            PublishError::ConfigError(_) => ExitCode::InvalidInput,
            PublishError::Package(e) => ExitCode::from(e),
            _ => ExitCode::GeneralError,
        }
    }
}

#[cfg(test)]
mod exit_code_tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::InvalidInput as i32, 2);
        assert_eq!(ExitCode::AuthenticationFailed as i32, 3);
        assert_eq!(ExitCode::Timeout as i32, 4);
        assert_eq!(ExitCode::TypeMismatch as i32, 5);
        assert_eq!(ExitCode::UploadFailed as i32, 6);
        assert_eq!(ExitCode::TypeMismatch.name(), "TYPE_MISMATCH");
    }

    #[test]
    fn test_publish_error_mapping() {
        let mismatch = PublishError::TypeMismatch {
            app_id: "a".into(),
            expected: "win32LobApp".into(),
            actual: "windowsMobileMSI".into(),
        };
        assert_eq!(ExitCode::from(&mismatch), ExitCode::TypeMismatch);

        let timeout = PublishError::RemoteStateTimeout {
            expected: "commitFileSuccess".into(),
            elapsed_secs: 240,
        };
        assert_eq!(ExitCode::from(&timeout), ExitCode::Timeout);

        let denied = PublishError::Backend {
            operation: "create app".into(),
            status: 401,
            message: String::new(),
        };
        assert_eq!(ExitCode::from(&denied), ExitCode::AuthenticationFailed);

        let missing = PublishError::Package(PackageError::NotFound(PathBuf::from("setup.msi")));
        assert_eq!(ExitCode::from(&missing), ExitCode::InvalidInput);
    }
}
