//! Error types for packaging.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while assembling, writing or reading packages.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Source file, directory or setup file does not exist
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Installer database could not be read or is corrupt
    #[error("invalid installer data in {}: {reason}", path.display())]
    InvalidInstallerData { path: PathBuf, reason: String },

    /// Portal package is missing entries or has malformed metadata
    #[error("invalid package: {0}")]
    InvalidPackage(String),

    /// Detection.xml or installer manifest (de)serialization failed
    #[error("metadata serialization error: {0}")]
    Metadata(String),

    /// Zip archive error
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Encryption failed
    #[error("encryption error: {0}")]
    Crypto(#[from] iwp_crypto::CryptoError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackageError {
    pub(crate) fn invalid_installer(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PackageError::InvalidInstallerData {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
