//! Error types for content encryption.

use thiserror::Error;

/// Errors that can occur while encrypting, verifying or decrypting content.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Reading the source or writing the encrypted stream failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The OS random number generator could not produce key material
    #[error("random generator failure: {0}")]
    Rng(String),

    /// Cipher or padding failure
    #[error("cipher error: {0}")]
    Cipher(String),

    /// HMAC tag does not match the IV and ciphertext
    #[error("HMAC verification failed")]
    MacMismatch,

    /// SHA-256 of the decrypted content does not match the recorded digest
    #[error("file digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Encrypted stream is too short or not block aligned
    #[error("invalid encrypted layout: {0}")]
    InvalidLayout(String),
}
