//! The key/IV/MAC/digest bundle the backend needs to decrypt uploaded content.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 and HMAC-SHA256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES block / initialization vector length in bytes.
pub const IV_LEN: usize = 16;

/// HMAC-SHA256 tag length in bytes.
pub const MAC_LEN: usize = 32;

/// Bytes reserved at the start of the encrypted stream (tag + IV).
pub const HEADER_LEN: usize = MAC_LEN + IV_LEN;

/// Encryption profile tag expected by the backend.
pub const PROFILE_IDENTIFIER: &str = "ProfileVersion1";

/// Algorithm name for `file_digest`.
pub const DIGEST_ALGORITHM: &str = "SHA256";

/// Encryption parameters of one encrypted payload.
///
/// Produced once by [`crate::encrypt`] and never modified afterwards. Key
/// material is wiped when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionInfo {
    /// AES-256 key
    pub encryption_key: [u8; KEY_LEN],
    /// HMAC-SHA256 key
    pub mac_key: [u8; KEY_LEN],
    /// CBC initialization vector, also stored in clear at offset 32
    pub initialization_vector: [u8; IV_LEN],
    /// HMAC tag over IV + ciphertext
    pub mac: [u8; MAC_LEN],
    /// SHA-256 of the cleartext source
    pub file_digest: [u8; 32],
    #[zeroize(skip)]
    pub profile_identifier: &'static str,
    #[zeroize(skip)]
    pub file_digest_algorithm: &'static str,
}

impl EncryptionInfo {
    /// Assemble an info record from raw parts, with the fixed profile and
    /// digest algorithm.
    pub fn from_parts(
        encryption_key: [u8; KEY_LEN],
        mac_key: [u8; KEY_LEN],
        initialization_vector: [u8; IV_LEN],
        mac: [u8; MAC_LEN],
        file_digest: [u8; 32],
    ) -> Self {
        Self {
            encryption_key,
            mac_key,
            initialization_vector,
            mac,
            file_digest,
            profile_identifier: PROFILE_IDENTIFIER,
            file_digest_algorithm: DIGEST_ALGORITHM,
        }
    }

    /// Size of the encrypted stream for a cleartext of `cleartext_size` bytes.
    ///
    /// PKCS7 always adds between 1 and 16 bytes of padding.
    pub fn encrypted_size_for(cleartext_size: u64) -> u64 {
        let padded = (cleartext_size / IV_LEN as u64 + 1) * IV_LEN as u64;
        HEADER_LEN as u64 + padded
    }
}

impl std::fmt::Debug for EncryptionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionInfo")
            .field("encryption_key", &"<redacted>")
            .field("mac_key", &"<redacted>")
            .field("initialization_vector", &"<redacted>")
            .field("mac", &"<redacted>")
            .field("file_digest", &self.file_digest)
            .field("profile_identifier", &self.profile_identifier)
            .field("file_digest_algorithm", &self.file_digest_algorithm)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypted_size() {
        assert_eq!(EncryptionInfo::encrypted_size_for(0), 48 + 16);
        assert_eq!(EncryptionInfo::encrypted_size_for(15), 48 + 16);
        assert_eq!(EncryptionInfo::encrypted_size_for(16), 48 + 32);
        assert_eq!(EncryptionInfo::encrypted_size_for(17), 48 + 32);
    }

    #[test]
    fn test_debug_hides_keys() {
        let info = EncryptionInfo::from_parts([7; 32], [8; 32], [9; 16], [1; 32], [2; 32]);
        let rendered = format!("{info:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("7, 7, 7"));
        assert_eq!(info.profile_identifier, "ProfileVersion1");
        assert_eq!(info.file_digest_algorithm, "SHA256");
    }
}
