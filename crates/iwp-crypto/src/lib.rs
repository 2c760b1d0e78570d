//! Content encryption for the `.intunewin` payload format.
//!
//! The encrypted stream layout is fixed:
//!
//! ```text
//! [32-byte HMAC-SHA256 tag][16-byte IV][AES-256-CBC / PKCS7 ciphertext]
//! ```
//!
//! The tag is keyed by an independent MAC key and covers the IV and the
//! ciphertext, never itself. A SHA-256 digest of the cleartext source is
//! reported alongside so the backend can verify the decrypted payload.

#![forbid(unsafe_code)]

pub mod decrypt;
pub mod encrypt;
pub mod error;
pub mod hash;
pub mod info;

#[cfg(test)]
mod proptests;

pub use decrypt::{decrypt, verify_mac};
pub use encrypt::encrypt;
pub use error::CryptoError;
pub use hash::{sha256, sha256_stream};
pub use info::{
    EncryptionInfo, DIGEST_ALGORITHM, HEADER_LEN, IV_LEN, KEY_LEN, MAC_LEN, PROFILE_IDENTIFIER,
};
