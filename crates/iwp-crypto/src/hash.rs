use std::io::Read;

use sha2::{Digest, Sha256};

use crate::encrypt::read_full;
use crate::error::CryptoError;

/// Read buffer used when hashing streams.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 of everything remaining in `reader`, read in fixed-size chunks.
pub fn sha256_stream<R: Read>(reader: &mut R) -> Result<[u8; 32], CryptoError> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = read_full(reader, &mut buffer)?;
        hasher.update(&buffer[..n]);
        if n < buffer.len() {
            break;
        }
    }

    Ok(hasher.finalize().into())
}
