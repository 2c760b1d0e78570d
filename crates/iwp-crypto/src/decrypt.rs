//! Verification and decryption of `.intunewin` encrypted streams.

use std::io::{Read, Seek, SeekFrom, Write};

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::encrypt::CHUNK_SIZE;
use crate::error::CryptoError;
use crate::info::{EncryptionInfo, HEADER_LEN, IV_LEN, MAC_LEN};

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Check the stored tag and the recorded tag against a fresh HMAC over
/// IV + ciphertext.
///
/// Returns the total stream length on success. Comparisons are constant time.
pub fn verify_mac<R: Read + Seek>(stream: &mut R, info: &EncryptionInfo) -> Result<u64, CryptoError> {
    let total_len = stream.seek(SeekFrom::End(0))?;
    check_layout(total_len)?;

    stream.seek(SeekFrom::Start(0))?;
    let mut stored_tag = [0u8; MAC_LEN];
    stream.read_exact(&mut stored_tag)?;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&info.mac_key)
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = stream.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        mac.update(&buffer[..n]);
    }
    let computed: [u8; MAC_LEN] = mac.finalize().into_bytes().into();

    if !constant_time_eq(&computed, &stored_tag) || !constant_time_eq(&computed, &info.mac) {
        warn!(total_len, "Encrypted content failed HMAC verification");
        return Err(CryptoError::MacMismatch);
    }

    stream.seek(SeekFrom::Start(0))?;
    Ok(total_len)
}

/// Verify and decrypt `stream` into `out`, returning the cleartext length.
///
/// The HMAC is checked before any plaintext is written, and the SHA-256 of
/// the produced plaintext is compared with `info.file_digest` at the end.
pub fn decrypt<R, W>(stream: &mut R, info: &EncryptionInfo, out: &mut W) -> Result<u64, CryptoError>
where
    R: Read + Seek,
    W: Write,
{
    let total_len = verify_mac(stream, info)?;

    stream.seek(SeekFrom::Start(MAC_LEN as u64))?;
    let mut iv = [0u8; IV_LEN];
    stream.read_exact(&mut iv)?;

    let mut cipher = Aes256CbcDec::new(&info.encryption_key.into(), &iv.into());
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut remaining = total_len - HEADER_LEN as u64;
    let mut written: u64 = 0;

    // Everything except the final block decrypts without padding handling.
    while remaining > IV_LEN as u64 {
        let take = (remaining - IV_LEN as u64).min(CHUNK_SIZE as u64) as usize;
        stream.read_exact(&mut buffer[..take])?;
        for block in buffer[..take].chunks_exact_mut(IV_LEN) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        hasher.update(&buffer[..take]);
        out.write_all(&buffer[..take])?;
        written += take as u64;
        remaining -= take as u64;
    }

    let mut last = [0u8; IV_LEN];
    stream.read_exact(&mut last)?;
    let tail = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut last)
        .map_err(|_| CryptoError::Cipher("invalid PKCS7 padding".to_string()))?;
    hasher.update(tail);
    out.write_all(tail)?;
    written += tail.len() as u64;
    out.flush()?;

    let digest: [u8; 32] = hasher.finalize().into();
    if !constant_time_eq(&digest, &info.file_digest) {
        return Err(CryptoError::DigestMismatch {
            expected: hex::encode(info.file_digest),
            actual: hex::encode(digest),
        });
    }

    debug!(cleartext_len = written, "Content decrypted");
    Ok(written)
}

fn check_layout(total_len: u64) -> Result<(), CryptoError> {
    if total_len < (HEADER_LEN + IV_LEN) as u64 {
        return Err(CryptoError::InvalidLayout(format!(
            "stream of {total_len} bytes is shorter than header plus one block"
        )));
    }
    if (total_len - HEADER_LEN as u64) % IV_LEN as u64 != 0 {
        return Err(CryptoError::InvalidLayout(format!(
            "ciphertext of {} bytes is not block aligned",
            total_len - HEADER_LEN as u64
        )));
    }
    Ok(())
}
