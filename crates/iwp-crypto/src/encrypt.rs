//! Streaming encryption of a cleartext source into the `.intunewin` layout.

use std::io::{Read, Seek, SeekFrom, Write};

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::error::CryptoError;
use crate::hash::sha256_stream;
use crate::info::{EncryptionInfo, HEADER_LEN, IV_LEN, KEY_LEN, MAC_LEN};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Cleartext bytes encrypted per iteration. Must be a multiple of the AES block size.
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

/// Encrypt `source` into `out` and return the parameters needed to decrypt it.
///
/// `out` receives `[HMAC][IV][ciphertext]` starting at its current position
/// 0; callers pass an empty stream. The source is streamed in fixed-size
/// chunks and then rewound and hashed a second time for the cleartext
/// digest, so memory use does not depend on the payload size.
pub fn encrypt<R, W>(source: &mut R, out: &mut W) -> Result<EncryptionInfo, CryptoError>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let encryption_key = random_bytes::<KEY_LEN>()?;
    let mac_key = random_bytes::<KEY_LEN>()?;
    let iv = random_bytes::<IV_LEN>()?;

    source.seek(SeekFrom::Start(0))?;
    out.seek(SeekFrom::Start(0))?;
    out.write_all(&[0u8; HEADER_LEN])?;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&mac_key)
        .map_err(|e| CryptoError::Cipher(e.to_string()))?;
    mac.update(&iv);

    let mut cipher = Aes256CbcEnc::new(&encryption_key.into(), &iv.into());
    let mut buffer = vec![0u8; CHUNK_SIZE + IV_LEN];
    let mut cleartext_len: u64 = 0;

    loop {
        let n = read_full(source, &mut buffer[..CHUNK_SIZE])?;
        cleartext_len += n as u64;

        if n < CHUNK_SIZE {
            let ciphertext = cipher
                .encrypt_padded_mut::<Pkcs7>(&mut buffer, n)
                .map_err(|_| CryptoError::Cipher("PKCS7 padding failed".to_string()))?;
            mac.update(ciphertext);
            out.write_all(ciphertext)?;
            break;
        }

        for block in buffer[..CHUNK_SIZE].chunks_exact_mut(IV_LEN) {
            cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        mac.update(&buffer[..CHUNK_SIZE]);
        out.write_all(&buffer[..CHUNK_SIZE])?;
    }

    out.seek(SeekFrom::Start(MAC_LEN as u64))?;
    out.write_all(&iv)?;

    let tag: [u8; MAC_LEN] = mac.finalize().into_bytes().into();
    out.seek(SeekFrom::Start(0))?;
    out.write_all(&tag)?;
    out.flush()?;

    source.seek(SeekFrom::Start(0))?;
    let file_digest = sha256_stream(source)?;

    debug!(
        cleartext_len,
        encrypted_len = EncryptionInfo::encrypted_size_for(cleartext_len),
        "Content encrypted"
    );

    Ok(EncryptionInfo::from_parts(
        encryption_key,
        mac_key,
        iv,
        tag,
        file_digest,
    ))
}

/// Fill `buf` as far as the reader allows; returns fewer bytes only at EOF.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::Rng(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;
    use std::io::Cursor;

    fn encrypt_bytes(data: &[u8]) -> (Vec<u8>, EncryptionInfo) {
        let mut source = Cursor::new(data.to_vec());
        let mut out = Cursor::new(Vec::new());
        let info = encrypt(&mut source, &mut out).unwrap();
        (out.into_inner(), info)
    }

    #[test]
    fn test_layout_sizes() {
        for len in [0usize, 1, 15, 16, 17, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1] {
            let data = vec![0xA5u8; len];
            let (encrypted, _) = encrypt_bytes(&data);
            assert_eq!(
                encrypted.len() as u64,
                EncryptionInfo::encrypted_size_for(len as u64),
                "length {len}"
            );
        }
    }

    #[test]
    fn test_iv_stored_in_clear_after_tag() {
        let (encrypted, info) = encrypt_bytes(b"hello intune");
        assert_eq!(&encrypted[..MAC_LEN], &info.mac);
        assert_eq!(&encrypted[MAC_LEN..HEADER_LEN], &info.initialization_vector);
    }

    #[test]
    fn test_tag_covers_iv_and_ciphertext() {
        let (encrypted, info) = encrypt_bytes(&[3u8; 1000]);
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&info.mac_key).unwrap();
        mac.update(&encrypted[MAC_LEN..]);
        mac.verify_slice(&encrypted[..MAC_LEN]).unwrap();
    }

    #[test]
    fn test_digest_is_of_cleartext() {
        let data = b"digest me".to_vec();
        let (encrypted, info) = encrypt_bytes(&data);
        assert_eq!(info.file_digest, sha256(&data));
        assert_ne!(info.file_digest, sha256(&encrypted));
    }

    #[test]
    fn test_independent_secrets() {
        let (_, info) = encrypt_bytes(b"x");
        assert_ne!(info.encryption_key, info.mac_key);
        assert_ne!(&info.encryption_key[..IV_LEN], &info.initialization_vector[..]);

        let (_, other) = encrypt_bytes(b"x");
        assert_ne!(info.encryption_key, other.encryption_key);
    }

    #[test]
    fn test_read_full_short_reader() {
        struct Trickle(Vec<u8>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0.remove(0);
                Ok(1)
            }
        }

        let mut reader = Trickle(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 1);
    }
}
