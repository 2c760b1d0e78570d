//! Property-based tests for iwp-crypto.
//!
//! - Round trip: decrypting with the returned info reproduces the cleartext
//!   and its SHA-256 equals `file_digest`.
//! - Integrity: flipping any byte of the IV or ciphertext breaks the HMAC.

#![cfg(test)]

use std::io::Cursor;

use hmac::{Hmac, Mac};
use proptest::prelude::*;
use sha2::Sha256;

use crate::decrypt::{decrypt, verify_mac};
use crate::encrypt::encrypt;
use crate::error::CryptoError;
use crate::hash::sha256;
use crate::info::{EncryptionInfo, MAC_LEN};

fn arb_content() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..20_000)
}

fn encrypt_vec(data: &[u8]) -> (Vec<u8>, EncryptionInfo) {
    let mut out = Cursor::new(Vec::new());
    let info = encrypt(&mut Cursor::new(data.to_vec()), &mut out).expect("encrypt");
    (out.into_inner(), info)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_round_trip(data in arb_content()) {
        let (encrypted, info) = encrypt_vec(&data);
        prop_assert_eq!(encrypted.len() as u64, EncryptionInfo::encrypted_size_for(data.len() as u64));

        let mut plain = Vec::new();
        decrypt(&mut Cursor::new(encrypted), &info, &mut plain).expect("decrypt");
        prop_assert_eq!(&plain, &data);
        prop_assert_eq!(sha256(&plain), info.file_digest);
    }

    #[test]
    fn prop_flipped_byte_breaks_mac(data in arb_content(), pick in any::<prop::sample::Index>(), bit in 0u8..8) {
        let (mut encrypted, info) = encrypt_vec(&data);
        let region = encrypted.len() - MAC_LEN;
        let offset = MAC_LEN + pick.index(region);
        encrypted[offset] ^= 1 << bit;

        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&info.mac_key).unwrap();
        mac.update(&encrypted[MAC_LEN..]);
        prop_assert!(mac.verify_slice(&info.mac).is_err());

        let result = verify_mac(&mut Cursor::new(encrypted), &info);
        prop_assert!(matches!(result, Err(CryptoError::MacMismatch)));
    }
}
