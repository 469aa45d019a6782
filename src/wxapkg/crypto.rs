//! Decryption of `V1MMWX` packages.
//!
//! Encrypted layout: the 6-byte magic, a 1024-byte AES-256-CBC block keyed by
//! PBKDF2-HMAC-SHA1 of the AppID, then the rest of the container XORed with a
//! single byte taken from the AppID. Only the first 1023 bytes of the
//! decrypted block belong to the container.

use std::borrow::Cow;

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use tracing::debug;

use crate::error::DecryptError;

use super::structures::{ENCRYPTED_MAGIC, is_encrypted, is_plain};

const SALT: &[u8] = b"saltiest";
const IV: &[u8; 16] = b"the iv: 16 bytes";
const DEFAULT_XOR_KEY: u8 = 0x66;
const PBKDF2_ROUNDS: u32 = 1000;
const KEY_SIZE: usize = 32;

/// Length of the AES-encrypted region following the magic
pub const CIPHER_REGION: usize = 1024;

/// Bytes of the decrypted region kept in the output
const KEPT_PLAINTEXT: usize = CIPHER_REGION - 1;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Derive the AES-256 key for an AppID.
pub fn derive_key(identifier: &str) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha1>(identifier.as_bytes(), SALT, PBKDF2_ROUNDS, &mut key);
    key
}

/// XOR byte for the tail: the second-to-last byte of the AppID.
pub fn xor_key(identifier: &str) -> u8 {
    let bytes = identifier.as_bytes();
    if bytes.len() >= 2 {
        bytes[bytes.len() - 2]
    } else {
        DEFAULT_XOR_KEY
    }
}

/// Decrypt a package, returning plain input untouched.
///
/// # Errors
///
/// [`DecryptError::WrongIdentifier`] when the recipe ran but produced
/// something that is not a plain container. Other variants mean the input
/// itself is malformed.
pub fn decrypt<'a>(data: &'a [u8], identifier: &str) -> Result<Cow<'a, [u8]>, DecryptError> {
    if is_plain(data) {
        debug!("package already plain, skipping decryption");
        return Ok(Cow::Borrowed(data));
    }

    let plain = decrypt_unchecked(data, identifier)?;
    if !is_plain(&plain) {
        return Err(DecryptError::WrongIdentifier);
    }

    Ok(Cow::Owned(plain))
}

/// Run the decryption recipe without validating the result.
pub fn decrypt_unchecked(data: &[u8], identifier: &str) -> Result<Vec<u8>, DecryptError> {
    if !is_encrypted(data) {
        return Err(DecryptError::NotEncrypted);
    }

    let payload = &data[ENCRYPTED_MAGIC.len()..];
    if payload.len() < CIPHER_REGION {
        return Err(DecryptError::TooShort {
            needed: CIPHER_REGION,
            found: payload.len(),
        });
    }
    let (head, tail) = payload.split_at(CIPHER_REGION);

    let key = derive_key(identifier);
    let mut block = [0u8; CIPHER_REGION];
    block.copy_from_slice(head);
    let decrypted = Aes256CbcDec::new_from_slices(&key, IV)
        .map_err(|e| DecryptError::Cipher(e.to_string()))?
        .decrypt_padded_mut::<NoPadding>(&mut block)
        .map_err(|e| DecryptError::Cipher(e.to_string()))?;

    let xor = xor_key(identifier);
    debug!(tail_len = tail.len(), "decrypting package body");

    let mut out = Vec::with_capacity(KEPT_PLAINTEXT + tail.len());
    out.extend_from_slice(&decrypted[..KEPT_PLAINTEXT]);
    out.extend(tail.iter().map(|b| b ^ xor));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::cipher::BlockEncryptMut;

    const APPID: &str = "wx0123456789abcdef";

    /// Inverse of the recipe, for fixtures.
    fn encrypt(plain: &[u8], identifier: &str) -> Vec<u8> {
        let key = derive_key(identifier);
        let mut block = [0u8; CIPHER_REGION];
        block[..KEPT_PLAINTEXT].copy_from_slice(&plain[..KEPT_PLAINTEXT]);
        cbc::Encryptor::<Aes256>::new_from_slices(&key, IV)
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut block, CIPHER_REGION)
            .unwrap();

        let xor = xor_key(identifier);
        let mut out = ENCRYPTED_MAGIC.to_vec();
        out.extend_from_slice(&block);
        out.extend(plain[KEPT_PLAINTEXT..].iter().map(|b| b ^ xor));
        out
    }

    fn plain_fixture() -> Vec<u8> {
        let mut data = vec![0xBE];
        data.extend_from_slice(&[0; 12]);
        data.push(0xED);
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend((0..3000u32).map(|i| (i % 251) as u8));
        data
    }

    #[test]
    fn xor_key_uses_second_to_last_byte() {
        assert_eq!(xor_key(APPID), b'e');
        assert_eq!(xor_key("ab"), b'a');
        assert_eq!(xor_key("a"), 0x66);
        assert_eq!(xor_key(""), 0x66);
    }

    #[test]
    fn plain_input_is_returned_as_is() {
        let plain = plain_fixture();
        let out = decrypt(&plain, "anything").unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, &plain[..]);
    }

    #[test]
    fn round_trips_with_the_right_identifier() {
        let plain = plain_fixture();
        let encrypted = encrypt(&plain, APPID);
        assert_eq!(encrypted.len(), plain.len() + ENCRYPTED_MAGIC.len() + 1);

        let out = decrypt(&encrypted, APPID).unwrap();
        assert_eq!(&*out, &plain[..]);
    }

    #[test]
    fn wrong_identifier_is_classified() {
        let encrypted = encrypt(&plain_fixture(), APPID);
        assert!(matches!(
            decrypt(&encrypted, "wxfedcba9876543210"),
            Err(DecryptError::WrongIdentifier)
        ));
    }

    #[test]
    fn drops_the_last_byte_of_the_cipher_block() {
        let mut encrypted = encrypt(&plain_fixture(), APPID);
        encrypted.truncate(ENCRYPTED_MAGIC.len() + CIPHER_REGION);
        let out = decrypt_unchecked(&encrypted, APPID).unwrap();
        assert_eq!(out.len(), KEPT_PLAINTEXT);
    }

    #[test]
    fn short_ciphertext_is_rejected() {
        let mut data = ENCRYPTED_MAGIC.to_vec();
        data.resize(ENCRYPTED_MAGIC.len() + 1000, 0);
        assert!(matches!(
            decrypt(&data, APPID),
            Err(DecryptError::TooShort { needed: 1024, found: 1000 })
        ));
    }

    #[test]
    fn missing_magic_is_rejected() {
        assert!(matches!(
            decrypt(b"not a package at all", APPID),
            Err(DecryptError::NotEncrypted)
        ));
    }
}
