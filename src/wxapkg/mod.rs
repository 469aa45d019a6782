//! WeChat mini-program package (`.wxapkg`) handling.
//!
//! ## Architecture
//!
//! - `structures`: magic bytes, format detection, header and entry types
//! - `crypto`: the `V1MMWX` decryption recipe
//! - `parser`: big-endian header and directory decoding
//! - `extractor`: concurrent materialization of entries on disk
//!
//! ## Package Format Overview
//!
//! A plain package is:
//! 1. An 18-byte header framed by the `0xBE` and `0xED` marker bytes
//! 2. A directory of `(name_len, name, offset, size)` records
//! 3. File data, addressed by absolute offsets from the start of the package
//!
//! An encrypted package prefixes `V1MMWX` and hides the first 1023 bytes of
//! the plain package in an AES-256-CBC block; everything after is XORed with
//! one byte of the AppID.

mod crypto;
mod extractor;
mod parser;
mod structures;

pub use crypto::{CIPHER_REGION, decrypt, decrypt_unchecked, derive_key, xor_key};
pub use extractor::{EXTRACT_WORKERS, ExtractedFile, entry_path, extract};
pub use parser::{parse, Package};
pub use structures::{
    ContainerHeader, ENCRYPTED_MAGIC, FIRST_MARK, FileEntry, LAST_MARK, PLAIN_MIN_SIZE,
    PackageFormat, is_encrypted, is_plain,
};

/// Classify a raw buffer as plain, encrypted or invalid.
pub fn detect(data: &[u8]) -> PackageFormat {
    PackageFormat::detect(data)
}
