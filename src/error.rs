//! Error types for every pipeline stage.
//!
//! Each stage owns its error enum so callers can tell *where* a run failed.
//! The distinction between [`DecryptError::WrongIdentifier`] and a malformed
//! container is what users actually need to see, so it is kept as its own
//! variant rather than folded into a generic failure.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for whole-pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error wrapping every stage error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// The buffer is not a well-formed plain container
#[derive(Debug, Error)]
pub enum FormatError {
    /// Buffer is neither plain nor encrypted
    #[error("not a wxapkg package (expected 0xBE/0xED markers or V1MMWX magic)")]
    Unrecognized,

    /// Encrypted input handed to the parser
    #[error("package is encrypted (V1MMWX) and must be decrypted with its AppID first")]
    Encrypted,

    /// A header marker byte had the wrong value
    #[error("invalid {which} marker: expected 0x{expected:02X}, found 0x{found:02X}")]
    BadMarker {
        /// "first" or "last"
        which: &'static str,
        expected: u8,
        found: u8,
    },

    /// A read ran past the end of the buffer
    #[error("truncated package while reading {what} at offset {offset}")]
    Truncated {
        /// Field being read when the buffer ran out
        what: &'static str,
        /// Byte offset where the read started
        offset: u64,
    },
}

/// Decryption failures
#[derive(Debug, Error)]
pub enum DecryptError {
    /// Encrypted input but no AppID to derive the key from
    #[error("package is encrypted (V1MMWX); its AppID is required to decrypt it")]
    MissingIdentifier,

    /// Missing `V1MMWX` prefix on input that is not already plain
    #[error("invalid encrypted package: missing V1MMWX header")]
    NotEncrypted,

    /// Fewer than 1024 bytes of ciphertext after the magic
    #[error("encrypted package too small: need {needed} bytes after header, found {found}")]
    TooShort { needed: usize, found: usize },

    /// Cipher construction or block decryption failed
    #[error("AES-CBC decryption failed: {0}")]
    Cipher(String),

    /// Decryption ran but the result is not a plain container
    #[error("decrypted data is not a valid package; the AppID is most likely wrong")]
    WrongIdentifier,
}

/// Failures while materializing entries into the scratch tree
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Entry byte range lies outside the container
    #[error("entry out of bounds: {name} (offset={offset}, size={size}, len={len})")]
    OutOfBounds {
        name: String,
        offset: u32,
        size: u32,
        len: usize,
    },

    /// Entry name would resolve outside the output root
    #[error("refusing to extract unsafe path: {name}")]
    UnsafePath { name: String },

    /// Entry name bytes have no file name equivalent on this platform
    #[error("entry name is not valid UTF-8 and cannot be written here: {name}")]
    UnrepresentableName { name: String },

    /// Filesystem failure while creating directories or writing
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A worker task panicked or was aborted
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

/// Failures while writing the output archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Read, write or compression failure
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failure
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// Archive exceeds what the classic (non-ZIP64) format can record
    #[error("archive too large: {0}")]
    TooLarge(String),
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }
}

impl ExtractionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractionError::Io {
            path: path.into(),
            source,
        }
    }
}
