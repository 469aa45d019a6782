use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;
use std::ops::Range;

use crate::error::FormatError;

/// Magic prefix of an encrypted package
pub const ENCRYPTED_MAGIC: &[u8] = b"V1MMWX";

/// First header byte of a plain container
pub const FIRST_MARK: u8 = 0xBE;

/// Header byte at offset 13 of a plain container
pub const LAST_MARK: u8 = 0xED;

/// Smallest buffer [`is_plain`] accepts (both markers present)
pub const PLAIN_MIN_SIZE: usize = 14;

/// What a raw buffer looks like before any decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    Plain,
    Encrypted,
    Invalid,
}

impl PackageFormat {
    /// Classify a buffer. The encrypted form is checked first.
    pub fn detect(data: &[u8]) -> Self {
        if is_encrypted(data) {
            PackageFormat::Encrypted
        } else if is_plain(data) {
            PackageFormat::Plain
        } else {
            PackageFormat::Invalid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageFormat::Plain => "plain",
            PackageFormat::Encrypted => "encrypted",
            PackageFormat::Invalid => "invalid",
        }
    }
}

/// True iff the buffer starts with the `V1MMWX` magic
pub fn is_encrypted(data: &[u8]) -> bool {
    data.starts_with(ENCRYPTED_MAGIC)
}

/// True iff the buffer carries both plain-container markers
pub fn is_plain(data: &[u8]) -> bool {
    data.len() >= PLAIN_MIN_SIZE && data[0] == FIRST_MARK && data[13] == LAST_MARK
}

/// Fixed 18-byte container header, all integers big-endian
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub first_mark: u8,
    pub info1: u32,
    pub index_info_length: u32,
    pub body_info_length: u32,
    pub last_mark: u8,
    pub file_count: u32,
}

impl ContainerHeader {
    pub const SIZE: usize = 18;

    /// Decode the header from the start of `data`.
    ///
    /// The three length fields are informational and are not checked
    /// against the rest of the buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        let mut cursor = Cursor::new(data);

        let first_mark = read_u8(&mut cursor, "first marker")?;
        if first_mark != FIRST_MARK {
            return Err(FormatError::BadMarker {
                which: "first",
                expected: FIRST_MARK,
                found: first_mark,
            });
        }

        let info1 = read_u32(&mut cursor, "info1")?;
        let index_info_length = read_u32(&mut cursor, "index info length")?;
        let body_info_length = read_u32(&mut cursor, "body info length")?;

        let last_mark = read_u8(&mut cursor, "last marker")?;
        if last_mark != LAST_MARK {
            return Err(FormatError::BadMarker {
                which: "last",
                expected: LAST_MARK,
                found: last_mark,
            });
        }

        let file_count = read_u32(&mut cursor, "file count")?;

        Ok(Self {
            first_mark,
            info1,
            index_info_length,
            body_info_length,
            last_mark,
            file_count,
        })
    }
}

/// One file recorded in the container directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Name for display and extension matching, decoded lossily
    pub name: String,
    /// Name bytes exactly as stored; may not be UTF-8 (GBK is common)
    pub raw_name: Vec<u8>,
    /// Absolute offset into the container
    pub offset: u32,
    pub size: u32,
}

impl FileEntry {
    pub fn new(raw_name: impl Into<Vec<u8>>, offset: u32, size: u32) -> Self {
        let raw_name = raw_name.into();
        Self {
            name: String::from_utf8_lossy(&raw_name).into_owned(),
            raw_name,
            offset,
            size,
        }
    }

    /// Byte range of the entry within a buffer of `len` bytes, or `None`
    /// when it does not fit.
    pub fn range(&self, len: usize) -> Option<Range<usize>> {
        let start = self.offset as usize;
        let end = start.checked_add(self.size as usize)?;
        (end <= len).then_some(start..end)
    }
}

pub(super) fn read_u8(cursor: &mut Cursor<&[u8]>, what: &'static str) -> Result<u8, FormatError> {
    let offset = cursor.position();
    cursor
        .read_u8()
        .map_err(|_| FormatError::Truncated { what, offset })
}

pub(super) fn read_u32(
    cursor: &mut Cursor<&[u8]>,
    what: &'static str,
) -> Result<u32, FormatError> {
    let offset = cursor.position();
    cursor
        .read_u32::<BigEndian>()
        .map_err(|_| FormatError::Truncated { what, offset })
}
