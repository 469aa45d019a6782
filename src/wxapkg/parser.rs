//! Container directory parser.
//!
//! A plain container is read strictly front to back:
//! 1. The 18-byte [`ContainerHeader`] (markers, three length fields, file count)
//! 2. `file_count` directory records of `name_len`, `name`, `offset`, `size`
//!
//! Every integer is big-endian. Offsets in the directory are absolute
//! positions into the whole container, so the parser hands back the buffer it
//! was given as the entry body.

use std::io::Cursor;

use tracing::debug;

use crate::error::FormatError;

use super::structures::{ContainerHeader, FileEntry, is_encrypted, read_u32};

/// Smallest possible directory record: name length, offset and size with an
/// empty name.
const MIN_RECORD_SIZE: usize = 12;

/// A parsed plain container borrowing the buffer it came from.
#[derive(Debug, Clone)]
pub struct Package<'a> {
    pub header: ContainerHeader,
    /// Directory records in file order
    pub entries: Vec<FileEntry>,
    /// The buffer entry offsets index into
    pub body: &'a [u8],
}

impl Package<'_> {
    /// Sum of declared entry sizes
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size as u64).sum()
    }
}

/// Parse a plain container.
///
/// # Errors
///
/// Returns [`FormatError::Encrypted`] for `V1MMWX` input, a marker error for
/// anything else that is not a plain container, and
/// [`FormatError::Truncated`] if the header or directory runs past the end of
/// the buffer. No partial entry list is ever returned.
pub fn parse(data: &[u8]) -> Result<Package<'_>, FormatError> {
    if is_encrypted(data) {
        return Err(FormatError::Encrypted);
    }

    let header = ContainerHeader::from_bytes(data)?;
    debug!(
        info1 = header.info1,
        index_info_length = header.index_info_length,
        body_info_length = header.body_info_length,
        file_count = header.file_count,
        "parsed container header"
    );

    let mut cursor = Cursor::new(data);
    cursor.set_position(ContainerHeader::SIZE as u64);

    // file_count is untrusted; cap the reservation by what the buffer could hold
    let remaining = data.len().saturating_sub(ContainerHeader::SIZE);
    let capacity = (header.file_count as usize).min(remaining / MIN_RECORD_SIZE);
    let mut entries = Vec::with_capacity(capacity);

    for _ in 0..header.file_count {
        entries.push(parse_record(&mut cursor)?);
    }

    debug!(
        entries = entries.len(),
        directory_end = cursor.position(),
        "parsed container directory"
    );

    Ok(Package {
        header,
        entries,
        body: data,
    })
}

/// Parse one directory record at the cursor.
fn parse_record(cursor: &mut Cursor<&[u8]>) -> Result<FileEntry, FormatError> {
    let name_len = read_u32(cursor, "name length")? as usize;

    let start = cursor.position() as usize;
    let data = *cursor.get_ref();
    let name_bytes = start
        .checked_add(name_len)
        .and_then(|end| data.get(start..end))
        .ok_or(FormatError::Truncated {
            what: "file name",
            offset: start as u64,
        })?;
    cursor.set_position((start + name_len) as u64);

    let offset = read_u32(cursor, "file offset")?;
    let size = read_u32(cursor, "file size")?;

    Ok(FileEntry::new(name_bytes, offset, size))
}
