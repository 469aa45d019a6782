use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::ArchiveError;

use super::structures::*;

/// Outcome of [`archive`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveResult {
    pub path: PathBuf,
    /// Number of files stored
    pub entries: usize,
    /// Size of the archive on disk
    pub size: u64,
}

/// Streaming writer for DEFLATE-only ZIP archives.
///
/// Members are compressed in memory, so sizes and CRC are known before the
/// local header is written and no data descriptors are needed.
pub struct ZipWriter<W: Write> {
    inner: W,
    /// Used to label I/O errors
    path: PathBuf,
    entries: Vec<ZipFileEntry>,
    offset: u64,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(inner: W, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
            entries: Vec::new(),
            offset: 0,
        }
    }

    /// Number of members written so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compress `data` and append it as `name`.
    ///
    /// `name` is stored byte for byte; the UTF-8 flag is set only when it
    /// decodes as UTF-8.
    pub fn add_file(
        &mut self,
        name: impl AsRef<[u8]>,
        data: &[u8],
        modified: DosDateTime,
    ) -> Result<(), ArchiveError> {
        let name = name.as_ref();
        if self.entries.len() >= MAX_ENTRIES {
            return Err(ArchiveError::TooLarge(format!(
                "more than {MAX_ENTRIES} files"
            )));
        }
        if name.len() > u16::MAX as usize {
            return Err(ArchiveError::TooLarge(format!(
                "file name of {} bytes",
                name.len()
            )));
        }

        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| ArchiveError::io(&self.path, e))?;
        let compressed = encoder
            .finish()
            .map_err(|e| ArchiveError::io(&self.path, e))?;

        let entry = ZipFileEntry {
            file_name: name.to_vec(),
            crc32: crc32fast::hash(data),
            compressed_size: to_u32(compressed.len() as u64, "compressed size")?,
            uncompressed_size: to_u32(data.len() as u64, "file size")?,
            lfh_offset: to_u32(self.offset, "archive offset")?,
            modified,
        };

        let mut header = Vec::with_capacity(LFH_SIZE + name.len());
        entry
            .write_local_header(&mut header)
            .map_err(|e| ArchiveError::io(&self.path, e))?;
        self.write(&header)?;
        self.write(&compressed)?;

        debug!(
            member = %String::from_utf8_lossy(name),
            size = data.len(),
            compressed = compressed.len(),
            "archived"
        );
        self.entries.push(entry);
        Ok(())
    }

    /// Write the central directory and end record, returning the inner
    /// writer flushed.
    pub fn finish(mut self) -> Result<W, ArchiveError> {
        let cd_offset = to_u32(self.offset, "central directory offset")?;

        let mut directory = Vec::with_capacity(self.entries.len() * CDFH_MIN_SIZE);
        for entry in &self.entries {
            entry
                .write_central_header(&mut directory)
                .map_err(|e| ArchiveError::io(&self.path, e))?;
        }

        let eocd = EndOfCentralDirectory {
            total_entries: self.entries.len() as u16,
            cd_size: to_u32(directory.len() as u64, "central directory size")?,
            cd_offset,
        };
        eocd.write_to(&mut directory)
            .map_err(|e| ArchiveError::io(&self.path, e))?;

        self.write(&directory)?;
        self.inner
            .flush()
            .map_err(|e| ArchiveError::io(&self.path, e))?;
        Ok(self.inner)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), ArchiveError> {
        self.inner
            .write_all(buf)
            .map_err(|e| ArchiveError::io(&self.path, e))?;
        self.offset += buf.len() as u64;
        Ok(())
    }
}

fn to_u32(value: u64, what: &str) -> Result<u32, ArchiveError> {
    u32::try_from(value)
        .map_err(|_| ArchiveError::TooLarge(format!("{what} {value} exceeds 4 GiB")))
}

/// Archive member name for a path relative to the source root, keeping
/// non-UTF-8 file names intact on unix.
fn member_name(relative: &Path) -> Vec<u8> {
    let mut name = Vec::new();
    for (i, part) in relative.iter().enumerate() {
        if i > 0 {
            name.push(b'/');
        }
        name.extend_from_slice(&os_bytes(part));
    }
    name
}

#[cfg(unix)]
fn os_bytes(part: &OsStr) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;

    Cow::Borrowed(part.as_bytes())
}

#[cfg(not(unix))]
fn os_bytes(part: &OsStr) -> Cow<'_, [u8]> {
    match part.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

/// Write every regular file under `source_root` into a ZIP at
/// `output_path`.
///
/// The tree is walked depth-first in file-name order. Directories are not
/// stored. A partially written archive is left behind on failure.
pub fn archive(source_root: &Path, output_path: &Path) -> Result<ArchiveResult, ArchiveError> {
    let file = File::create(output_path).map_err(|e| ArchiveError::io(output_path, e))?;
    let mut writer = ZipWriter::new(BufWriter::new(file), output_path);

    // the archive may live inside the tree it is built from
    let own_path = output_path.canonicalize().ok();

    for entry in WalkDir::new(source_root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if own_path.is_some() && path.canonicalize().ok() == own_path {
            continue;
        }

        let relative = path.strip_prefix(source_root).map_err(|e| {
            ArchiveError::io(path, std::io::Error::other(e.to_string()))
        })?;
        let modified = entry
            .metadata()?
            .modified()
            .map(DosDateTime::from_system_time)
            .unwrap_or(DosDateTime::EPOCH);
        let data = fs::read(path).map_err(|e| ArchiveError::io(path, e))?;

        writer.add_file(&member_name(relative), &data, modified)?;
    }

    let entries = writer.len();
    writer
        .finish()?
        .into_inner()
        .map_err(|e| ArchiveError::io(output_path, e.into_error()))?;

    let size = fs::metadata(output_path)
        .map_err(|e| ArchiveError::io(output_path, e))?
        .len();

    info!(path = %output_path.display(), entries, size, "archive written");

    Ok(ArchiveResult {
        path: output_path.to_path_buf(),
        entries,
        size,
    })
}
