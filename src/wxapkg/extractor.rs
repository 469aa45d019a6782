//! Concurrent extraction of container entries into a scratch tree.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::beautify;
use crate::error::ExtractionError;

use super::structures::FileEntry;

/// Size of the extraction worker pool
pub const EXTRACT_WORKERS: usize = 10;

/// A file written by [`extract`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Path relative to the output root
    pub relative_path: PathBuf,
    /// Bytes written, after beautification
    pub size: u64,
}

/// Holds the first error reported by any worker.
#[derive(Default)]
struct FirstError {
    slot: Mutex<Option<ExtractionError>>,
}

impl FirstError {
    /// Store `err` unless an earlier one is already held.
    fn record(&self, err: ExtractionError) {
        // a poisoned slot still holds a valid Option
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        } else {
            debug!(error = %err, "suppressed extraction error");
        }
    }

    fn take(&self) -> Option<ExtractionError> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// One entry scheduled for writing
struct Job {
    index: usize,
    entry: FileEntry,
    relative_path: PathBuf,
    full_path: PathBuf,
}

/// Map raw entry name bytes to a path relative to the output root.
///
/// A leading `/` means the package root. `..`, drive prefixes and empty
/// names are rejected. On unix the bytes are used as is, so names in legacy
/// encodings such as GBK stay distinct on disk.
pub fn entry_path(raw_name: &[u8]) -> Result<PathBuf, ExtractionError> {
    let display = || String::from_utf8_lossy(raw_name).into_owned();

    let start = raw_name
        .iter()
        .position(|&b| b != b'/')
        .unwrap_or(raw_name.len());
    let native = native_path(&raw_name[start..])
        .ok_or_else(|| ExtractionError::UnrepresentableName { name: display() })?;

    let mut relative = PathBuf::new();
    for component in native.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractionError::UnsafePath { name: display() });
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(ExtractionError::UnsafePath { name: display() });
    }
    Ok(relative)
}

#[cfg(unix)]
fn native_path(bytes: &[u8]) -> Option<&Path> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    Some(Path::new(OsStr::from_bytes(bytes)))
}

// non-UTF-8 names have no lossless mapping here
#[cfg(not(unix))]
fn native_path(bytes: &[u8]) -> Option<&Path> {
    std::str::from_utf8(bytes).ok().map(Path::new)
}

/// Write every entry of `body` under `output_root`.
///
/// Entries are written by a pool of [`EXTRACT_WORKERS`] tasks. The first
/// error any worker hits is kept and returned once every worker has
/// finished; files written by the other workers are left in place for the
/// caller to remove along with the rest of `output_root`.
///
/// When two entries map to the same path the later one in directory order
/// wins.
pub async fn extract(
    body: Arc<[u8]>,
    entries: &[FileEntry],
    output_root: &Path,
    beautify: bool,
) -> Result<Vec<ExtractedFile>, ExtractionError> {
    fs::create_dir_all(output_root)
        .await
        .map_err(|e| ExtractionError::io(output_root, e))?;

    info!(
        entries = entries.len(),
        workers = EXTRACT_WORKERS,
        beautify,
        "extracting package"
    );

    let first_error = Arc::new(FirstError::default());
    let jobs = plan(entries, output_root, &first_error);

    let semaphore = Arc::new(Semaphore::new(EXTRACT_WORKERS));
    let mut tasks = JoinSet::new();

    for job in jobs {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ExtractionError::Worker(e.to_string()))?;
        let body = body.clone();
        let first_error = first_error.clone();

        tasks.spawn(async move {
            let _permit = permit;
            match write_entry(&body, &job, beautify).await {
                Ok(file) => Some((job.index, file)),
                Err(err) => {
                    first_error.record(err);
                    None
                }
            }
        });
    }

    let mut written = Vec::with_capacity(entries.len());
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Some(file)) => written.push(file),
            Ok(None) => {}
            Err(e) => first_error.record(ExtractionError::Worker(e.to_string())),
        }
    }

    if let Some(err) = first_error.take() {
        return Err(err);
    }

    written.sort_by_key(|(index, _)| *index);
    info!(files = written.len(), "extraction complete");
    Ok(written.into_iter().map(|(_, file)| file).collect())
}

/// Resolve entry paths and drop earlier duplicates. Unsafe names are
/// recorded as errors and never scheduled.
fn plan(entries: &[FileEntry], output_root: &Path, first_error: &FirstError) -> Vec<Job> {
    let mut resolved = Vec::with_capacity(entries.len());
    let mut last_index: HashMap<PathBuf, usize> = HashMap::new();

    for (index, entry) in entries.iter().enumerate() {
        match entry_path(&entry.raw_name) {
            Ok(relative_path) => {
                last_index.insert(relative_path.clone(), index);
                resolved.push((index, relative_path));
            }
            Err(err) => first_error.record(err),
        }
    }

    resolved
        .into_iter()
        .filter_map(|(index, relative_path)| {
            if last_index.get(&relative_path) != Some(&index) {
                warn!(entry = %entries[index].name, "duplicate entry, keeping the later one");
                return None;
            }
            Some(Job {
                index,
                entry: entries[index].clone(),
                full_path: output_root.join(&relative_path),
                relative_path,
            })
        })
        .collect()
}

async fn write_entry(
    body: &[u8],
    job: &Job,
    beautify: bool,
) -> Result<ExtractedFile, ExtractionError> {
    let entry = &job.entry;
    let range = entry
        .range(body.len())
        .ok_or_else(|| ExtractionError::OutOfBounds {
            name: entry.name.clone(),
            offset: entry.offset,
            size: entry.size,
            len: body.len(),
        })?;

    let raw = &body[range];
    let content = if beautify {
        beautify::beautify(raw, &entry.name)
    } else {
        Cow::Borrowed(raw)
    };

    if let Some(parent) = job.full_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ExtractionError::io(parent, e))?;
    }
    fs::write(&job.full_path, &content)
        .await
        .map_err(|e| ExtractionError::io(&job.full_path, e))?;

    debug!(entry = %entry.name, size = content.len(), "extracted");

    Ok(ExtractedFile {
        relative_path: job.relative_path.clone(),
        size: content.len() as u64,
    })
}
