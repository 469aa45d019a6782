//! Stage sequencing for a single package conversion.
//!
//! The stage functions in [`crate::wxapkg`] and [`crate::zip`] know nothing
//! about each other. [`convert`] runs them in order, reports each stage to a
//! callback and stops at the first failure.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{ArchiveError, DecryptError, Error, FormatError, Result};
use crate::wxapkg::{self, ExtractedFile, PackageFormat};
use crate::zip::{self, ArchiveResult};

/// Named pipeline stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Uploading,
    Decrypting,
    Unpacking,
    Packing,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Uploading => "uploading",
            Stage::Decrypting => "decrypting",
            Stage::Unpacking => "unpacking",
            Stage::Packing => "packing",
            Stage::Complete => "complete",
        }
    }

    /// Rough overall progress when the stage starts
    pub fn percent(&self) -> u8 {
        match self {
            Stage::Uploading => 0,
            Stage::Decrypting => 20,
            Stage::Unpacking => 50,
            Stage::Packing => 80,
            Stage::Complete => 100,
        }
    }
}

/// Per-run settings
#[derive(Debug, Clone, Copy, Default)]
pub struct Options<'a> {
    /// AppID for encrypted packages
    pub app_id: Option<&'a str>,
    pub beautify: bool,
}

/// Outcome of [`convert`]
#[derive(Debug, Clone)]
pub struct Conversion {
    pub format: PackageFormat,
    pub files: Vec<ExtractedFile>,
    pub archive: ArchiveResult,
}

/// Turn raw package bytes into plain container bytes.
///
/// Plain input passes through whatever the AppID. Encrypted input needs an
/// AppID; a mismatch surfaces as [`DecryptError::WrongIdentifier`].
pub fn prepare<'a>(data: &'a [u8], app_id: Option<&str>) -> Result<Cow<'a, [u8]>> {
    match (wxapkg::detect(data), app_id) {
        (PackageFormat::Plain, _) => Ok(Cow::Borrowed(data)),
        (PackageFormat::Encrypted, Some(id)) => Ok(wxapkg::decrypt(data, id)?),
        (PackageFormat::Encrypted, None) => Err(DecryptError::MissingIdentifier.into()),
        (PackageFormat::Invalid, _) => Err(FormatError::Unrecognized.into()),
    }
}

/// Decrypt, parse, extract into `scratch` and archive to `output`.
///
/// `scratch` must be exclusive to this call; it is not cleaned up here. A
/// partially written `output` is removed on failure.
pub async fn convert<F>(
    data: &[u8],
    options: Options<'_>,
    scratch: &Path,
    output: &Path,
    mut on_stage: F,
) -> Result<Conversion>
where
    F: FnMut(Stage),
{
    let format = wxapkg::detect(data);
    info!(
        format = format.as_str(),
        size = data.len(),
        app_id_provided = options.app_id.is_some(),
        "package loaded"
    );

    let started = Instant::now();
    on_stage(Stage::Decrypting);
    let plain = prepare(data, options.app_id)?;
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "decrypt stage done");

    let entries = wxapkg::parse(&plain)?.entries;
    debug!(entries = entries.len(), "directory parsed");

    on_stage(Stage::Unpacking);
    let body: Arc<[u8]> = Arc::from(plain.into_owned());
    let files = wxapkg::extract(body, &entries, scratch, options.beautify).await?;
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "unpack stage done");

    on_stage(Stage::Packing);
    let archive = match write_archive(scratch, output).await {
        Ok(archive) => archive,
        Err(err) => {
            if let Err(e) = tokio::fs::remove_file(output).await {
                debug!(error = %e, "no partial archive to remove");
            }
            return Err(err);
        }
    };

    info!(
        files = files.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "conversion complete"
    );
    on_stage(Stage::Complete);
    Ok(Conversion {
        format,
        files,
        archive,
    })
}

async fn write_archive(scratch: &Path, output: &Path) -> Result<ArchiveResult> {
    let source = scratch.to_path_buf();
    let target = output.to_path_buf();
    tokio::task::spawn_blocking(move || zip::archive(&source, &target))
        .await
        .map_err(|e| ArchiveError::io(output, std::io::Error::other(e.to_string())))?
        .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_input_ignores_app_id() {
        let mut data = vec![0u8; 18];
        data[0] = 0xBE;
        data[13] = 0xED;
        assert!(matches!(prepare(&data, None), Ok(Cow::Borrowed(_))));
        assert!(matches!(
            prepare(&data, Some("wx0123456789abcdef")),
            Ok(Cow::Borrowed(_))
        ));
    }

    #[test]
    fn encrypted_input_needs_app_id() {
        let mut data = b"V1MMWX".to_vec();
        data.resize(2048, 7);
        assert!(matches!(
            prepare(&data, None),
            Err(Error::Decrypt(DecryptError::MissingIdentifier))
        ));
    }

    #[test]
    fn garbage_is_unrecognized() {
        assert!(matches!(
            prepare(b"PK\x03\x04 not a wxapkg", Some("wx0123456789abcdef")),
            Err(Error::Format(FormatError::Unrecognized))
        ));
    }

    #[test]
    fn stages_report_increasing_progress() {
        let stages = [
            Stage::Uploading,
            Stage::Decrypting,
            Stage::Unpacking,
            Stage::Packing,
            Stage::Complete,
        ];
        assert!(stages.windows(2).all(|w| w[0].percent() < w[1].percent()));
        assert_eq!(Stage::Complete.as_str(), "complete");
    }
}
