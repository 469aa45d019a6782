//! # seewxapkg
//!
//! Decrypt and unpack WeChat mini-program packages (`.wxapkg`) and repackage
//! their contents as ordinary ZIP archives.
//!
//! The work is split into independent stages, each usable on its own:
//!
//! - Format detection: [`wxapkg::detect`]
//! - Decryption of `V1MMWX` packages with the mini-program AppID: [`wxapkg::decrypt`]
//! - Directory parsing: [`wxapkg::parse`]
//! - Concurrent extraction into a scratch tree: [`wxapkg::extract`]
//! - Optional reformatting of JSON and WXML/HTML: [`beautify::beautify`]
//! - ZIP archiving of the scratch tree: [`zip::archive`]
//!
//! [`pipeline::convert`] runs all of them in order.
//!
//! ## Example
//!
//! ```no_run
//! use seewxapkg::pipeline::{self, Options};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let data = std::fs::read("app.wxapkg")?;
//!     let scratch = tempfile::tempdir()?;
//!
//!     let options = Options {
//!         app_id: Some("wx0123456789abcdef"),
//!         beautify: true,
//!     };
//!     let done = pipeline::convert(&data, options, scratch.path(), "app.zip".as_ref(), |stage| {
//!         println!("{}", stage.as_str());
//!     })
//!     .await?;
//!
//!     println!("{} files", done.archive.entries);
//!     Ok(())
//! }
//! ```

pub mod beautify;
pub mod cli;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod wxapkg;
pub mod zip;

pub use cli::Cli;
pub use error::{ArchiveError, DecryptError, Error, ExtractionError, FormatError, Result};
pub use io::{HttpPackage, LocalPackage, PackageSource};
pub use wxapkg::{FileEntry, PackageFormat};
