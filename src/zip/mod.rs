//! ZIP archive writing.
//!
//! The scratch tree is repackaged as a classic PKZIP archive:
//!
//! - `structures`: record layouts (local header, central directory, end record)
//!   and DOS timestamps
//! - `writer`: the streaming [`ZipWriter`] and the tree-level [`archive`] walk
//!
//! ## Layout Written
//!
//! 1. For each file: a Local File Header followed by raw DEFLATE data
//! 2. One Central Directory File Header per file
//! 3. The End of Central Directory record, without comment
//!
//! ## Limitations
//!
//! - No ZIP64: more than 65535 files or anything past 4 GiB is rejected
//! - No directory entries, no encryption, DEFLATE only

mod structures;
mod writer;

pub use structures::DosDateTime;
pub use writer::{ArchiveResult, ZipWriter, archive};
