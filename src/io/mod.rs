mod http;
mod local;

pub use http::HttpPackage;
pub use local::LocalPackage;

use anyhow::Result;
use async_trait::async_trait;

/// Default ceiling on package size (100 MiB)
pub const DEFAULT_MAX_SIZE: u64 = 100 * 1024 * 1024;

/// Trait for a place a raw package can be loaded from
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Load the whole package into memory
    async fn read_all(&self) -> Result<Vec<u8>>;

    /// Size of the package, if known before reading
    fn size(&self) -> Option<u64>;

    /// File name of the package, used to name the output archive
    fn file_name(&self) -> String;
}
