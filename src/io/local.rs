use super::PackageSource;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Package read from the local filesystem
pub struct LocalPackage {
    path: PathBuf,
    size: u64,
}

impl LocalPackage {
    pub fn new(path: &Path, max_size: u64) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        if !metadata.is_file() {
            bail!("{} is not a file", path.display());
        }

        let size = metadata.len();
        if size > max_size {
            bail!(
                "{} is {} bytes, larger than the {} byte limit",
                path.display(),
                size,
                max_size
            );
        }

        let is_wxapkg = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wxapkg"));
        if !is_wxapkg {
            warn!(path = %path.display(), "input does not have a .wxapkg extension");
        }

        Ok(Self {
            path: path.to_path_buf(),
            size,
        })
    }
}

#[async_trait]
impl PackageSource for LocalPackage {
    async fn read_all(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package.wxapkg".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_the_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.wxapkg");
        std::fs::write(&path, b"\xBEdata").unwrap();

        let package = LocalPackage::new(&path, 1024).unwrap();
        assert_eq!(package.size(), Some(5));
        assert_eq!(package.file_name(), "app.wxapkg");
        assert_eq!(package.read_all().await.unwrap(), b"\xBEdata");
    }

    #[test]
    fn rejects_oversized_and_missing_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.wxapkg");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        assert!(LocalPackage::new(&path, 63).is_err());
        assert!(LocalPackage::new(&dir.path().join("missing.wxapkg"), 1024).is_err());
        assert!(LocalPackage::new(dir.path(), 1024).is_err());
    }
}
