use async_trait::async_trait;
use reqwest::{Client, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::PackageSource;
use anyhow::{Context, Result, bail};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 10;

/// Package downloaded over HTTP(S)
pub struct HttpPackage {
    client: Client,
    url: String,
    /// Size announced by the server, if any
    size: Option<u64>,
    max_size: u64,
    transferred_bytes: AtomicU64,
}

impl HttpPackage {
    /// Probe `url` with a HEAD request.
    ///
    /// Fails early when the server reports a size above `max_size`. Servers
    /// that omit `Content-Length` are still accepted; the limit is then
    /// enforced while downloading.
    pub async fn new(url: String, max_size: u64) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let resp = client
            .head(&url)
            .send()
            .await
            .with_context(|| format!("cannot reach {url}"))?;
        if !resp.status().is_success() {
            bail!("HEAD {url} failed with status: {}", resp.status());
        }

        let size = resp.content_length().filter(|&n| n > 0);
        if let Some(size) = size {
            check_limit(size, max_size)?;
        }
        debug!(url = %url, size, "remote package probed");

        Ok(Self {
            client,
            url,
            size,
            max_size,
            transferred_bytes: AtomicU64::new(0),
        })
    }

    /// Bytes received so far, across retries
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Send the GET, retrying connection failures and timeouts with a
    /// linear back-off.
    async fn send(&self) -> Result<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(&self.url).send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < MAX_ATTEMPTS => {
                    warn!(attempt, max = MAX_ATTEMPTS, error = %e, "download failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("GET {} failed", self.url));
                }
            }
        }
    }
}

fn check_limit(size: u64, max_size: u64) -> Result<()> {
    if size > max_size {
        bail!("remote package is {size} bytes, larger than the {max_size} byte limit");
    }
    Ok(())
}

/// Last path segment of `url`, ignoring query and fragment.
fn url_file_name(url: &str) -> Option<&str> {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty() && !name.contains(':'))
}

#[async_trait]
impl PackageSource for HttpPackage {
    async fn read_all(&self) -> Result<Vec<u8>> {
        let mut resp = self.send().await?;
        if !resp.status().is_success() {
            bail!("GET {} failed with status: {}", self.url, resp.status());
        }

        let capacity = self.size.unwrap_or(0).min(self.max_size) as usize;
        let mut data = Vec::with_capacity(capacity);
        while let Some(chunk) = resp.chunk().await? {
            self.transferred_bytes
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            check_limit((data.len() + chunk.len()) as u64, self.max_size)?;
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn file_name(&self) -> String {
        url_file_name(&self.url)
            .unwrap_or("package.wxapkg")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_comes_from_the_last_segment() {
        assert_eq!(
            url_file_name("https://cdn.example.com/pkg/_-123.wxapkg?sign=abc#x"),
            Some("_-123.wxapkg")
        );
        assert_eq!(url_file_name("https://example.com/dir/"), None);
        assert_eq!(url_file_name("https://example.com"), Some("example.com"));
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(check_limit(100, 100).is_ok());
        assert!(check_limit(101, 100).is_err());
    }
}
