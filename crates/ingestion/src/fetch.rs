//! Unit file retrieval with local caching and bounded retry.
//!
//! Files are streamed to `<name>.partial` and renamed into place, so a
//! file at the final path is always complete and counts as cached.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use metrics::counter;
use reqwest::{Client, StatusCode};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::error::FetchError;

/// Retrieves one remote unit into a local file.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Write the contents of `url` to `dest`. `dest` must only appear once
    /// the file is complete.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dest.with_file_name(name)
}

async fn finish(partial: &Path, dest: &Path) -> Result<(), FetchError> {
    if fs::rename(partial, dest).await.is_err() {
        // rename failed (likely cross-device), fall back to copy+delete
        fs::copy(partial, dest).await?;
        fs::remove_file(partial).await?;
    }
    Ok(())
}

/// Map a response status onto the fetch error classes.
///
/// 404/410 mean the unit does not exist, 5xx and 429 are worth retrying,
/// any other non-success status is a permanent rejection.
pub fn classify(url: &str, status: StatusCode) -> Result<(), FetchError> {
    match status {
        status if status.is_success() => Ok(()),
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(FetchError::NotFound(url.to_string())),
        status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
            Err(HttpFetcher::transient(url, format!("HTTP {}", status)))
        }
        status => Err(FetchError::Rejected {
            url: url.to_string(),
            status: status.as_u16(),
        }),
    }
}

/// HTTP(S) fetcher.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { client })
    }

    fn transient(url: &str, err: impl std::fmt::Display) -> FetchError {
        FetchError::Transient {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::transient(url, e))?;

        classify(url, response.status())?;

        let partial = partial_path(dest);
        let mut file = fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        let mut bytes = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::transient(url, e))?;
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        finish(&partial, dest).await?;
        debug!(url = %url, bytes = bytes, "Fetched unit");
        Ok(())
    }
}

/// Copies `file://` URLs from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let source = url
            .strip_prefix("file://")
            .ok_or_else(|| FetchError::UnsupportedScheme(url.to_string()))?;

        if !fs::try_exists(source).await? {
            return Err(FetchError::NotFound(url.to_string()));
        }

        let partial = partial_path(dest);
        fs::copy(source, &partial).await?;
        finish(&partial, dest).await
    }
}

/// Dispatches on the URL scheme: `file://` or `http(s)://`.
pub struct SchemeFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SchemeFetcher {
    pub fn new(request_timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(request_timeout)?,
            file: FileFetcher,
        })
    }
}

#[async_trait]
impl Fetcher for SchemeFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        if url.starts_with("file://") {
            self.file.fetch(url, dest).await
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.http.fetch(url, dest).await
        } else {
            Err(FetchError::UnsupportedScheme(url.to_string()))
        }
    }
}

/// Fetch `url` into `dest` unless it is already cached.
///
/// Transient failures are retried up to `policy.attempts` total attempts
/// with a fixed delay; any other failure is returned immediately.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    source: &str,
    url: &str,
    dest: &Path,
    policy: &RetryPolicy,
) -> Result<PathBuf, FetchError> {
    if fs::try_exists(dest).await? {
        debug!(path = %dest.display(), "Unit already cached, skipping fetch");
        return Ok(dest.to_path_buf());
    }

    let mut attempt = 1;
    loop {
        match fetcher.fetch(url, dest).await {
            Ok(()) => {
                if attempt > 1 {
                    info!(url = %url, attempt = attempt, "Fetch succeeded after retry");
                }
                return Ok(dest.to_path_buf());
            }
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = policy.attempts,
                    delay_secs = policy.delay_secs,
                    "Fetch failed, retrying"
                );
                counter!("agweather_fetch_retries_total", "source" => source.to_string())
                    .increment(1);
                tokio::time::sleep(policy.delay()).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use test_utils::{temp_cache_dir, write_unit_file};

    /// Fails transiently `failures` times, then writes "ok".
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetcher for Flaky {
        async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(FetchError::Transient {
                    url: url.to_string(),
                    reason: "connection reset".into(),
                });
            }
            fs::write(dest, "ok").await?;
            Ok(())
        }
    }

    #[test]
    fn test_classify_status() {
        let url = "https://example.org/unit_00.grb2";

        assert!(classify(url, StatusCode::OK).is_ok());
        assert!(classify(url, StatusCode::PARTIAL_CONTENT).is_ok());

        for status in [StatusCode::NOT_FOUND, StatusCode::GONE] {
            let err = classify(url, status).unwrap_err();
            assert!(matches!(err, FetchError::NotFound(_)), "{}", status);
            assert!(!err.is_transient());
        }

        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            let err = classify(url, status).unwrap_err();
            assert!(err.is_transient(), "{}", status);
            assert!(err.to_string().contains(status.as_str()));
        }

        for status in [StatusCode::FORBIDDEN, StatusCode::UNAUTHORIZED, StatusCode::BAD_REQUEST] {
            match classify(url, status).unwrap_err() {
                FetchError::Rejected { status: code, .. } => assert_eq!(code, status.as_u16()),
                other => panic!("unexpected error for {}: {}", status, other),
            }
        }
    }

    fn no_delay(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay_secs: 0,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let dir = temp_cache_dir();
        let dest = dir.path().join("unit_00");
        let fetcher = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };

        let path = fetch_with_retry(&fetcher, "weather", "http://x", &dest, &no_delay(3))
            .await
            .unwrap();
        assert_eq!(path, dest);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let dir = temp_cache_dir();
        let dest = dir.path().join("unit_00");
        let fetcher = Flaky {
            failures: 5,
            calls: AtomicU32::new(0),
        };

        let err = fetch_with_retry(&fetcher, "weather", "http://x", &dest, &no_delay(3))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_cached_unit_is_not_refetched() {
        let dir = temp_cache_dir();
        let dest = write_unit_file(dir.path(), "unit_00", "cached");
        let fetcher = Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        };

        fetch_with_retry(&fetcher, "weather", "http://x", &dest, &no_delay(3))
            .await
            .unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "cached");
    }

    #[tokio::test]
    async fn test_file_fetcher_copies_and_reports_missing() {
        let dir = temp_cache_dir();
        let src = write_unit_file(dir.path(), "remote/feed.txt", "1 2 3\n");
        let dest = dir.path().join("unit_00.txt");

        let url = format!("file://{}", src.display());
        FileFetcher.fetch(&url, &dest).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "1 2 3\n");
        assert!(!partial_path(&dest).exists());

        let missing = format!("file://{}", dir.path().join("nope").display());
        let err = FileFetcher.fetch(&missing, &dir.path().join("x")).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scheme_fetcher_rejects_unknown_scheme() {
        let dir = temp_cache_dir();
        let fetcher = SchemeFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch("ftp://example.org/file", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme(_)));
    }
}
