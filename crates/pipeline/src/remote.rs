//! Out-of-process calls: URL fetches and the shared timeout guard.

use std::time::Duration;

use async_trait::async_trait;

use sumi_core::error::CoreError;
use sumi_core::ports::RemoteFetcher;

/// Bound a remote call. Timeouts map to [`CoreError::RemoteService`] so
/// callers fail closed instead of hanging a submission.
pub async fn with_timeout<T, F>(
    duration: Duration,
    label: &str,
    fut: F,
) -> Result<T, CoreError>
where
    F: std::future::Future<Output = Result<T, CoreError>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::RemoteService(format!(
            "{label} timed out after {}ms",
            duration.as_millis()
        ))),
    }
}

/// Upload-by-URL fetcher over a shared `reqwest` client.
pub struct HttpFetcher {
    client: reqwest::Client,
    /// Reject bodies larger than this many bytes.
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CoreError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::RemoteService(format!("fetch {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::RemoteService(format!(
                "fetch {url} returned {}",
                response.status()
            )));
        }
        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(CoreError::Resource(format!(
                    "remote file is {len} bytes, limit is {}",
                    self.max_bytes
                )));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CoreError::RemoteService(format!("fetch {url} failed: {e}")))?;
        if body.len() as u64 > self.max_bytes {
            return Err(CoreError::Resource(format!(
                "remote file is {} bytes, limit is {}",
                body.len(),
                self.max_bytes
            )));
        }
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_maps_to_remote_service_error() {
        let err = with_timeout(Duration::from_millis(5), "captcha", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::RemoteService(_)));
    }

    #[tokio::test]
    async fn completed_calls_pass_their_result_through() {
        let value = with_timeout(Duration::from_secs(1), "captcha", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
