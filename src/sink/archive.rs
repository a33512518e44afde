//! Public web archive mirror sink
//!
//! Asks a public archive to capture the creditor's document URL. The mirror
//! contract is best-effort: an empty archive URL signals failure.

use super::{EvidenceSink, SinkPayload};
use crate::error::{MonitorError, Result};
use crate::types::Creditor;
use async_trait::async_trait;
use std::sync::Arc;

const SINK_NAME: &str = "web_archive";

/// Default public archive endpoint
pub const DEFAULT_ARCHIVE_URL: &str = "https://web.archive.org";

/// Capability exposed by a public web archive
#[async_trait]
pub trait WebArchiveMirror: Send + Sync {
    /// Archive `url`, returning the archived copy's URL or `""` on failure
    async fn archive(&self, url: &str) -> String;
}

/// Sink adapter over a `WebArchiveMirror`
pub struct WebArchiveSink {
    mirror: Arc<dyn WebArchiveMirror>,
}

impl WebArchiveSink {
    pub fn new(mirror: Arc<dyn WebArchiveMirror>) -> Self {
        Self { mirror }
    }
}

#[async_trait]
impl EvidenceSink for WebArchiveSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    async fn store(&self, creditor: &Creditor, _payload: &SinkPayload) -> Result<String> {
        let archived = self.mirror.archive(&creditor.document_url).await;
        if archived.is_empty() {
            return Err(MonitorError::sink(
                SINK_NAME,
                format!("archive declined {}", creditor.document_url),
            ));
        }
        Ok(archived)
    }
}

/// Wayback Machine style mirror (`GET {base}/save/{url}`)
pub struct WaybackMirror {
    client: reqwest::Client,
    base_url: String,
}

impl WaybackMirror {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn try_archive(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/save/{}", self.base_url, url))
            .send()
            .await?
            .error_for_status()?;

        let location = response
            .headers()
            .get(reqwest::header::CONTENT_LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|loc| format!("{}{}", self.base_url, loc));

        Ok(location.unwrap_or_else(|| response.url().to_string()))
    }
}

impl Default for WaybackMirror {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_URL)
    }
}

#[async_trait]
impl WebArchiveMirror for WaybackMirror {
    async fn archive(&self, url: &str) -> String {
        match self.try_archive(url).await {
            Ok(archived) => archived,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Web archive request failed");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMirror(&'static str);

    #[async_trait]
    impl WebArchiveMirror for FixedMirror {
        async fn archive(&self, _url: &str) -> String {
            self.0.to_string()
        }
    }

    #[tokio::test]
    async fn test_archive_url_becomes_reference() {
        let sink = WebArchiveSink::new(Arc::new(FixedMirror("https://archive.example/1/terms")));
        let creditor = Creditor::new("c1", "Lender", "https://lender.example/terms");
        let payload = SinkPayload::new("h", b"x".to_vec());

        let reference = sink.store(&creditor, &payload).await.unwrap();
        assert_eq!(reference, "https://archive.example/1/terms");
    }

    #[tokio::test]
    async fn test_empty_archive_url_is_sink_failure() {
        let sink = WebArchiveSink::new(Arc::new(FixedMirror("")));
        let creditor = Creditor::new("c1", "Lender", "https://lender.example/terms");
        let payload = SinkPayload::new("h", b"x".to_vec());

        let result = sink.store(&creditor, &payload).await;
        assert!(matches!(result, Err(MonitorError::SinkWrite { .. })));
    }

    #[test]
    fn test_wayback_trims_trailing_slash() {
        let mirror = WaybackMirror::new("https://web.archive.org/");
        assert_eq!(mirror.base_url, "https://web.archive.org");
    }
}
