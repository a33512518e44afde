//! Snapshot capture
//!
//! Fetches a creditor's terms document, normalizes and hashes it, and writes
//! the normalized content to every configured evidence sink concurrently.
//! Fetch and normalization failures abort the capture before any sink is
//! touched; sink failures and sink writes exceeding the sink timeout only
//! leave that sink's reference empty.

use crate::error::{MonitorError, Result};
use crate::hash::normalize_and_hash;
use crate::sink::{EvidenceSink, SinkPayload};
use crate::types::{Creditor, Snapshot};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single document fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single evidence sink write
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(30);

/// Retrieves raw document bytes
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// `reqwest`-backed document fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MonitorError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::fetch(url, format!("HTTP {}", status)));
        }

        response.bytes().await.map_err(|e| MonitorError::fetch(url, e))
    }
}

/// Resolves the debtors linked to a creditor
#[async_trait]
pub trait AffectedUsers: Send + Sync {
    async fn affected_users(&self, creditor_id: &str) -> Result<Vec<String>>;
}

/// Fixed creditor → user id mapping (from configuration)
#[derive(Debug, Clone, Default)]
pub struct StaticAffectedUsers {
    users: HashMap<String, Vec<String>>,
}

impl StaticAffectedUsers {
    pub fn new(users: HashMap<String, Vec<String>>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl AffectedUsers for StaticAffectedUsers {
    async fn affected_users(&self, creditor_id: &str) -> Result<Vec<String>> {
        Ok(self.users.get(creditor_id).cloned().unwrap_or_default())
    }
}

/// A sealed snapshot together with the users it affects
#[derive(Debug, Clone)]
pub struct CapturedTerms {
    pub snapshot: Snapshot,
    pub user_ids: Vec<String>,
}

/// Fetch → normalize → hash → fan out to sinks
pub struct SnapshotCapturer {
    fetcher: Arc<dyn DocumentFetcher>,
    sinks: Vec<Arc<dyn EvidenceSink>>,
    users: Arc<dyn AffectedUsers>,
    fetch_timeout: Duration,
    sink_timeout: Duration,
}

impl SnapshotCapturer {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self {
            fetcher,
            sinks: Vec::new(),
            users: Arc::new(StaticAffectedUsers::default()),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EvidenceSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_sinks(mut self, sinks: Vec<Arc<dyn EvidenceSink>>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    pub fn with_affected_users(mut self, users: Arc<dyn AffectedUsers>) -> Self {
        self.users = users;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Capture a sealed snapshot of the creditor's current terms
    pub async fn capture(&self, creditor: &Creditor) -> Result<Snapshot> {
        Ok(self.capture_terms(creditor).await?.snapshot)
    }

    /// Capture a snapshot and resolve the affected users
    pub async fn capture_terms(&self, creditor: &Creditor) -> Result<CapturedTerms> {
        let raw = self.fetch(creditor).await?;
        let (normalized, hash) = normalize_and_hash(&raw)?;

        let user_ids = match self.users.affected_users(&creditor.id).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(
                    creditor = %creditor.id,
                    error = %e,
                    "Failed to resolve affected users, counting zero"
                );
                Vec::new()
            }
        };

        let payload = SinkPayload::new(hash.clone(), normalized.clone().into_bytes());
        let sink_references = self.write_sinks(creditor, &payload).await;

        let snapshot = Snapshot::new(creditor.id.clone(), normalized)
            .with_sink_references(sink_references)
            .with_affected_users(user_ids.len());

        tracing::debug!(
            creditor = %creditor.id,
            snapshot = %snapshot.id,
            hash = %snapshot.content_hash,
            "Snapshot sealed"
        );

        Ok(CapturedTerms { snapshot, user_ids })
    }

    async fn fetch(&self, creditor: &Creditor) -> Result<Bytes> {
        let url = &creditor.document_url;
        match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::fetch(
                url.as_str(),
                format!("timed out after {}ms", self.fetch_timeout.as_millis()),
            )),
        }
    }

    async fn write_sinks(
        &self,
        creditor: &Creditor,
        payload: &SinkPayload,
    ) -> BTreeMap<String, Option<String>> {
        let timeout = self.sink_timeout;
        let writes = self.sinks.iter().map(|sink| async move {
            let write = sink.store(creditor, payload);
            let result = match tokio::time::timeout(timeout, write).await {
                Ok(result) => result,
                Err(_) => Err(MonitorError::sink(
                    sink.name(),
                    format!("timed out after {}ms", timeout.as_millis()),
                )),
            };
            (sink.name().to_string(), result)
        });

        let mut references = BTreeMap::new();
        for (name, result) in join_all(writes).await {
            match result {
                Ok(reference) => {
                    tracing::info!(
                        creditor = %creditor.id,
                        sink = %name,
                        hash = %payload.content_hash,
                        reference = %reference,
                        "Evidence stored"
                    );
                    references.insert(name, Some(reference));
                }
                Err(e) => {
                    tracing::warn!(
                        creditor = %creditor.id,
                        sink = %name,
                        error = %e,
                        "Evidence sink write failed"
                    );
                    references.insert(name, None);
                }
            }
        }

        if !references.is_empty() && references.values().all(Option::is_none) {
            tracing::warn!(
                creditor = %creditor.id,
                hash = %payload.content_hash,
                "Every evidence sink failed; snapshot held only in the evidence log"
            );
        }

        references
    }
}
