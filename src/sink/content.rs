//! Content-addressed network store sink

use super::{EvidenceSink, SinkPayload};
use crate::error::{MonitorError, Result};
use crate::hash::digest_hex;
use crate::types::Creditor;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const SINK_NAME: &str = "content_store";

/// Capability exposed by a content-addressed store
#[async_trait]
pub trait ContentAddressedStore: Send + Sync {
    /// Add bytes to the store, returning their content id
    async fn add(&self, bytes: Bytes) -> Result<String>;
}

/// Sink adapter over any `ContentAddressedStore`
pub struct ContentAddressedSink {
    store: Arc<dyn ContentAddressedStore>,
}

impl ContentAddressedSink {
    pub fn new(store: Arc<dyn ContentAddressedStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EvidenceSink for ContentAddressedSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    async fn store(&self, _creditor: &Creditor, payload: &SinkPayload) -> Result<String> {
        self.store
            .add(payload.bytes.clone())
            .await
            .map_err(|e| match e {
                e @ MonitorError::SinkWrite { .. } => e,
                other => MonitorError::sink(SINK_NAME, other),
            })
    }
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// IPFS-compatible HTTP store (`POST /api/v0/add`)
pub struct HttpContentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContentStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ContentAddressedStore for HttpContentStore {
    async fn add(&self, bytes: Bytes) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name("terms.txt");
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/api/v0/add?pin=true", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| MonitorError::sink(SINK_NAME, e))?
            .error_for_status()
            .map_err(|e| MonitorError::sink(SINK_NAME, e))?;

        let body: AddResponse = response
            .json()
            .await
            .map_err(|e| MonitorError::sink(SINK_NAME, e))?;
        Ok(body.hash)
    }
}

/// In-memory content-addressed store for testing and offline use
///
/// Content ids are `sha256-<hex>` of the stored bytes.
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve bytes by content id
    pub async fn get(&self, id: &str) -> Option<Bytes> {
        self.blobs.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl ContentAddressedStore for MemoryContentStore {
    async fn add(&self, bytes: Bytes) -> Result<String> {
        let id = format!("sha256-{}", digest_hex(&bytes));
        self.blobs.write().await.insert(id.clone(), bytes);
        Ok(id)
    }
}
