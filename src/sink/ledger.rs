//! Distributed-ledger anchor sink
//!
//! Anchors the content hash of each snapshot on a ledger through the
//! `DistributedLedgerAnchor` capability. The same capability is used by the
//! escalation pipeline to record classified violations.

use super::{EvidenceSink, SinkPayload};
use crate::error::{MonitorError, Result};
use crate::types::Creditor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

const SINK_NAME: &str = "ledger";

/// Capability exposed by a distributed-ledger evidence service
#[async_trait]
pub trait DistributedLedgerAnchor: Send + Sync {
    /// Anchor a terms capture, returning the transaction receipt
    async fn capture_terms(
        &self,
        creditor_id: &str,
        creditor_name: &str,
        content_hash: &str,
        sink_ref: &str,
    ) -> Result<String>;

    /// Record a classified violation, returning the transaction receipt
    async fn report_violation(&self, creditor_id: &str, violation_type: &str) -> Result<String>;
}

/// Sink adapter over a `DistributedLedgerAnchor`
pub struct LedgerAnchorSink {
    anchor: Arc<dyn DistributedLedgerAnchor>,
}

impl LedgerAnchorSink {
    pub fn new(anchor: Arc<dyn DistributedLedgerAnchor>) -> Self {
        Self { anchor }
    }
}

#[async_trait]
impl EvidenceSink for LedgerAnchorSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    async fn store(&self, creditor: &Creditor, payload: &SinkPayload) -> Result<String> {
        self.anchor
            .capture_terms(
                &creditor.id,
                &creditor.name,
                &payload.content_hash,
                &payload.content_uri(),
            )
            .await
            .map_err(|e| match e {
                e @ MonitorError::SinkWrite { .. } => e,
                other => MonitorError::sink(SINK_NAME, other),
            })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TermsAnchorRequest<'a> {
    creditor_id: &'a str,
    creditor_name: &'a str,
    content_hash: &'a str,
    sink_ref: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViolationReportRequest<'a> {
    creditor_id: &'a str,
    violation_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxReceipt {
    tx_id: String,
}

/// HTTP client for a ledger evidence service
///
/// `POST {base}/api/evidence/terms` and `POST {base}/api/evidence/violations`,
/// both answering `{"txId": "..."}`.
pub struct HttpLedgerAnchor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedgerAnchor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<String> {
        let receipt: TxReceipt = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(receipt.tx_id)
    }
}

#[async_trait]
impl DistributedLedgerAnchor for HttpLedgerAnchor {
    async fn capture_terms(
        &self,
        creditor_id: &str,
        creditor_name: &str,
        content_hash: &str,
        sink_ref: &str,
    ) -> Result<String> {
        let request = TermsAnchorRequest {
            creditor_id,
            creditor_name,
            content_hash,
            sink_ref,
        };
        self.post("/api/evidence/terms", &request).await
    }

    async fn report_violation(&self, creditor_id: &str, violation_type: &str) -> Result<String> {
        let request = ViolationReportRequest {
            creditor_id,
            violation_type,
        };
        self.post("/api/evidence/violations", &request).await
    }
}

/// A terms anchor recorded by `MemoryLedger`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchoredTerms {
    pub tx_id: String,
    pub creditor_id: String,
    pub creditor_name: String,
    pub content_hash: String,
    pub sink_ref: String,
}

/// A violation report recorded by `MemoryLedger`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedViolation {
    pub tx_id: String,
    pub creditor_id: String,
    pub violation_type: String,
}

/// In-memory ledger for testing and offline use
#[derive(Default)]
pub struct MemoryLedger {
    anchors: RwLock<Vec<AnchoredTerms>>,
    reports: RwLock<Vec<ReportedViolation>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn anchors(&self) -> Vec<AnchoredTerms> {
        self.anchors.read().await.clone()
    }

    pub async fn reports(&self) -> Vec<ReportedViolation> {
        self.reports.read().await.clone()
    }
}

fn tx_id() -> String {
    format!("tx-{}", uuid::Uuid::new_v4().simple())
}

#[async_trait]
impl DistributedLedgerAnchor for MemoryLedger {
    async fn capture_terms(
        &self,
        creditor_id: &str,
        creditor_name: &str,
        content_hash: &str,
        sink_ref: &str,
    ) -> Result<String> {
        let tx_id = tx_id();
        self.anchors.write().await.push(AnchoredTerms {
            tx_id: tx_id.clone(),
            creditor_id: creditor_id.to_string(),
            creditor_name: creditor_name.to_string(),
            content_hash: content_hash.to_string(),
            sink_ref: sink_ref.to_string(),
        });
        Ok(tx_id)
    }

    async fn report_violation(&self, creditor_id: &str, violation_type: &str) -> Result<String> {
        let tx_id = tx_id();
        self.reports.write().await.push(ReportedViolation {
            tx_id: tx_id.clone(),
            creditor_id: creditor_id.to_string(),
            violation_type: violation_type.to_string(),
        });
        Ok(tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::content_hash;

    #[tokio::test]
    async fn test_sink_anchors_hash_and_content_uri() {
        let ledger = Arc::new(MemoryLedger::new());
        let sink = LedgerAnchorSink::new(ledger.clone());
        let creditor = Creditor::new("c1", "Lender AS", "https://lender.example/terms");
        let hash = content_hash("terms");
        let payload = SinkPayload::new(hash.clone(), b"terms".to_vec());

        let tx = sink.store(&creditor, &payload).await.unwrap();
        assert!(tx.starts_with("tx-"));

        let anchors = ledger.anchors().await;
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].creditor_name, "Lender AS");
        assert_eq!(anchors[0].content_hash, hash);
        assert_eq!(anchors[0].sink_ref, format!("sha256:{}", hash));
    }

    #[tokio::test]
    async fn test_report_violation_is_recorded() {
        let ledger = MemoryLedger::new();
        ledger.report_violation("c1", "mandatory_arbitration").await.unwrap();

        let reports = ledger.reports().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].violation_type, "mandatory_arbitration");
    }
}
