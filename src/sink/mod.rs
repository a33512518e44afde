//! Evidence sinks: independent write-once storage targets for snapshots
//!
//! Every sink implements `EvidenceSink`. The capturer writes each snapshot to
//! all configured sinks concurrently; a sink failure only leaves that sink's
//! reference empty and never aborts the capture.
//!
//! ## Variants
//!
//! - **local**: durable write-once files on disk
//! - **content**: content-addressed network store (IPFS-compatible)
//! - **ledger**: distributed-ledger anchor of the content hash
//! - **archive**: public web archive mirror of the document URL

use crate::error::Result;
use crate::types::Creditor;
use async_trait::async_trait;
use bytes::Bytes;

pub mod archive;
pub mod content;
pub mod ledger;
pub mod local;

pub use archive::{WaybackMirror, WebArchiveMirror, WebArchiveSink, DEFAULT_ARCHIVE_URL};
pub use content::{ContentAddressedSink, ContentAddressedStore, HttpContentStore, MemoryContentStore};
pub use ledger::{
    AnchoredTerms, DistributedLedgerAnchor, HttpLedgerAnchor, LedgerAnchorSink, MemoryLedger,
    ReportedViolation,
};
pub use local::LocalRecordSink;

/// Normalized snapshot content handed to every sink
#[derive(Debug, Clone)]
pub struct SinkPayload {
    /// Hash of `bytes` (lower-case hex SHA-256)
    pub content_hash: String,

    /// Normalized document bytes
    pub bytes: Bytes,
}

impl SinkPayload {
    pub fn new(content_hash: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_hash: content_hash.into(),
            bytes: bytes.into(),
        }
    }

    /// Content URI used to cross-reference this payload from other sinks
    pub fn content_uri(&self) -> String {
        format!("sha256:{}", self.content_hash)
    }
}

/// Core trait for evidence storage targets
///
/// Implementations perform one write per call and return an opaque
/// reference (path, content id, transaction id, archive URL). Errors are
/// reported as `SinkWrite` and treated as non-fatal by the capturer.
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    /// Sink name used as the key in `Snapshot::sink_references`
    fn name(&self) -> &str;

    /// Store the payload for a creditor, returning the sink reference
    async fn store(&self, creditor: &Creditor, payload: &SinkPayload) -> Result<String>;
}
