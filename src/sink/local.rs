//! Durable local record sink
//!
//! Stores each distinct snapshot as a write-once file:
//! ```text
//! <dir>/
//!   {creditor-id}/
//!     {content-hash}.txt
//! ```
//! Files are created with `create_new` and never overwritten. Capturing
//! identical content again reuses the existing record.

use super::{EvidenceSink, SinkPayload};
use crate::error::{MonitorError, Result};
use crate::hash::content_hash;
use crate::types::Creditor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const SINK_NAME: &str = "local";

/// Write-once file sink
pub struct LocalRecordSink {
    dir: PathBuf,
}

impl LocalRecordSink {
    /// Create a sink rooted at `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn creditor_dir(&self, creditor_id: &str) -> PathBuf {
        let safe_id = creditor_id.replace(['/', '\\'], "_").replace("..", "_");
        self.dir.join(safe_id)
    }

    async fn write_once(&self, path: &Path, payload: &SinkPayload) -> Result<()> {
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return self.check_existing(path, payload).await;
            }
            Err(e) => return Err(MonitorError::sink(SINK_NAME, e)),
        };

        file.write_all(&payload.bytes)
            .await
            .map_err(|e| MonitorError::sink(SINK_NAME, e))?;
        file.sync_all()
            .await
            .map_err(|e| MonitorError::sink(SINK_NAME, e))?;
        Ok(())
    }

    async fn check_existing(&self, path: &Path, payload: &SinkPayload) -> Result<()> {
        let existing = fs::read_to_string(path)
            .await
            .map_err(|e| MonitorError::sink(SINK_NAME, e))?;
        if content_hash(&existing) != payload.content_hash {
            return Err(MonitorError::sink(
                SINK_NAME,
                format!("existing record {} does not match its hash", path.display()),
            ));
        }
        tracing::debug!(path = %path.display(), "Reusing existing local record");
        Ok(())
    }
}

#[async_trait]
impl EvidenceSink for LocalRecordSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    async fn store(&self, creditor: &Creditor, payload: &SinkPayload) -> Result<String> {
        let dir = self.creditor_dir(&creditor.id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| MonitorError::sink(SINK_NAME, e))?;

        let path = dir.join(format!("{}.txt", payload.content_hash));
        self.write_once(&path, payload).await?;

        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn payload(text: &str) -> SinkPayload {
        SinkPayload::new(content_hash(text), text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_store_writes_record() {
        let dir = tempdir().unwrap();
        let sink = LocalRecordSink::new(dir.path());
        let creditor = Creditor::new("lender", "Lender AS", "https://lender.example/terms");

        let reference = sink.store(&creditor, &payload("terms v1")).await.unwrap();
        assert!(reference.contains("lender"));
        assert_eq!(std::fs::read_to_string(&reference).unwrap(), "terms v1");
    }

    #[tokio::test]
    async fn test_identical_content_reuses_record() {
        let dir = tempdir().unwrap();
        let sink = LocalRecordSink::new(dir.path());
        let creditor = Creditor::new("lender", "Lender AS", "https://lender.example/terms");

        let first = sink.store(&creditor, &payload("same")).await.unwrap();
        let second = sink.store(&creditor, &payload("same")).await.unwrap();
        assert_eq!(first, second);

        let entries = std::fs::read_dir(dir.path().join("lender")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_tampered_record_is_not_overwritten() {
        let dir = tempdir().unwrap();
        let sink = LocalRecordSink::new(dir.path());
        let creditor = Creditor::new("lender", "Lender AS", "https://lender.example/terms");

        let reference = sink.store(&creditor, &payload("original")).await.unwrap();
        std::fs::write(&reference, "tampered").unwrap();

        let result = sink.store(&creditor, &payload("original")).await;
        assert!(matches!(result, Err(MonitorError::SinkWrite { .. })));
        assert_eq!(std::fs::read_to_string(&reference).unwrap(), "tampered");
    }

    #[tokio::test]
    async fn test_creditor_id_is_sanitized() {
        let dir = tempdir().unwrap();
        let sink = LocalRecordSink::new(dir.path());
        let creditor = Creditor::new("../escape", "Bad", "https://bad.example");

        let reference = sink.store(&creditor, &payload("x")).await.unwrap();
        assert!(std::path::Path::new(&reference).starts_with(dir.path()));
    }
}
