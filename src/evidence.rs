//! Append-only evidence log
//!
//! Records every sealed snapshot, every detected change, and every
//! escalation stage attempt. The log is shared by all creditor tasks and
//! supports concurrent appends. There are no update or delete operations.

use crate::error::Result;
use crate::types::{Diff, EscalationRecord, Snapshot};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};

/// Bytes read per step when scanning a log backwards
const REVERSE_SCAN_CHUNK: u64 = 64 * 1024;

/// Evidence storage trait
#[async_trait]
pub trait EvidenceLog: Send + Sync {
    /// Append a sealed snapshot
    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Most recently stored snapshot for a creditor
    async fn latest_snapshot(&self, creditor_id: &str) -> Result<Option<Snapshot>>;

    /// Stored snapshots for a creditor, most recent first
    async fn snapshots(&self, creditor_id: &str, limit: usize) -> Result<Vec<Snapshot>>;

    /// Append a detected change
    async fn append_change(&self, change: &Diff) -> Result<()>;

    /// Detected changes for a creditor, most recent first
    async fn changes(&self, creditor_id: &str, limit: usize) -> Result<Vec<Diff>>;

    /// Append an escalation stage record
    async fn append_escalation(&self, record: &EscalationRecord) -> Result<()>;

    /// Escalation records for a change, in append order
    async fn escalations(&self, change_id: &str) -> Result<Vec<EscalationRecord>>;
}

// ============================================================================
// File-based Log
// ============================================================================

/// JSON Lines evidence log
///
/// ```text
/// <dir>/
///   snapshots.jsonl
///   changes.jsonl
///   escalations.jsonl
/// ```
///
/// Appends are serialized through a mutex and synced before returning.
/// `latest_snapshot` scans backwards from the end of `snapshots.jsonl`, so
/// its cost depends on how recently the creditor was captured rather than
/// on the size of the log.
pub struct FileEvidenceLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileEvidenceLog {
    /// Open (or create) a log directory
    pub async fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn snapshots_file(&self) -> PathBuf {
        self.dir.join("snapshots.jsonl")
    }

    fn changes_file(&self) -> PathBuf {
        self.dir.join("changes.jsonl")
    }

    fn escalations_file(&self) -> PathBuf {
        self.dir.join("escalations.jsonl")
    }

    async fn append_line<T: Serialize + Sync>(&self, path: &Path, value: &T) -> Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Last line in `path` that parses and satisfies `matches`
    async fn find_last<T, F>(&self, path: &Path, matches: F) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut end = file.metadata().await?.len();
        // Start of a line whose beginning lies in an earlier chunk
        let mut partial: Vec<u8> = Vec::new();
        while end > 0 {
            let start = end.saturating_sub(REVERSE_SCAN_CHUNK);
            let mut chunk = vec![0u8; (end - start) as usize];
            file.seek(SeekFrom::Start(start)).await?;
            file.read_exact(&mut chunk).await?;
            chunk.extend_from_slice(&partial);
            end = start;

            let first_complete = if start == 0 {
                0
            } else {
                match chunk.iter().position(|b| *b == b'\n') {
                    Some(pos) => pos + 1,
                    None => {
                        partial = chunk;
                        continue;
                    }
                }
            };

            for line in chunk[first_complete..].split(|b| *b == b'\n').rev() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<T>(line) {
                    Ok(item) if matches(&item) => return Ok(Some(item)),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Skipping malformed evidence line"
                        );
                    }
                }
            }
            partial = chunk[..first_complete.saturating_sub(1)].to_vec();
        }
        Ok(None)
    }

    async fn read_lines<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).await?;
        let mut items = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = idx + 1,
                        error = %e,
                        "Skipping malformed evidence line"
                    );
                }
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl EvidenceLog for FileEvidenceLog {
    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.append_line(&self.snapshots_file(), snapshot).await
    }

    async fn latest_snapshot(&self, creditor_id: &str) -> Result<Option<Snapshot>> {
        self.find_last(&self.snapshots_file(), |s: &Snapshot| {
            s.creditor_id == creditor_id
        })
        .await
    }

    async fn snapshots(&self, creditor_id: &str, limit: usize) -> Result<Vec<Snapshot>> {
        let snapshots: Vec<Snapshot> = self.read_lines(&self.snapshots_file()).await?;
        Ok(snapshots
            .into_iter()
            .rev()
            .filter(|s| s.creditor_id == creditor_id)
            .take(limit)
            .collect())
    }

    async fn append_change(&self, change: &Diff) -> Result<()> {
        self.append_line(&self.changes_file(), change).await
    }

    async fn changes(&self, creditor_id: &str, limit: usize) -> Result<Vec<Diff>> {
        let changes: Vec<Diff> = self.read_lines(&self.changes_file()).await?;
        Ok(changes
            .into_iter()
            .rev()
            .filter(|c| c.creditor_id == creditor_id)
            .take(limit)
            .collect())
    }

    async fn append_escalation(&self, record: &EscalationRecord) -> Result<()> {
        self.append_line(&self.escalations_file(), record).await
    }

    async fn escalations(&self, change_id: &str) -> Result<Vec<EscalationRecord>> {
        let records: Vec<EscalationRecord> = self.read_lines(&self.escalations_file()).await?;
        Ok(records
            .into_iter()
            .filter(|r| r.change_id == change_id)
            .collect())
    }
}

// ============================================================================
// In-Memory Log (for testing)
// ============================================================================

/// In-memory evidence log for testing
#[derive(Default)]
pub struct MemoryEvidenceLog {
    snapshots: RwLock<Vec<Snapshot>>,
    changes: RwLock<Vec<Diff>>,
    escalations: RwLock<Vec<EscalationRecord>>,
}

impl MemoryEvidenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored snapshots across all creditors
    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Total number of escalation records across all changes
    pub async fn escalation_count(&self) -> usize {
        self.escalations.read().await.len()
    }
}

#[async_trait]
impl EvidenceLog for MemoryEvidenceLog {
    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots.write().await.push(snapshot.clone());
        Ok(())
    }

    async fn latest_snapshot(&self, creditor_id: &str) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .iter()
            .rev()
            .find(|s| s.creditor_id == creditor_id)
            .cloned())
    }

    async fn snapshots(&self, creditor_id: &str, limit: usize) -> Result<Vec<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .iter()
            .rev()
            .filter(|s| s.creditor_id == creditor_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn append_change(&self, change: &Diff) -> Result<()> {
        self.changes.write().await.push(change.clone());
        Ok(())
    }

    async fn changes(&self, creditor_id: &str, limit: usize) -> Result<Vec<Diff>> {
        let changes = self.changes.read().await;
        Ok(changes
            .iter()
            .rev()
            .filter(|c| c.creditor_id == creditor_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn append_escalation(&self, record: &EscalationRecord) -> Result<()> {
        self.escalations.write().await.push(record.clone());
        Ok(())
    }

    async fn escalations(&self, change_id: &str) -> Result<Vec<EscalationRecord>> {
        let records = self.escalations.read().await;
        Ok(records
            .iter()
            .filter(|r| r.change_id == change_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EscalationStage, StageOutcome};
    use std::sync::Arc;
    use tempfile::tempdir;

    // ========================================================================
    // MemoryEvidenceLog Tests
    // ========================================================================

    #[tokio::test]
    async fn test_memory_latest_snapshot_per_creditor() {
        let log = MemoryEvidenceLog::new();
        log.append_snapshot(&Snapshot::new("a", "a1")).await.unwrap();
        log.append_snapshot(&Snapshot::new("b", "b1")).await.unwrap();
        log.append_snapshot(&Snapshot::new("a", "a2")).await.unwrap();

        let latest = log.latest_snapshot("a").await.unwrap().unwrap();
        assert_eq!(latest.normalized_content, "a2");
        assert!(log.latest_snapshot("missing").await.unwrap().is_none());

        let history = log.snapshots("a", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].normalized_content, "a2");
    }

    #[tokio::test]
    async fn test_memory_escalations_in_append_order() {
        let log = MemoryEvidenceLog::new();
        for stage in [EscalationStage::Detected, EscalationStage::NoticeSent] {
            let record = EscalationRecord::new("chg-1", stage, StageOutcome::Succeeded, 1, "");
            log.append_escalation(&record).await.unwrap();
        }
        log.append_escalation(&EscalationRecord::new(
            "chg-2",
            EscalationStage::Detected,
            StageOutcome::Succeeded,
            0,
            "",
        ))
        .await
        .unwrap();

        let records = log.escalations("chg-1").await.unwrap();
        let stages: Vec<_> = records.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![EscalationStage::Detected, EscalationStage::NoticeSent]
        );
        assert_eq!(log.escalation_count().await, 3);
    }

    #[tokio::test]
    async fn test_memory_concurrent_appends() {
        let log = Arc::new(MemoryEvidenceLog::new());
        let mut handles = Vec::new();
        for i in 0..20 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let snapshot = Snapshot::new(format!("c{}", i % 4), format!("terms {}", i));
                log.append_snapshot(&snapshot).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(log.snapshot_count().await, 20);
    }

    // ========================================================================
    // FileEvidenceLog Tests
    // ========================================================================

    #[tokio::test]
    async fn test_file_log_persistence() {
        let dir = tempdir().unwrap();

        {
            let log = FileEvidenceLog::new(dir.path()).await.unwrap();
            log.append_snapshot(&Snapshot::new("a", "v1")).await.unwrap();
            log.append_snapshot(&Snapshot::new("a", "v2")).await.unwrap();
        }

        {
            let log = FileEvidenceLog::new(dir.path()).await.unwrap();
            let latest = log.latest_snapshot("a").await.unwrap().unwrap();
            assert_eq!(latest.normalized_content, "v2");
            assert!(latest.verify());
            assert_eq!(log.snapshots("a", 1).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_file_log_skips_malformed_lines() {
        let dir = tempdir().unwrap();
        let log = FileEvidenceLog::new(dir.path()).await.unwrap();
        log.append_snapshot(&Snapshot::new("a", "good")).await.unwrap();

        let mut raw = std::fs::read_to_string(dir.path().join("snapshots.jsonl")).unwrap();
        raw.push_str("{not json\n");
        std::fs::write(dir.path().join("snapshots.jsonl"), raw).unwrap();

        let snapshots = log.snapshots("a", 10).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].normalized_content, "good");
    }

    #[tokio::test]
    async fn test_file_log_concurrent_appends() {
        let dir = tempdir().unwrap();
        let log = Arc::new(FileEvidenceLog::new(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..10 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let record = EscalationRecord::new(
                    "chg-1",
                    EscalationStage::Detected,
                    StageOutcome::Succeeded,
                    0,
                    format!("record {}", i),
                );
                log.append_escalation(&record).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(log.escalations("chg-1").await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_file_log_empty() {
        let dir = tempdir().unwrap();
        let log = FileEvidenceLog::new(dir.path().join("nested")).await.unwrap();
        assert!(log.latest_snapshot("a").await.unwrap().is_none());
        assert!(log.changes("a", 10).await.unwrap().is_empty());
        assert!(log.escalations("x").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_latest_snapshot_scans_across_chunks() {
        let dir = tempdir().unwrap();
        let log = FileEvidenceLog::new(dir.path()).await.unwrap();

        let large = "clause ".repeat(30_000);
        log.append_snapshot(&Snapshot::new("a", "a1")).await.unwrap();
        log.append_snapshot(&Snapshot::new("a", large.as_str())).await.unwrap();
        for i in 0..50 {
            log.append_snapshot(&Snapshot::new("b", format!("b{}", i)))
                .await
                .unwrap();
        }

        let mut raw = std::fs::read_to_string(dir.path().join("snapshots.jsonl")).unwrap();
        raw.push_str("{not json\n");
        std::fs::write(dir.path().join("snapshots.jsonl"), raw).unwrap();

        let latest = log.latest_snapshot("a").await.unwrap().unwrap();
        assert_eq!(latest.normalized_content, large);
        assert!(latest.verify());

        let latest = log.latest_snapshot("b").await.unwrap().unwrap();
        assert_eq!(latest.normalized_content, "b49");
        assert!(log.latest_snapshot("c").await.unwrap().is_none());
    }
}
