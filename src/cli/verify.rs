use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::evidence::{EvidenceLog, FileEvidenceLog};

/// Execute the `verify` command: recompute every stored snapshot hash.
///
/// Fails when any snapshot no longer matches its recorded hash.
pub async fn execute(creditor_id: &str, config: &MonitorConfig) -> Result<()> {
    let log = FileEvidenceLog::new(config.evidence_dir()).await?;
    let snapshots = log.snapshots(creditor_id, usize::MAX).await?;

    let tampered: Vec<_> = snapshots.iter().filter(|s| !s.verify()).collect();
    for snapshot in &tampered {
        println!("TAMPERED {} ({})", snapshot.id, snapshot.captured_at.to_rfc3339());
    }

    println!(
        "{} snapshot(s) checked, {} tampered",
        snapshots.len(),
        tampered.len()
    );

    if tampered.is_empty() {
        Ok(())
    } else {
        Err(MonitorError::ChangeDetection(format!(
            "{} stored snapshot(s) for '{}' failed verification",
            tampered.len(),
            creditor_id
        )))
    }
}
