use crate::config::MonitorConfig;
use crate::error::Result;
use crate::evidence::{EvidenceLog, FileEvidenceLog};

/// Execute the `history` command: list stored snapshots for a creditor.
pub async fn execute(creditor_id: &str, limit: usize, config: &MonitorConfig) -> Result<()> {
    let log = FileEvidenceLog::new(config.evidence_dir()).await?;
    let snapshots = log.snapshots(creditor_id, limit).await?;

    if snapshots.is_empty() {
        println!("No snapshots stored for '{}'.", creditor_id);
        return Ok(());
    }

    println!("{:<20} {:<18} {:<9} SINKS", "CAPTURED", "HASH", "STATUS");
    for snapshot in &snapshots {
        let status = if snapshot.verify() { "ok" } else { "TAMPERED" };
        println!(
            "{:<20} {:<18} {:<9} {}",
            snapshot.captured_at.format("%Y-%m-%d %H:%M:%S"),
            &snapshot.content_hash[..snapshot.content_hash.len().min(16)],
            status,
            snapshot.stored_sinks().join(","),
        );
    }

    let changes = log.changes(creditor_id, limit).await?;
    if !changes.is_empty() {
        println!("\nCHANGES");
        for change in &changes {
            println!(
                "{}  {}  {}",
                change.detected_at.format("%Y-%m-%d %H:%M:%S"),
                change.id,
                change.violation_descriptions().join("; "),
            );
        }
    }

    Ok(())
}
