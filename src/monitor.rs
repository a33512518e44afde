//! One monitoring cycle for one creditor
//!
//! capture → read baseline → detect → append snapshot → (change) append
//! change and escalate. The baseline is always the latest snapshot stored
//! before this cycle, so snapshots per creditor stay totally ordered.
//!
//! Once the new snapshot is stored it becomes the next baseline, so a
//! detected change is escalated even when its change record cannot be
//! written.

use crate::capture::{CapturedTerms, SnapshotCapturer};
use crate::detect::ChangeDetector;
use crate::error::Result;
use crate::escalation::ResponseOrchestrator;
use crate::evidence::EvidenceLog;
use crate::types::{Creditor, Diff, EscalationRecord};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one cycle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub creditor_id: String,
    pub snapshot_id: String,
    pub content_hash: String,
    /// Sinks whose write failed during capture
    pub missing_sinks: Vec<String>,
    pub change: Option<Diff>,
    pub escalations: Vec<EscalationRecord>,
}

impl CycleReport {
    pub fn changed(&self) -> bool {
        self.change.is_some()
    }
}

/// Capturer, detector, evidence log, and orchestrator wired together
pub struct MonitorPipeline {
    capturer: SnapshotCapturer,
    detector: ChangeDetector,
    log: Arc<dyn EvidenceLog>,
    orchestrator: ResponseOrchestrator,
}

impl MonitorPipeline {
    pub fn new(
        capturer: SnapshotCapturer,
        detector: ChangeDetector,
        log: Arc<dyn EvidenceLog>,
        orchestrator: ResponseOrchestrator,
    ) -> Self {
        Self {
            capturer,
            detector,
            log,
            orchestrator,
        }
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Run one capture/detect/escalate cycle
    ///
    /// Fetch and normalization errors abort the cycle before anything is
    /// stored. A failed change append is logged and escalation still runs.
    pub async fn run_cycle(&self, creditor: &Creditor) -> Result<CycleReport> {
        let CapturedTerms { snapshot, user_ids } = self.capturer.capture_terms(creditor).await?;

        let baseline = self.log.latest_snapshot(&creditor.id).await?;
        let change = self.detector.detect(baseline.as_ref(), &snapshot);

        self.log.append_snapshot(&snapshot).await?;

        let mut escalations = Vec::new();
        if let Some(diff) = &change {
            if let Err(e) = self.log.append_change(diff).await {
                tracing::error!(
                    creditor = %creditor.id,
                    change = %diff.id,
                    error = %e,
                    "Failed to append change record, escalating anyway"
                );
            }
            tracing::info!(
                creditor = %creditor.id,
                change = %diff.id,
                old_hash = %diff.old_hash,
                new_hash = %diff.new_hash,
                violations = diff.violations.len(),
                "Terms change detected"
            );
            escalations = self.orchestrator.run(creditor, diff, &user_ids).await;
        } else if baseline.is_none() {
            tracing::info!(
                creditor = %creditor.id,
                hash = %snapshot.content_hash,
                "Baseline established"
            );
        } else {
            tracing::debug!(creditor = %creditor.id, "Terms unchanged");
        }

        Ok(CycleReport {
            creditor_id: creditor.id.clone(),
            snapshot_id: snapshot.id.clone(),
            content_hash: snapshot.content_hash.clone(),
            missing_sinks: snapshot
                .missing_sinks()
                .into_iter()
                .map(str::to_string)
                .collect(),
            change,
            escalations,
        })
    }
}
