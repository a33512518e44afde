//! Graduated response pipeline
//!
//! Drives a detected change through a fixed sequence of stages:
//!
//! ```text
//! DETECTED → EVIDENCE_ANCHORED → NOTICE_SENT → REGULATORY_FILED
//!          → MEDIA_ESCALATED → [CLASS_ACTION_PREPARED] → CLOSED
//! ```
//!
//! Every attempted stage appends an `EscalationRecord` to the evidence log.
//! Stages are independent: each attempt is bounded by `stage_timeout`, a
//! failed stage is retried with exponential backoff, and when it still fails
//! it is recorded as failed and the pipeline moves on.
//! `CLASS_ACTION_PREPARED` is entered only when the affected user count
//! reaches the configured threshold.

pub mod collaborators;
pub mod webhook;

pub use collaborators::{
    CaseFile, CollectiveActionService, DocumentGenerator, LoggingCollaborator,
    MediaContactService, NotificationService, RegulatoryFilingService, TemplateDocumentGenerator,
    TERMS_CHANGE_NOTICE,
};
pub use webhook::WebhookCollaborator;

use crate::error::{MonitorError, Result};
use crate::evidence::EvidenceLog;
use crate::sink::DistributedLedgerAnchor;
use crate::types::{
    Creditor, Diff, EscalationRecord, EscalationStage, Severity, StageOutcome, Violation,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Orchestrator tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationConfig {
    /// Minimum affected users before collective action is prepared
    pub class_action_threshold: usize,
    /// Attempts per stage, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Bound on a single stage attempt
    pub stage_timeout: Duration,
    /// Violations below this severity are not reported to the ledger
    pub ledger_min_severity: Severity,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            class_action_threshold: 100,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            stage_timeout: Duration::from_secs(30),
            ledger_min_severity: Severity::Medium,
        }
    }
}

/// Runs the response pipeline for detected changes
pub struct ResponseOrchestrator {
    config: EscalationConfig,
    log: Arc<dyn EvidenceLog>,
    ledger: Option<Arc<dyn DistributedLedgerAnchor>>,
    documents: Arc<dyn DocumentGenerator>,
    notifier: Arc<dyn NotificationService>,
    regulator: Arc<dyn RegulatoryFilingService>,
    media: Arc<dyn MediaContactService>,
    collective: Arc<dyn CollectiveActionService>,
}

impl ResponseOrchestrator {
    /// Create an orchestrator with template notices and logging collaborators
    pub fn new(log: Arc<dyn EvidenceLog>) -> Self {
        Self {
            config: EscalationConfig::default(),
            log,
            ledger: None,
            documents: Arc::new(TemplateDocumentGenerator::new()),
            notifier: Arc::new(LoggingCollaborator),
            regulator: Arc::new(LoggingCollaborator),
            media: Arc::new(LoggingCollaborator),
            collective: Arc::new(LoggingCollaborator),
        }
    }

    pub fn with_config(mut self, config: EscalationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn DistributedLedgerAnchor>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentGenerator>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationService>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_regulator(mut self, regulator: Arc<dyn RegulatoryFilingService>) -> Self {
        self.regulator = regulator;
        self
    }

    pub fn with_media(mut self, media: Arc<dyn MediaContactService>) -> Self {
        self.media = media;
        self
    }

    pub fn with_collective(mut self, collective: Arc<dyn CollectiveActionService>) -> Self {
        self.collective = collective;
        self
    }

    /// Drive `diff` through every stage, returning the records appended
    pub async fn run(
        &self,
        creditor: &Creditor,
        diff: &Diff,
        user_ids: &[String],
    ) -> Vec<EscalationRecord> {
        let mut records = Vec::new();

        tracing::info!(
            creditor = %creditor.id,
            change = %diff.id,
            violations = diff.violations.len(),
            affected_users = diff.affected_user_count,
            "Escalating terms change"
        );

        // DETECTED
        let detail = format!(
            "{} violation(s), {} line change(s)",
            diff.violations.len(),
            diff.textual_changes.len()
        );
        records.push(
            self.record(diff, EscalationStage::Detected, StageOutcome::Succeeded, 0, detail)
                .await,
        );

        // EVIDENCE_ANCHORED
        let qualifying: Vec<&Violation> = diff
            .violations
            .iter()
            .filter(|v| v.severity >= self.config.ledger_min_severity)
            .collect();
        let record = match &self.ledger {
            None => {
                self.record(
                    diff,
                    EscalationStage::EvidenceAnchored,
                    StageOutcome::Skipped,
                    0,
                    "no ledger configured",
                )
                .await
            }
            Some(_) if qualifying.is_empty() => {
                let detail = format!(
                    "no violations at or above {} severity",
                    self.config.ledger_min_severity
                );
                self.record(
                    diff,
                    EscalationStage::EvidenceAnchored,
                    StageOutcome::Skipped,
                    0,
                    detail,
                )
                .await
            }
            Some(ledger) => {
                let ledger = ledger.as_ref();
                let qualifying = qualifying.as_slice();
                // Receipts survive retries so accepted reports are never resent
                let receipts = Mutex::new(vec![None; qualifying.len()]);
                self.attempt(diff, EscalationStage::EvidenceAnchored, || {
                    anchor_violations(ledger, &creditor.id, qualifying, &receipts)
                })
                .await
            }
        };
        records.push(record);

        // NOTICE_SENT
        records.push(
            self.attempt(diff, EscalationStage::NoticeSent, || {
                self.send_notice(creditor, diff, user_ids)
            })
            .await,
        );

        let case = CaseFile::new(&creditor.name, &creditor.document_url, diff);

        // REGULATORY_FILED
        records.push(
            self.attempt(diff, EscalationStage::RegulatoryFiled, || {
                self.regulator.file(&case)
            })
            .await,
        );

        // MEDIA_ESCALATED
        records.push(
            self.attempt(diff, EscalationStage::MediaEscalated, || {
                self.trigger_media(&case)
            })
            .await,
        );

        // CLASS_ACTION_PREPARED
        if diff.affected_user_count >= self.config.class_action_threshold {
            let case = case.clone().with_user_ids(user_ids);
            records.push(
                self.attempt(diff, EscalationStage::ClassActionPrepared, || {
                    self.collective.prepare(&case)
                })
                .await,
            );
        } else {
            tracing::debug!(
                change = %diff.id,
                affected_users = diff.affected_user_count,
                threshold = self.config.class_action_threshold,
                "Below collective action threshold"
            );
        }

        // CLOSED
        let failed = records
            .iter()
            .filter(|r| r.outcome == StageOutcome::Failed)
            .count();
        records.push(
            self.record(
                diff,
                EscalationStage::Closed,
                StageOutcome::Succeeded,
                0,
                format!("{} stage(s) failed", failed),
            )
            .await,
        );

        records
    }

    async fn send_notice(
        &self,
        creditor: &Creditor,
        diff: &Diff,
        user_ids: &[String],
    ) -> Result<String> {
        let message = self
            .documents
            .render(TERMS_CHANGE_NOTICE, &notice_vars(creditor, diff))
            .await?;
        self.notifier.notify(user_ids, &message).await?;
        Ok(format!("notified {} user(s)", user_ids.len()))
    }

    async fn trigger_media(&self, case: &CaseFile) -> Result<String> {
        self.media.trigger(case).await?;
        Ok(case.summary())
    }

    /// Run a stage action with bounded retries and record the outcome
    async fn attempt<F, Fut>(
        &self,
        diff: &Diff,
        stage: EscalationStage,
        mut action: F,
    ) -> EscalationRecord
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let pending = tokio::time::timeout(self.config.stage_timeout, action());
            let outcome = match pending.await {
                Ok(result) => result,
                Err(_) => Err(MonitorError::EscalationStage {
                    stage: stage.to_string(),
                    reason: format!(
                        "timed out after {}ms",
                        self.config.stage_timeout.as_millis()
                    ),
                }),
            };
            match outcome {
                Ok(detail) => {
                    return self
                        .record(diff, stage, StageOutcome::Succeeded, attempts, detail)
                        .await;
                }
                Err(e) if attempts >= max_attempts => {
                    let error = MonitorError::EscalationStage {
                        stage: stage.to_string(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(
                        change = %diff.id,
                        stage = %stage,
                        attempts,
                        error = %error,
                        "Escalation stage failed, continuing"
                    );
                    return self
                        .record(diff, stage, StageOutcome::Failed, attempts, e.to_string())
                        .await;
                }
                Err(e) => {
                    tracing::debug!(
                        change = %diff.id,
                        stage = %stage,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Escalation stage attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
            }
        }
    }

    async fn record(
        &self,
        diff: &Diff,
        stage: EscalationStage,
        outcome: StageOutcome,
        attempts: u32,
        detail: impl Into<String>,
    ) -> EscalationRecord {
        let record = EscalationRecord::new(diff.id.clone(), stage, outcome, attempts, detail);
        if let Err(e) = self.log.append_escalation(&record).await {
            tracing::warn!(
                change = %diff.id,
                stage = %stage,
                error = %e,
                "Failed to append escalation record"
            );
        }
        tracing::info!(
            change = %diff.id,
            stage = %stage,
            outcome = %outcome,
            "Escalation stage recorded"
        );
        record
    }
}

async fn anchor_violations(
    ledger: &dyn DistributedLedgerAnchor,
    creditor_id: &str,
    violations: &[&Violation],
    receipts: &Mutex<Vec<Option<String>>>,
) -> Result<String> {
    let mut receipts = receipts.lock().await;
    for (violation, receipt) in violations.iter().zip(receipts.iter_mut()) {
        if receipt.is_none() {
            *receipt = Some(ledger.report_violation(creditor_id, &violation.rule).await?);
        }
    }
    Ok(receipts.iter().flatten().cloned().collect::<Vec<_>>().join(","))
}

fn notice_vars(creditor: &Creditor, diff: &Diff) -> BTreeMap<String, String> {
    let violations = if diff.violations.is_empty() {
        "- none classified".to_string()
    } else {
        diff.violations
            .iter()
            .map(|v| match &v.legal_reference {
                Some(reference) => format!("- {} ({})", v.description, reference),
                None => format!("- {}", v.description),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut vars = BTreeMap::new();
    vars.insert("creditor_id".to_string(), creditor.id.clone());
    vars.insert("creditor_name".to_string(), creditor.name.clone());
    vars.insert("document_url".to_string(), creditor.document_url.clone());
    vars.insert("detected_at".to_string(), diff.detected_at.to_rfc3339());
    vars.insert("old_hash".to_string(), diff.old_hash.clone());
    vars.insert("new_hash".to_string(), diff.new_hash.clone());
    vars.insert("violations".to_string(), violations);
    vars.insert(
        "affected_user_count".to_string(),
        diff.affected_user_count.to_string(),
    );
    vars
}
