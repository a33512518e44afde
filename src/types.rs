//! Core data model for terms monitoring
//!
//! Wire-facing types use camelCase JSON serialization so creditor records
//! and evidence exports stay compatible with the surrounding services.

use crate::hash::content_hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default interval between checks of a creditor's terms (24h)
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 86_400_000;

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_MS
}

/// A creditor whose published terms are monitored
///
/// Supplied by external configuration. Immutable for the lifetime of a
/// monitoring session; changed only through register/unregister.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creditor {
    /// Stable creditor identifier
    pub id: String,

    /// Display name (used in notices and ledger anchors)
    pub name: String,

    /// URL of the published terms document
    #[serde(alias = "document_url")]
    pub document_url: String,

    /// Check interval in milliseconds
    #[serde(
        rename = "checkInterval",
        alias = "check_interval_ms",
        default = "default_check_interval"
    )]
    pub check_interval_ms: u64,
}

impl Creditor {
    /// Create a creditor with the default 24h check interval
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        document_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            document_url: document_url.into(),
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
        }
    }

    /// Set the check interval in milliseconds
    pub fn with_check_interval(mut self, interval_ms: u64) -> Self {
        self.check_interval_ms = interval_ms;
        self
    }

    /// Check interval as a `Duration`
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// An immutable, hashed capture of a creditor's terms document
///
/// Created once per successful capture and never mutated afterwards.
/// Two snapshots with the same `content_hash` are evidentially equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Unique snapshot identifier (snap-<uuid>)
    pub id: String,

    /// Creditor this snapshot belongs to
    pub creditor_id: String,

    /// Capture timestamp
    pub captured_at: DateTime<Utc>,

    /// Normalized document text
    pub normalized_content: String,

    /// Lower-case hex SHA-256 of `normalized_content`
    pub content_hash: String,

    /// Sink name → reference, `None` where the write failed
    #[serde(default)]
    pub sink_references: BTreeMap<String, Option<String>>,

    /// Number of debtors linked to the creditor at capture time
    #[serde(default)]
    pub affected_user_count: usize,
}

impl Snapshot {
    /// Seal normalized content into a new snapshot
    pub fn new(creditor_id: impl Into<String>, normalized_content: impl Into<String>) -> Self {
        let normalized_content = normalized_content.into();
        Self {
            id: format!("snap-{}", uuid::Uuid::new_v4()),
            creditor_id: creditor_id.into(),
            captured_at: Utc::now(),
            content_hash: content_hash(&normalized_content),
            normalized_content,
            sink_references: BTreeMap::new(),
            affected_user_count: 0,
        }
    }

    /// Attach the per-sink write outcomes
    pub fn with_sink_references(mut self, refs: BTreeMap<String, Option<String>>) -> Self {
        self.sink_references = refs;
        self
    }

    /// Attach the affected user count
    pub fn with_affected_users(mut self, count: usize) -> Self {
        self.affected_user_count = count;
        self
    }

    /// Recompute the content hash and compare it with the stored one
    pub fn verify(&self) -> bool {
        content_hash(&self.normalized_content) == self.content_hash
    }

    /// Names of sinks that hold a reference to this snapshot
    pub fn stored_sinks(&self) -> Vec<&str> {
        self.sink_references
            .iter()
            .filter(|(_, r)| r.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of sinks whose write failed
    pub fn missing_sinks(&self) -> Vec<&str> {
        self.sink_references
            .iter()
            .filter(|(_, r)| r.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Kind of a line-level textual change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
}

/// One added or removed line between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChange {
    pub kind: ChangeKind,
    pub line: String,
}

/// Severity of a violation rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A violation classified from newly introduced text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Name of the rule that fired
    pub rule: String,

    /// Human-readable violation description
    pub description: String,

    pub severity: Severity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_reference: Option<String>,
}

/// The delta between two chronologically adjacent snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    /// Unique change identifier (chg-<uuid>)
    pub id: String,

    pub creditor_id: String,

    pub detected_at: DateTime<Utc>,

    /// Hash of the baseline snapshot
    pub old_hash: String,

    /// Hash of the new snapshot
    pub new_hash: String,

    /// Line-level changes, in document order
    pub textual_changes: Vec<TextChange>,

    /// Newly introduced violations, in rule-table order
    pub violations: Vec<Violation>,

    pub affected_user_count: usize,
}

impl Diff {
    /// Descriptions of the classified violations, in rule-table order
    pub fn violation_descriptions(&self) -> Vec<&str> {
        self.violations
            .iter()
            .map(|v| v.description.as_str())
            .collect()
    }

    /// Lines present only in the new snapshot
    pub fn added_lines(&self) -> impl Iterator<Item = &str> {
        self.textual_changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Added)
            .map(|c| c.line.as_str())
    }

    /// Lines present only in the baseline snapshot
    pub fn removed_lines(&self) -> impl Iterator<Item = &str> {
        self.textual_changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Removed)
            .map(|c| c.line.as_str())
    }

    /// Highest severity among the violations, if any
    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }
}

/// Stages of the graduated response pipeline, in fixed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationStage {
    Detected,
    EvidenceAnchored,
    NoticeSent,
    RegulatoryFiled,
    MediaEscalated,
    ClassActionPrepared,
    Closed,
}

impl EscalationStage {
    /// Every stage in pipeline order
    pub const ORDER: [EscalationStage; 7] = [
        EscalationStage::Detected,
        EscalationStage::EvidenceAnchored,
        EscalationStage::NoticeSent,
        EscalationStage::RegulatoryFiled,
        EscalationStage::MediaEscalated,
        EscalationStage::ClassActionPrepared,
        EscalationStage::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStage::Detected => "DETECTED",
            EscalationStage::EvidenceAnchored => "EVIDENCE_ANCHORED",
            EscalationStage::NoticeSent => "NOTICE_SENT",
            EscalationStage::RegulatoryFiled => "REGULATORY_FILED",
            EscalationStage::MediaEscalated => "MEDIA_ESCALATED",
            EscalationStage::ClassActionPrepared => "CLASS_ACTION_PREPARED",
            EscalationStage::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for EscalationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one attempted escalation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    Succeeded,
    Failed,
    /// Stage had nothing to do (e.g. no ledger configured)
    Skipped,
}

impl std::fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageOutcome::Succeeded => write!(f, "succeeded"),
            StageOutcome::Failed => write!(f, "failed"),
            StageOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Append-only record of one escalation stage attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRecord {
    /// Unique record identifier (esc-<uuid>)
    pub id: String,

    /// Change (Diff) this record belongs to
    pub change_id: String,

    pub stage: EscalationStage,

    pub timestamp: DateTime<Utc>,

    pub outcome: StageOutcome,

    /// Number of attempts made (0 for stages without an action)
    #[serde(default)]
    pub attempts: u32,

    /// Receipt, reason, or error text
    #[serde(default)]
    pub detail: String,
}

impl EscalationRecord {
    pub fn new(
        change_id: impl Into<String>,
        stage: EscalationStage,
        outcome: StageOutcome,
        attempts: u32,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("esc-{}", uuid::Uuid::new_v4()),
            change_id: change_id.into(),
            stage,
            timestamp: Utc::now(),
            outcome,
            attempts,
            detail: detail.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == StageOutcome::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creditor_defaults() {
        let creditor = Creditor::new("c1", "Lender AS", "https://lender.example/terms");
        assert_eq!(creditor.check_interval_ms, 86_400_000);
        assert_eq!(creditor.check_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_creditor_wire_format() {
        let json = r#"{"id":"c1","name":"Lender AS","documentUrl":"https://lender.example/terms"}"#;
        let creditor: Creditor = serde_json::from_str(json).unwrap();
        assert_eq!(creditor.document_url, "https://lender.example/terms");
        assert_eq!(creditor.check_interval_ms, DEFAULT_CHECK_INTERVAL_MS);

        let out = serde_json::to_string(&creditor.with_check_interval(60_000)).unwrap();
        assert!(out.contains("\"documentUrl\""));
        assert!(out.contains("\"checkInterval\":60000"));
    }

    #[test]
    fn test_snapshot_seal_and_verify() {
        let snapshot = Snapshot::new("c1", "terms v1");
        assert!(snapshot.id.starts_with("snap-"));
        assert_eq!(snapshot.content_hash.len(), 64);
        assert!(snapshot.verify());

        let mut tampered = snapshot.clone();
        tampered.normalized_content.push_str(" edited");
        assert!(!tampered.verify());
    }

    #[test]
    fn test_snapshot_sink_partition() {
        let mut refs = BTreeMap::new();
        refs.insert("local".to_string(), Some("/tmp/x".to_string()));
        refs.insert("content".to_string(), None);
        let snapshot = Snapshot::new("c1", "terms").with_sink_references(refs);

        assert_eq!(snapshot.stored_sinks(), vec!["local"]);
        assert_eq!(snapshot.missing_sinks(), vec!["content"]);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::default(), Severity::Medium);
    }

    #[test]
    fn test_stage_order_and_names() {
        assert_eq!(EscalationStage::ORDER[0], EscalationStage::Detected);
        assert_eq!(EscalationStage::ORDER[6], EscalationStage::Closed);
        assert!(EscalationStage::MediaEscalated < EscalationStage::ClassActionPrepared);

        let json = serde_json::to_string(&EscalationStage::ClassActionPrepared).unwrap();
        assert_eq!(json, "\"CLASS_ACTION_PREPARED\"");
        assert_eq!(EscalationStage::NoticeSent.to_string(), "NOTICE_SENT");
    }

    #[test]
    fn test_diff_helpers() {
        let diff = Diff {
            id: "chg-1".to_string(),
            creditor_id: "c1".to_string(),
            detected_at: Utc::now(),
            old_hash: "a".to_string(),
            new_hash: "b".to_string(),
            textual_changes: vec![
                TextChange { kind: ChangeKind::Removed, line: "old".to_string() },
                TextChange { kind: ChangeKind::Added, line: "new".to_string() },
            ],
            violations: vec![Violation {
                rule: "arbitration".to_string(),
                description: "desc".to_string(),
                severity: Severity::High,
                legal_reference: None,
            }],
            affected_user_count: 3,
        };

        assert_eq!(diff.added_lines().collect::<Vec<_>>(), vec!["new"]);
        assert_eq!(diff.removed_lines().collect::<Vec<_>>(), vec!["old"]);
        assert_eq!(diff.violation_descriptions(), vec!["desc"]);
        assert_eq!(diff.max_severity(), Some(Severity::High));
    }
}
