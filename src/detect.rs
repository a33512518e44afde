//! Change detection between adjacent snapshots
//!
//! Compares a new snapshot against the latest stored baseline for the same
//! creditor, producing a `Diff` with line-level changes and the violations
//! newly introduced by the new text.

use crate::error::MonitorError;
use crate::rules::RuleTable;
use crate::types::{ChangeKind, Diff, Snapshot, TextChange};
use chrono::Utc;
use similar::{ChangeTag, TextDiff};
use std::sync::Arc;

/// Snapshot comparator backed by a violation rule table
#[derive(Clone)]
pub struct ChangeDetector {
    rules: Arc<RuleTable>,
}

impl ChangeDetector {
    pub fn new(rules: Arc<RuleTable>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Compare `new` against the stored baseline
    ///
    /// Returns `None` when there is no baseline, when the baseline is
    /// malformed (it is then re-established by `new`), or when the hashes
    /// are equal.
    pub fn detect(&self, prior: Option<&Snapshot>, new: &Snapshot) -> Option<Diff> {
        let prior = prior?;

        if let Err(e) = validate_baseline(prior, new) {
            tracing::warn!(
                creditor = %new.creditor_id,
                baseline = %prior.id,
                error = %e,
                "Ignoring malformed baseline"
            );
            return None;
        }

        if prior.content_hash == new.content_hash {
            return None;
        }

        let textual_changes = line_changes(&prior.normalized_content, &new.normalized_content);
        let violations = self
            .rules
            .newly_introduced(&prior.normalized_content, &new.normalized_content);

        Some(Diff {
            id: format!("chg-{}", uuid::Uuid::new_v4()),
            creditor_id: new.creditor_id.clone(),
            detected_at: Utc::now(),
            old_hash: prior.content_hash.clone(),
            new_hash: new.content_hash.clone(),
            textual_changes,
            violations,
            affected_user_count: new.affected_user_count,
        })
    }
}

fn validate_baseline(prior: &Snapshot, new: &Snapshot) -> Result<(), MonitorError> {
    if prior.creditor_id != new.creditor_id {
        return Err(MonitorError::ChangeDetection(format!(
            "baseline belongs to creditor '{}'",
            prior.creditor_id
        )));
    }
    if !prior.verify() {
        return Err(MonitorError::ChangeDetection(
            "baseline content does not match its stored hash".to_string(),
        ));
    }
    Ok(())
}

/// Line-level added/removed lines between two normalized texts
pub fn line_changes(old: &str, new: &str) -> Vec<TextChange> {
    // Compare whole lines so a missing trailing newline is not a change
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let diff = TextDiff::from_slices(&old_lines, &new_lines);
    diff.iter_all_changes()
        .filter_map(|change| {
            let kind = match change.tag() {
                ChangeTag::Insert => ChangeKind::Added,
                ChangeTag::Delete => ChangeKind::Removed,
                ChangeTag::Equal => return None,
            };
            Some(TextChange {
                kind,
                line: change.value().to_string(),
            })
        })
        .collect()
}
