//! External collaborators driven by the response pipeline
//!
//! The orchestrator only sees these traits. Bundled implementations render
//! notices from templates and log every other action; see
//! [`super::webhook`] for the HTTP variant.

use crate::error::{MonitorError, Result};
use crate::types::{Diff, Violation};
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Template used for the debtor notice
pub const TERMS_CHANGE_NOTICE: &str = "terms_change_notice";

/// Renders legal notice bodies
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn render(&self, template: &str, vars: &BTreeMap<String, String>) -> Result<String>;
}

/// Dispatches messages to affected users
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(&self, user_ids: &[String], message: &str) -> Result<()>;
}

/// Files a complaint with the regulator, returning its receipt
#[async_trait]
pub trait RegulatoryFilingService: Send + Sync {
    async fn file(&self, complaint: &CaseFile) -> Result<String>;
}

/// Starts a media campaign about a change
#[async_trait]
pub trait MediaContactService: Send + Sync {
    async fn trigger(&self, campaign: &CaseFile) -> Result<()>;
}

/// Prepares a collective action case, returning its reference
#[async_trait]
pub trait CollectiveActionService: Send + Sync {
    async fn prepare(&self, case: &CaseFile) -> Result<String>;
}

/// Everything an external service needs to act on one detected change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseFile {
    pub change_id: String,
    pub creditor_id: String,
    pub creditor_name: String,
    pub document_url: String,
    pub old_hash: String,
    pub new_hash: String,
    pub violations: Vec<Violation>,
    pub added_lines: Vec<String>,
    pub affected_user_count: usize,
    /// Recipients, populated only for collective action
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_ids: Vec<String>,
}

impl CaseFile {
    pub fn new(creditor_name: &str, document_url: &str, diff: &Diff) -> Self {
        Self {
            change_id: diff.id.clone(),
            creditor_id: diff.creditor_id.clone(),
            creditor_name: creditor_name.to_string(),
            document_url: document_url.to_string(),
            old_hash: diff.old_hash.clone(),
            new_hash: diff.new_hash.clone(),
            violations: diff.violations.clone(),
            added_lines: diff.added_lines().map(str::to_string).collect(),
            affected_user_count: diff.affected_user_count,
            user_ids: Vec::new(),
        }
    }

    pub fn with_user_ids(mut self, user_ids: &[String]) -> Self {
        self.user_ids = user_ids.to_vec();
        self
    }

    /// One-line summary used in logs and receipts
    pub fn summary(&self) -> String {
        if self.violations.is_empty() {
            format!(
                "{} changed its terms ({} new line(s))",
                self.creditor_name,
                self.added_lines.len()
            )
        } else {
            let rules: Vec<&str> = self.violations.iter().map(|v| v.rule.as_str()).collect();
            format!("{} introduced: {}", self.creditor_name, rules.join(", "))
        }
    }
}

// ============================================================================
// Template document generator
// ============================================================================

const DEFAULT_NOTICE: &str = "\
Notice of changed terms: {{creditor_name}}

{{creditor_name}} changed its published terms on {{detected_at}}.
Document: {{document_url}}
Previous version: sha256 {{old_hash}}
Current version: sha256 {{new_hash}}

Newly introduced clauses that may be unlawful:
{{violations}}

Both versions are archived as evidence. This notice is generated
automatically and is not legal advice.
";

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid built-in pattern")
    })
}

/// `{{name}}` substitution over named templates
///
/// Unknown variables render as empty text. Unknown templates are an error.
pub struct TemplateDocumentGenerator {
    templates: HashMap<String, String>,
}

impl TemplateDocumentGenerator {
    pub fn new() -> Self {
        let mut templates = HashMap::new();
        templates.insert(TERMS_CHANGE_NOTICE.to_string(), DEFAULT_NOTICE.to_string());
        Self { templates }
    }

    /// Add or replace a template
    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(name.into(), body.into());
        self
    }

    fn substitute(body: &str, vars: &BTreeMap<String, String>) -> String {
        placeholder()
            .replace_all(body, |caps: &Captures| {
                vars.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }
}

impl Default for TemplateDocumentGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentGenerator for TemplateDocumentGenerator {
    async fn render(&self, template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
        let body = self
            .templates
            .get(template)
            .ok_or_else(|| MonitorError::Config(format!("Unknown document template '{}'", template)))?;
        Ok(Self::substitute(body, vars))
    }
}

// ============================================================================
// Logging collaborator
// ============================================================================

/// Collaborator that only logs; used when no external service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCollaborator;

#[async_trait]
impl NotificationService for LoggingCollaborator {
    async fn notify(&self, user_ids: &[String], message: &str) -> Result<()> {
        tracing::info!(
            recipients = user_ids.len(),
            bytes = message.len(),
            "Notice dispatched"
        );
        Ok(())
    }
}

#[async_trait]
impl RegulatoryFilingService for LoggingCollaborator {
    async fn file(&self, complaint: &CaseFile) -> Result<String> {
        tracing::info!(
            creditor = %complaint.creditor_id,
            change = %complaint.change_id,
            summary = %complaint.summary(),
            "Regulatory complaint filed"
        );
        Ok(format!("logged:{}", complaint.change_id))
    }
}

#[async_trait]
impl MediaContactService for LoggingCollaborator {
    async fn trigger(&self, campaign: &CaseFile) -> Result<()> {
        tracing::info!(
            creditor = %campaign.creditor_id,
            change = %campaign.change_id,
            "Media campaign triggered"
        );
        Ok(())
    }
}

#[async_trait]
impl CollectiveActionService for LoggingCollaborator {
    async fn prepare(&self, case: &CaseFile) -> Result<String> {
        tracing::info!(
            creditor = %case.creditor_id,
            change = %case.change_id,
            claimants = case.affected_user_count,
            "Collective action prepared"
        );
        Ok(format!("logged:{}", case.change_id))
    }
}
