//! Declarative violation rule table
//!
//! Rules pair a regex pattern with the violation it indicates. Table order is
//! significant: classified violations are always reported in table order,
//! never in the order their text appears in a document.
//!
//! Tables can be loaded from TOML:
//!
//! ```toml
//! [[rule]]
//! name = "mandatory_arbitration"
//! pattern = "mandatory\\s+arbitration"
//! description = "May violate Norwegian consumer protection law"
//! severity = "high"
//! legal_reference = "Forbrukerkjøpsloven § 16"
//! ```

use crate::error::{MonitorError, Result};
use crate::types::{Severity, Violation};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Violation rule definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRule {
    pub name: String,
    pub pattern: String,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_reference: Option<String>,
}

impl ViolationRule {
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            description: description.into(),
            severity,
            legal_reference: None,
        }
    }

    pub fn with_legal_reference(mut self, reference: impl Into<String>) -> Self {
        self.legal_reference = Some(reference.into());
        self
    }

    fn violation(&self) -> Violation {
        Violation {
            rule: self.name.clone(),
            description: self.description.clone(),
            severity: self.severity,
            legal_reference: self.legal_reference.clone(),
        }
    }
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default, rename = "rule")]
    rules: Vec<ViolationRule>,
}

/// Compiled, ordered rule table
pub struct RuleTable {
    rules: Vec<(ViolationRule, Regex)>,
}

impl RuleTable {
    /// Compile rules; patterns are matched case-insensitively
    pub fn new(rules: Vec<ViolationRule>) -> Result<Self> {
        let compiled = rules
            .into_iter()
            .map(|rule| {
                let regex = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| MonitorError::InvalidRule {
                        rule: rule.name.clone(),
                        reason: e.to_string(),
                    })?;
                Ok((rule, regex))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules: compiled })
    }

    /// Parse and compile a TOML rule table (`[[rule]]` entries)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RuleFile = toml::from_str(content)?;
        Self::new(file.rules)
    }

    /// Load a TOML rule table from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Config(format!(
                "Failed to read rule table {}: {}",
                path.display(),
                e
            ))
        })?;
        let table = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), count = table.len(), "Rule table loaded");
        Ok(table)
    }

    /// Rules in table order
    pub fn rules(&self) -> impl Iterator<Item = &ViolationRule> {
        self.rules.iter().map(|(rule, _)| rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every rule matching `text`, in table order
    pub fn matching(&self, text: &str) -> Vec<Violation> {
        self.rules
            .iter()
            .filter(|(_, regex)| regex.is_match(text))
            .map(|(rule, _)| rule.violation())
            .collect()
    }

    /// Rules matching `new_text` but not `old_text`, in table order
    ///
    /// Each rule is reported at most once. Clauses that only disappeared
    /// never produce a violation.
    pub fn newly_introduced(&self, old_text: &str, new_text: &str) -> Vec<Violation> {
        self.rules
            .iter()
            .filter(|(_, regex)| regex.is_match(new_text) && !regex.is_match(old_text))
            .map(|(rule, _)| rule.violation())
            .collect()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new(default_rules()).expect("valid built-in rules")
    }
}

/// Built-in violation rules
pub fn default_rules() -> Vec<ViolationRule> {
    vec![
        ViolationRule::new(
            "mandatory_arbitration",
            r"\b(mandatory|binding|compulsory)\s+arbitration\b",
            "May violate Norwegian consumer protection law",
            Severity::High,
        )
        .with_legal_reference("Forbrukerkjøpsloven § 3 / Tvisteloven § 2-2"),
        ViolationRule::new(
            "class_action_waiver",
            r"\b(waive|waiver\s+of)\b[^.\n]*\bclass\s+action",
            "Class action waivers are unenforceable against consumers",
            Severity::High,
        )
        .with_legal_reference("Tvisteloven kap. 35"),
        ViolationRule::new(
            "unilateral_changes",
            r"\b(at\s+any\s+time|sole\s+discretion)\b[^.\n]*\b(change|modify|amend)",
            "Unilateral amendment of terms may be an unfair contract term",
            Severity::Medium,
        )
        .with_legal_reference("Avtaleloven § 36"),
        ViolationRule::new(
            "unauthorized_sharing",
            r"\b(share|transfer|disclose|sell)\b[^.\n]*\bthird[\s-]part(y|ies)",
            "Disclosure of personal data to third parties without legal basis",
            Severity::Critical,
        )
        .with_legal_reference("GDPR Article 6 / Article 44"),
        ViolationRule::new(
            "excessive_retention",
            r"\b(retain|store|keep)\b[^.\n]*\b\d+\s*(years?|months?)\b",
            "Personal data retained beyond the necessary period",
            Severity::High,
        )
        .with_legal_reference("GDPR Article 5(1)(e)"),
        ViolationRule::new(
            "missing_consent",
            r"\b(without|no)\s+(prior\s+)?(consent|permission|authori[sz]ation)\b",
            "Processing personal data without valid consent",
            Severity::Medium,
        )
        .with_legal_reference("GDPR Article 6"),
        ViolationRule::new(
            "excessive_fees",
            r"\b(fee|charge)s?\b[^.\n]*\b(access|copy|insight)\b[^.\n]*\b(personal\s+data|records)\b",
            "Charging fees for data subject access requests",
            Severity::Medium,
        )
        .with_legal_reference("GDPR Article 12(5)"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_compile() {
        let table = RuleTable::new(default_rules()).unwrap();
        assert_eq!(table.len(), default_rules().len());
        assert_eq!(RuleTable::default().len(), default_rules().len());
        assert_eq!(RuleTable::default().len(), table.len());
    }

    #[test]
    fn test_arbitration_rule() {
        let table = RuleTable::default();
        let found = table.matching("All disputes are subject to Mandatory Arbitration in Oslo.");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule, "mandatory_arbitration");
        assert_eq!(
            found[0].description,
            "May violate Norwegian consumer protection law"
        );
        assert!(table.matching("no arbitration clause").is_empty());
    }

    #[test]
    fn test_newly_introduced_ignores_existing_and_removed() {
        let table = RuleTable::default();
        let old = "We may share your data with third parties.";
        let new = "Disputes go to binding arbitration.";

        let added = table.newly_introduced(old, new);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].rule, "mandatory_arbitration");

        let both = format!("{}\n{}", old, new);
        assert!(table.newly_introduced(&both, &both).is_empty());
    }

    #[test]
    fn test_table_order_not_text_order() {
        let table = RuleTable::new(vec![
            ViolationRule::new("first", "alpha", "First rule", Severity::Low),
            ViolationRule::new("second", "beta", "Second rule", Severity::Low),
        ])
        .unwrap();

        let found = table.newly_introduced("", "beta appears before alpha; alpha again");
        let names: Vec<_> = found.iter().map(|v| v.rule.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = RuleTable::new(vec![ViolationRule::new(
            "broken",
            "(unclosed",
            "Broken",
            Severity::Low,
        )]);
        assert!(matches!(result, Err(MonitorError::InvalidRule { rule, .. }) if rule == "broken"));
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            [[rule]]
            name = "late_fee"
            pattern = "late\\s+fee"
            description = "Late fee introduced"
            severity = "low"

            [[rule]]
            name = "arbitration"
            pattern = "arbitration"
            description = "Arbitration clause"
            legal_reference = "Tvisteloven"
        "#;
        let table = RuleTable::from_toml_str(toml_str).unwrap();
        let rules: Vec<_> = table.rules().collect();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].severity, Severity::Low);
        assert_eq!(rules[1].severity, Severity::Medium);
        assert_eq!(rules[1].legal_reference.as_deref(), Some("Tvisteloven"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(
            &path,
            "[[rule]]\nname = \"x\"\npattern = \"x\"\ndescription = \"X\"\n",
        )
        .unwrap();

        let table = RuleTable::load(&path).unwrap();
        assert_eq!(table.len(), 1);

        let missing = RuleTable::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(MonitorError::Config(_))));
    }
}
