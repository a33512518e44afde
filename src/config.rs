//! Monitor configuration
//!
//! ```toml
//! data_dir = "/var/lib/tos-monitor"
//! fetch_timeout_ms = 30000
//! sink_timeout_ms = 30000
//! rules_path = "rules.toml"
//!
//! [escalation]
//! class_action_threshold = 100
//! max_attempts = 3
//! stage_timeout_ms = 30000
//! notification_webhook = "https://hooks.example/notify"
//!
//! [sinks]
//! local = true
//! content_store_url = "http://127.0.0.1:5001"
//! ledger_url = "https://evidence.example"
//! archive_url = "https://web.archive.org"
//!
//! [[creditor]]
//! id = "lender-as"
//! name = "Lender AS"
//! documentUrl = "https://lender.example/terms"
//! checkInterval = 86400000
//!
//! [affected_users]
//! lender-as = ["user-1", "user-2"]
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::{HttpFetcher, SnapshotCapturer, StaticAffectedUsers};
use crate::detect::ChangeDetector;
use crate::dirs;
use crate::error::{MonitorError, Result};
use crate::escalation::{EscalationConfig, ResponseOrchestrator, WebhookCollaborator};
use crate::evidence::{EvidenceLog, FileEvidenceLog};
use crate::monitor::MonitorPipeline;
use crate::rules::RuleTable;
use crate::sink::{
    ContentAddressedSink, DistributedLedgerAnchor, EvidenceSink, HttpContentStore,
    HttpLedgerAnchor, LedgerAnchorSink, LocalRecordSink, WaybackMirror, WebArchiveSink,
};
use crate::types::{Creditor, Severity};

/// User-configurable settings for the monitor and CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Base directory for evidence and local records
    #[serde(default = "dirs::monitor_home")]
    pub data_dir: PathBuf,

    /// Bound on a single document fetch (default: 30000)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Bound on a single evidence sink write (default: 30000)
    #[serde(default = "default_sink_timeout_ms")]
    pub sink_timeout_ms: u64,

    /// Optional TOML rule table replacing the built-in rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<PathBuf>,

    #[serde(default)]
    pub escalation: EscalationSettings,

    #[serde(default)]
    pub sinks: SinkSettings,

    /// Creditor id → debtor ids
    #[serde(default)]
    pub affected_users: HashMap<String, Vec<String>>,

    #[serde(default, rename = "creditor")]
    pub creditors: Vec<Creditor>,
}

/// `[escalation]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationSettings {
    #[serde(default = "default_class_action_threshold")]
    pub class_action_threshold: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Bound on a single stage attempt (default: 30000)
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,

    /// Violations below this severity are not reported to the ledger
    #[serde(default)]
    pub ledger_min_severity: Severity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_webhook: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulatory_webhook: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_webhook: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collective_action_webhook: Option<String>,
}

/// `[sinks]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSettings {
    /// Write-once files under `<data_dir>/records` (default: true)
    #[serde(default = "default_true")]
    pub local: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_store_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_sink_timeout_ms() -> u64 {
    30_000
}

fn default_stage_timeout_ms() -> u64 {
    30_000
}

fn default_class_action_threshold() -> usize {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::monitor_home(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            sink_timeout_ms: default_sink_timeout_ms(),
            rules_path: None,
            escalation: EscalationSettings::default(),
            sinks: SinkSettings::default(),
            affected_users: HashMap::new(),
            creditors: Vec::new(),
        }
    }
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            class_action_threshold: default_class_action_threshold(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            stage_timeout_ms: default_stage_timeout_ms(),
            ledger_min_severity: Severity::default(),
            notification_webhook: None,
            regulatory_webhook: None,
            media_webhook: None,
            collective_action_webhook: None,
        }
    }
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            local: true,
            content_store_url: None,
            ledger_url: None,
            archive_url: None,
        }
    }
}

impl EscalationSettings {
    pub fn to_config(&self) -> EscalationConfig {
        EscalationConfig {
            class_action_threshold: self.class_action_threshold,
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            stage_timeout: Duration::from_millis(self.stage_timeout_ms),
            ledger_min_severity: self.ledger_min_severity,
        }
    }
}

impl MonitorConfig {
    /// Load and validate configuration from `path`.
    /// Returns default config if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: MonitorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default config file path.
    pub fn load_default() -> Result<Self> {
        Self::load(dirs::config_path())
    }

    /// Save the configuration to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout_ms == 0 {
            return Err(MonitorError::Config(
                "fetch_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.sink_timeout_ms == 0 {
            return Err(MonitorError::Config(
                "sink_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.escalation.stage_timeout_ms == 0 {
            return Err(MonitorError::Config(
                "escalation.stage_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.escalation.max_attempts == 0 {
            return Err(MonitorError::Config(
                "escalation.max_attempts must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for creditor in &self.creditors {
            if creditor.id.trim().is_empty() {
                return Err(MonitorError::Config("creditor id must not be empty".to_string()));
            }
            if !seen.insert(creditor.id.as_str()) {
                return Err(MonitorError::Config(format!(
                    "duplicate creditor id '{}'",
                    creditor.id
                )));
            }
            if creditor.document_url.trim().is_empty() {
                return Err(MonitorError::Config(format!(
                    "creditor '{}' has an empty document URL",
                    creditor.id
                )));
            }
            if creditor.check_interval_ms == 0 {
                return Err(MonitorError::Config(format!(
                    "creditor '{}' has a zero check interval",
                    creditor.id
                )));
            }
        }

        let urls = [
            ("sinks.content_store_url", &self.sinks.content_store_url),
            ("sinks.ledger_url", &self.sinks.ledger_url),
            ("sinks.archive_url", &self.sinks.archive_url),
            ("escalation.notification_webhook", &self.escalation.notification_webhook),
            ("escalation.regulatory_webhook", &self.escalation.regulatory_webhook),
            ("escalation.media_webhook", &self.escalation.media_webhook),
            (
                "escalation.collective_action_webhook",
                &self.escalation.collective_action_webhook,
            ),
        ];
        for (key, url) in urls {
            if matches!(url, Some(u) if u.trim().is_empty()) {
                return Err(MonitorError::Config(format!("{} must not be empty", key)));
            }
        }

        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }

    pub fn evidence_dir(&self) -> PathBuf {
        dirs::evidence_dir(&self.data_dir)
    }

    pub fn records_dir(&self) -> PathBuf {
        dirs::records_dir(&self.data_dir)
    }

    /// Configured creditor by id
    pub fn creditor(&self, id: &str) -> Option<&Creditor> {
        self.creditors.iter().find(|c| c.id == id)
    }

    /// Rule table from `rules_path`, or the built-in rules
    pub fn rule_table(&self) -> Result<RuleTable> {
        match &self.rules_path {
            Some(path) => RuleTable::load(path),
            None => Ok(RuleTable::default()),
        }
    }

    fn ledger(&self) -> Option<Arc<dyn DistributedLedgerAnchor>> {
        self.sinks
            .ledger_url
            .as_ref()
            .map(|url| Arc::new(HttpLedgerAnchor::new(url.as_str())) as Arc<dyn DistributedLedgerAnchor>)
    }

    /// Evidence sinks enabled by `[sinks]`
    pub fn evidence_sinks(
        &self,
        ledger: Option<Arc<dyn DistributedLedgerAnchor>>,
    ) -> Vec<Arc<dyn EvidenceSink>> {
        let mut sinks: Vec<Arc<dyn EvidenceSink>> = Vec::new();
        if self.sinks.local {
            sinks.push(Arc::new(LocalRecordSink::new(self.records_dir())));
        }
        if let Some(url) = &self.sinks.content_store_url {
            sinks.push(Arc::new(ContentAddressedSink::new(Arc::new(
                HttpContentStore::new(url.as_str()),
            ))));
        }
        if let Some(ledger) = ledger {
            sinks.push(Arc::new(LedgerAnchorSink::new(ledger)));
        }
        if let Some(url) = &self.sinks.archive_url {
            sinks.push(Arc::new(WebArchiveSink::new(Arc::new(WaybackMirror::new(
                url.as_str(),
            )))));
        }
        sinks
    }

    /// Response orchestrator with webhooks where configured, logging
    /// collaborators elsewhere
    pub fn orchestrator(
        &self,
        log: Arc<dyn EvidenceLog>,
        ledger: Option<Arc<dyn DistributedLedgerAnchor>>,
    ) -> ResponseOrchestrator {
        let settings = &self.escalation;
        let mut orchestrator = ResponseOrchestrator::new(log).with_config(settings.to_config());
        if let Some(hook) = webhook(&settings.notification_webhook) {
            orchestrator = orchestrator.with_notifier(hook);
        }
        if let Some(hook) = webhook(&settings.regulatory_webhook) {
            orchestrator = orchestrator.with_regulator(hook);
        }
        if let Some(hook) = webhook(&settings.media_webhook) {
            orchestrator = orchestrator.with_media(hook);
        }
        if let Some(hook) = webhook(&settings.collective_action_webhook) {
            orchestrator = orchestrator.with_collective(hook);
        }
        if let Some(ledger) = ledger {
            orchestrator = orchestrator.with_ledger(ledger);
        }
        orchestrator
    }

    /// Build the full pipeline over a file-backed evidence log
    pub async fn build_pipeline(&self) -> Result<MonitorPipeline> {
        dirs::ensure_dirs(&self.data_dir)?;

        let log: Arc<dyn EvidenceLog> = Arc::new(FileEvidenceLog::new(self.evidence_dir()).await?);
        let rules = self.rule_table()?;
        let ledger = self.ledger();

        let capturer = SnapshotCapturer::new(Arc::new(HttpFetcher::new()))
            .with_sinks(self.evidence_sinks(ledger.clone()))
            .with_affected_users(Arc::new(StaticAffectedUsers::new(self.affected_users.clone())))
            .with_fetch_timeout(self.fetch_timeout())
            .with_sink_timeout(self.sink_timeout());

        tracing::debug!(
            data_dir = %self.data_dir.display(),
            sinks = ?capturer.sink_names(),
            rules = rules.len(),
            "Pipeline configured"
        );

        let detector = ChangeDetector::new(Arc::new(rules));
        let orchestrator = self.orchestrator(log.clone(), ledger);
        Ok(MonitorPipeline::new(capturer, detector, log, orchestrator))
    }
}

fn webhook(url: &Option<String>) -> Option<Arc<WebhookCollaborator>> {
    url.as_ref()
        .map(|url| Arc::new(WebhookCollaborator::new(url.as_str())))
}
