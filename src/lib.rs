//! # a3s-tos-monitor
//!
//! Terms-of-service change monitoring with tamper-evident evidence and a
//! graduated automated response.
//!
//! ## Overview
//!
//! `a3s-tos-monitor` periodically fetches the published terms of each
//! registered creditor, seals every capture into a hashed `Snapshot`, writes
//! it to independent evidence sinks, and compares it with the previous
//! snapshot. Newly introduced clauses are classified against a declarative
//! violation rule table, and every change is driven through an escalation
//! pipeline (ledger anchor, debtor notice, regulatory filing, media,
//! collective action).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use a3s_tos_monitor::{
//!     ChangeDetector, Creditor, HttpFetcher, LocalRecordSink, MemoryEvidenceLog,
//!     MonitorPipeline, MonitorScheduler, ResponseOrchestrator, RuleTable, SnapshotCapturer,
//! };
//!
//! # async fn example() -> a3s_tos_monitor::Result<()> {
//! let log = Arc::new(MemoryEvidenceLog::new());
//! let capturer = SnapshotCapturer::new(Arc::new(HttpFetcher::new()))
//!     .with_sink(Arc::new(LocalRecordSink::new("/tmp/tos-records")));
//! let detector = ChangeDetector::new(Arc::new(RuleTable::default()));
//! let orchestrator = ResponseOrchestrator::new(log.clone());
//! let pipeline = MonitorPipeline::new(capturer, detector, log, orchestrator);
//!
//! let scheduler = MonitorScheduler::new(Arc::new(pipeline));
//! scheduler
//!     .register(Creditor::new("lender", "Lender AS", "https://lender.example/terms"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **hash**: deterministic normalization and SHA-256 content hashing
//! - **sink**: `EvidenceSink` trait with local, content-addressed, ledger
//!   and web archive variants
//! - **capture**: fetch, normalize, seal, and fan out to sinks
//! - **rules** / **detect**: ordered violation rules and snapshot diffing
//! - **evidence**: append-only log of snapshots, changes, and escalations
//! - **escalation**: the graduated response pipeline and its collaborators
//! - **monitor** / **scheduler**: one cycle, and one recurring task per creditor

pub mod capture;
pub mod cli;
pub mod config;
pub mod detect;
pub mod dirs;
pub mod error;
pub mod escalation;
pub mod evidence;
pub mod hash;
pub mod monitor;
pub mod rules;
pub mod scheduler;
pub mod sink;
pub mod types;

// Re-export core types
pub use capture::{
    AffectedUsers, CapturedTerms, DocumentFetcher, HttpFetcher, SnapshotCapturer,
    StaticAffectedUsers,
};
pub use config::MonitorConfig;
pub use detect::ChangeDetector;
pub use error::{MonitorError, Result};
pub use escalation::{
    CaseFile, CollectiveActionService, DocumentGenerator, EscalationConfig, LoggingCollaborator,
    MediaContactService, NotificationService, RegulatoryFilingService, ResponseOrchestrator,
    TemplateDocumentGenerator, WebhookCollaborator,
};
pub use evidence::{EvidenceLog, FileEvidenceLog, MemoryEvidenceLog};
pub use hash::{content_hash, normalize, normalize_and_hash};
pub use monitor::{CycleReport, MonitorPipeline};
pub use rules::{default_rules, RuleTable, ViolationRule};
pub use scheduler::{MonitorScheduler, SchedulerEvent, SchedulerStats};
pub use types::{
    ChangeKind, Creditor, Diff, EscalationRecord, EscalationStage, Severity, Snapshot,
    StageOutcome, TextChange, Violation,
};

// Re-export sinks for convenience
pub use sink::{
    ContentAddressedSink, ContentAddressedStore, DistributedLedgerAnchor, EvidenceSink,
    HttpContentStore, HttpLedgerAnchor, LedgerAnchorSink, LocalRecordSink, MemoryContentStore,
    MemoryLedger, SinkPayload, WaybackMirror, WebArchiveMirror, WebArchiveSink,
};
