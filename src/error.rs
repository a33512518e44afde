//! Error types for a3s-tos-monitor

use thiserror::Error;

/// Errors that can occur while monitoring terms documents
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Document fetch failure (network, timeout, non-success status)
    #[error("Failed to fetch document '{url}': {reason}")]
    Fetch { url: String, reason: String },

    /// Fetched content was empty or could not be parsed as text
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// A single evidence sink rejected a write
    #[error("Evidence sink '{sink}' write failed: {reason}")]
    SinkWrite { sink: String, reason: String },

    /// Stored baseline could not be used for comparison
    #[error("Change detection error: {0}")]
    ChangeDetection(String),

    /// An escalation stage failed after all retries
    #[error("Escalation stage '{stage}' failed: {reason}")]
    EscalationStage { stage: String, reason: String },

    /// Violation rule could not be compiled
    #[error("Invalid violation rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// A monitoring cycle ended abnormally (panic or cancelled task)
    #[error("Monitoring cycle for '{creditor}' aborted: {reason}")]
    CycleAborted { creditor: String, reason: String },

    /// Creditor is not registered with the scheduler
    #[error("Creditor not registered: {0}")]
    NotRegistered(String),

    /// Creditor is already registered with the scheduler
    #[error("Creditor already registered: {0}")]
    AlreadyRegistered(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization failure
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// HTTP client failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MonitorError {
    /// Build a sink write error
    pub fn sink(sink: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SinkWrite {
            sink: sink.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a fetch error
    pub fn fetch(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;
