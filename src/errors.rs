//! Typed error hierarchy for the scan orchestrator.
//!
//! Two top-level enums cover the two concerns that matter to callers:
//! - `ConfigError` — fatal validation failures at `ScanConfig` construction
//! - `ScanError` — faults that occur once a scan is running
//!
//! Most `ScanError` variants are non-fatal: spec.md §7 classifies them and
//! requires the phase that hit them to keep going (marking a sub-phase as
//! errored, or yielding an empty result set) rather than aborting the scan.
//! Only the unclassified `Io`/`Internal` variants escalate to `scan:error`.

use thiserror::Error;

/// Errors from `ScanConfig` construction. Fatal: the scan never starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("target URL is required")]
    MissingTargetUrl,

    #[error("target URL '{0}' is not a well-formed absolute URL")]
    InvalidTargetUrl(String),

    #[error("at least one of flags.sqli or flags.xss must be enabled")]
    NoToolsEnabled,

    #[error("{tool} tool path '{path}' does not look like a usable executable or script")]
    InvalidToolPath { tool: &'static str, path: String },

    #[error("thread count must be at least 1, got {0}")]
    InvalidThreadCount(u32),

    #[error("per-invocation timeout must be at least 1 second, got {0}")]
    InvalidTimeout(u64),

    #[error("sqli level must be in 1..=5, got {0}")]
    InvalidSqliLevel(u8),

    #[error("sqli risk must be in 1..=3, got {0}")]
    InvalidSqliRisk(u8),

    #[error("header '{0}' is not of the form 'Name: Value'")]
    InvalidHeader(String),
}

/// Errors that can occur once a scan is in progress.
///
/// Variants map directly onto the error-kind taxonomy in spec.md §7.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("tool '{tool}' could not be located or invoked")]
    ToolMissing { tool: &'static str },

    #[error("tool '{tool}' invocation failed: {detail}")]
    ToolInvocationFailed { tool: String, detail: String },

    #[error("no discovery CSV artifact found under {searched_in}")]
    ArtifactNotFound { searched_in: String },

    #[error("failed to parse {what}: {detail}")]
    ParseError { what: &'static str, detail: String },

    #[error("tool '{tool}' exceeded its per-invocation deadline")]
    Timeout { tool: &'static str },

    #[error("operation cancelled by stop()")]
    Cancelled,

    #[error("start() called on an already-started orchestrator")]
    AlreadyStarted,

    #[error("control call rejected: scan is already in terminal state '{state}'")]
    AlreadyTerminal { state: &'static str },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Whether this error is one of the non-fatal, "caught at the phase
    /// boundary" kinds that must never surface as `scan:error`.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ScanError::Io(_))
    }
}
