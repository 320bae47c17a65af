//! Error types for the tax-rate updater.
//!
//! Library crates use [`TaxRatesError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-key failures that the pipeline expects (bad LLM output, schema
//! violations, exhausted retries) are modelled as values by the callers;
//! this enum is the channel for everything that travels through `?`.

use std::path::PathBuf;

/// Top-level error type for all tax-rate updater operations.
#[derive(Debug, thiserror::Error)]
pub enum TaxRatesError {
    /// Configuration loading or validation error. Fatal for a run.
    #[error("config error: {message}")]
    Config { message: String },

    /// Connection-level HTTP failure (refused, reset, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// A call exceeded its timeout ceiling.
    #[error("timeout: {0}")]
    Timeout(String),

    /// An upstream service answered with a non-success status.
    #[error("upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Text could not be parsed (data file, JSON payloads, LLM output).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The LLM backend answered but produced no usable content.
    #[error("llm error: {0}")]
    Llm(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid record).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A patch anchor could not be found in the destination text.
    #[error("anchor not found: {anchor}")]
    AnchorNotFound { anchor: String },

    /// A transient failure persisted through every allowed attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<TaxRatesError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TaxRatesError>;

impl TaxRatesError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an upstream status error.
    pub fn upstream(status: u16, msg: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: msg.into(),
        }
    }

    /// Create an anchor-not-found error naming the missing anchor.
    pub fn anchor_not_found(anchor: impl Into<String>) -> Self {
        Self::AnchorNotFound {
            anchor: anchor.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Network and timeout failures are transient, as is any 5xx answer.
    /// Every other status, and every non-HTTP error, is terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Upstream { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}
