//! Error types for the options scanner

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-symbol failure as recorded in a scan summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// No options market or no resolvable spot price
    DataUnavailable,
    /// Transport, parse or data-integrity failure upstream
    Upstream,
    /// Fetch exceeded the per-symbol bound
    Timeout,
    /// Rejected before any fetch
    Invalid,
    /// Scan was aborted
    Cancelled,
}

impl FailureKind {
    /// Timeouts aggregate exactly like upstream errors.
    pub fn is_upstream(&self) -> bool {
        matches!(self, FailureKind::Upstream | FailureKind::Timeout)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScannerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Timed out after {secs}s fetching {symbol}")]
    Timeout { symbol: String, secs: u64 },

    #[error("Scan failed: all {} symbols failed", failures.len())]
    ScanFailed { failures: Vec<(String, String)> },

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ScannerResult<T> = Result<T, ScannerError>;

impl ScannerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn data_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classification used when folding a per-symbol error into the summary
    pub fn kind(&self) -> FailureKind {
        match self {
            ScannerError::DataUnavailable { .. } => FailureKind::DataUnavailable,
            ScannerError::Upstream(_) => FailureKind::Upstream,
            ScannerError::Timeout { .. } => FailureKind::Timeout,
            ScannerError::Cancelled => FailureKind::Cancelled,
            ScannerError::InvalidInput(_)
            | ScannerError::Config(_)
            | ScannerError::ScanFailed { .. } => FailureKind::Invalid,
        }
    }
}

impl From<reqwest::Error> for ScannerError {
    fn from(e: reqwest::Error) -> Self {
        ScannerError::Upstream(e.to_string())
    }
}

impl From<serde_json::Error> for ScannerError {
    fn from(e: serde_json::Error) -> Self {
        ScannerError::Upstream(format!("malformed response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            ScannerError::data_unavailable("ZZZZ", "no options").kind(),
            FailureKind::DataUnavailable
        );
        let timeout = ScannerError::Timeout {
            symbol: "AAPL".into(),
            secs: 30,
        };
        assert_eq!(timeout.kind(), FailureKind::Timeout);
        assert!(timeout.kind().is_upstream());
        assert!(ScannerError::upstream("boom").kind().is_upstream());
        assert!(!FailureKind::DataUnavailable.is_upstream());
    }

    #[test]
    fn test_scan_failed_message() {
        let err = ScannerError::ScanFailed {
            failures: vec![("A".into(), "x".into()), ("B".into(), "y".into())],
        };
        assert_eq!(err.to_string(), "Scan failed: all 2 symbols failed");
    }
}
