//! Scanner configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::{ScannerError, ScannerResult};
use crate::scan::DEFAULT_VOLUME_THRESHOLD;

/// Upper bound on concurrent symbol workers
pub const MAX_WORKERS: usize = 64;

/// Tunables for a [`Scanner`](crate::scan::Scanner) and its cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Annualized continuously-compounded rate used for pricing
    /// Default: 0.05
    pub risk_free_rate: f64,

    /// Threshold used when a request gives none
    /// Default: 100
    pub default_volume_threshold: u64,

    /// Concurrent symbol workers, 1..=64
    /// Default: 4
    pub workers: usize,

    /// Per-symbol fetch bound
    /// Default: 30
    pub symbol_timeout_secs: u64,

    /// Lifetime of a cached scan
    /// Default: 300
    pub cache_ttl_secs: u64,

    /// Events buffered per progress subscriber
    /// Default: 64
    pub progress_capacity: usize,

    /// Largest accepted symbol set
    /// Default: 100
    pub max_symbols: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.05,
            default_volume_threshold: DEFAULT_VOLUME_THRESHOLD,
            workers: 4,
            symbol_timeout_secs: 30,
            cache_ttl_secs: 300,
            progress_capacity: 64,
            max_symbols: 100,
        }
    }
}

impl ScannerConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> ScannerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ScannerError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ScannerError::config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> ScannerResult<()> {
        if !self.risk_free_rate.is_finite() {
            return Err(ScannerError::config("risk_free_rate must be finite"));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(ScannerError::config(format!(
                "workers must be between 1 and {}, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        if self.symbol_timeout_secs == 0 {
            return Err(ScannerError::config("symbol_timeout_secs must be positive"));
        }
        if self.progress_capacity == 0 {
            return Err(ScannerError::config("progress_capacity must be positive"));
        }
        if self.max_symbols == 0 {
            return Err(ScannerError::config("max_symbols must be positive"));
        }
        Ok(())
    }

    pub fn symbol_timeout(&self) -> Duration {
        Duration::from_secs(self.symbol_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.risk_free_rate, 0.05);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.default_volume_threshold, 100);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"workers": 8, "risk_free_rate": 0.043}}"#).unwrap();

        let config = ScannerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.risk_free_rate, 0.043);
        assert_eq!(config.symbol_timeout_secs, 30);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"workers": 0}}"#).unwrap();
        assert!(matches!(
            ScannerConfig::from_file(file.path()),
            Err(ScannerError::Config(_))
        ));

        let config = ScannerConfig {
            symbol_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScannerConfig::from_file(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ScannerError::Config(_)));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(ScannerConfig::from_file(file.path()).is_err());
    }
}
