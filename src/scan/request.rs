//! Scan requests
//!
//! Symbols are trimmed, upper-cased, deduplicated and sorted on construction,
//! so two requests naming the same symbols in any order are equal and share a
//! cache fingerprint.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{days_to_expiry, ScannerError, ScannerResult};

pub const DEFAULT_VOLUME_THRESHOLD: u64 = 100;

/// Longest accepted ticker
const MAX_TICKER_LEN: usize = 12;

/// Which expirations a scan covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExpiryFilter {
    #[default]
    All,
    /// Expirations at most this many calendar days out
    WithinDays(u32),
}

impl ExpiryFilter {
    pub fn allows(&self, now: DateTime<Utc>, expiration: NaiveDate) -> bool {
        match self {
            ExpiryFilter::All => true,
            ExpiryFilter::WithinDays(days) => days_to_expiry(now, expiration) <= *days,
        }
    }
}

impl fmt::Display for ExpiryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryFilter::All => write!(f, "all"),
            ExpiryFilter::WithinDays(d) => write!(f, "{}d", d),
        }
    }
}

/// Canonical cache key for a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    symbols: Vec<String>,
    volume_threshold: u64,
    expiry_filter: ExpiryFilter,
}

impl ScanRequest {
    /// Validate and normalize a request. Fails on an empty symbol set or a
    /// malformed ticker.
    pub fn new<I, S>(symbols: I, volume_threshold: u64) -> ScannerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for raw in symbols {
            let symbol = raw.as_ref().trim().to_ascii_uppercase();
            if symbol.is_empty() {
                continue;
            }
            validate_ticker(&symbol)?;
            normalized.push(symbol);
        }

        normalized.sort();
        normalized.dedup();

        if normalized.is_empty() {
            return Err(ScannerError::invalid_input("at least one symbol is required"));
        }

        Ok(Self {
            symbols: normalized,
            volume_threshold,
            expiry_filter: ExpiryFilter::All,
        })
    }

    /// Parse a comma-separated symbol list and a textual threshold
    pub fn parse(symbols_csv: &str, volume_threshold: &str) -> ScannerResult<Self> {
        let threshold = parse_threshold(volume_threshold)?;
        Self::new(symbols_csv.split(','), threshold)
    }

    pub fn with_expiry_filter(mut self, filter: ExpiryFilter) -> Self {
        self.expiry_filter = filter;
        self
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn volume_threshold(&self) -> u64 {
        self.volume_threshold
    }

    pub fn expiry_filter(&self) -> ExpiryFilter {
        self.expiry_filter
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(format!(
            "{}|{}|{}",
            self.symbols.join(","),
            self.volume_threshold,
            self.expiry_filter
        ))
    }
}

/// Threshold from user text: a non-negative integer
pub fn parse_threshold(text: &str) -> ScannerResult<u64> {
    let text = text.trim();
    let value: i64 = text
        .parse()
        .map_err(|_| ScannerError::invalid_input(format!("volume threshold '{}' is not an integer", text)))?;
    if value < 0 {
        return Err(ScannerError::invalid_input(format!(
            "volume threshold must be non-negative, got {}",
            value
        )));
    }
    Ok(value as u64)
}

fn validate_ticker(symbol: &str) -> ScannerResult<()> {
    let well_formed = symbol.len() <= MAX_TICKER_LEN
        && symbol
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '^')
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'));

    if well_formed {
        Ok(())
    } else {
        Err(ScannerError::invalid_input(format!("malformed ticker '{}'", symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_symbols_normalized() {
        let req = ScanRequest::new([" tsla", "AAPL", "aapl", "", "brk-b"], 100).unwrap();
        assert_eq!(req.symbols(), &["AAPL", "BRK-B", "TSLA"]);
        assert_eq!(req.volume_threshold(), 100);
        assert_eq!(req.expiry_filter(), ExpiryFilter::All);
    }

    #[test]
    fn test_fingerprint_ignores_order_and_case() {
        let a = ScanRequest::new(["TSLA", "AAPL"], 100).unwrap();
        let b = ScanRequest::new(["aapl", "tsla", "AAPL"], 100).unwrap();
        let c = ScanRequest::new(["AAPL", "TSLA"], 50).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().as_str(), "AAPL,TSLA|100|all");

        let d = a.clone().with_expiry_filter(ExpiryFilter::WithinDays(30));
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_invalid_requests() {
        assert!(matches!(
            ScanRequest::new(Vec::<String>::new(), 100),
            Err(ScannerError::InvalidInput(_))
        ));
        assert!(ScanRequest::new([" ", ""], 100).is_err());
        assert!(ScanRequest::new(["AAPL", "BAD TICKER"], 100).is_err());
        assert!(ScanRequest::new(["$$$"], 100).is_err());
        assert!(ScanRequest::new(["ABCDEFGHIJKLMN"], 100).is_err());
    }

    #[test]
    fn test_parse() {
        let req = ScanRequest::parse("aapl, nvda,,TSLA", " 50 ").unwrap();
        assert_eq!(req.symbols(), &["AAPL", "NVDA", "TSLA"]);
        assert_eq!(req.volume_threshold(), 50);

        assert!(matches!(
            ScanRequest::parse("AAPL", "-5"),
            Err(ScannerError::InvalidInput(_))
        ));
        assert!(ScanRequest::parse("AAPL", "lots").is_err());
        assert!(ScanRequest::parse(" , ", "10").is_err());
    }

    #[test]
    fn test_expiry_filter() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let near = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let far = NaiveDate::from_ymd_opt(2026, 9, 18).unwrap();

        assert!(ExpiryFilter::All.allows(now, far));
        assert!(ExpiryFilter::WithinDays(30).allows(now, near));
        assert!(!ExpiryFilter::WithinDays(30).allows(now, far));
    }
}
