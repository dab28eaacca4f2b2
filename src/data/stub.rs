//! In-memory data source
//!
//! Serves scripted chains, failures and delays. Used by the test suites and
//! for offline runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::source::{OptionsDataSource, SourceChain};
use crate::core::{ScannerError, ScannerResult};

#[derive(Debug, Clone, Default)]
struct StubSymbol {
    spot: Option<f64>,
    chains: Vec<SourceChain>,
    failure: Option<ScannerError>,
    chain_failures: HashMap<NaiveDate, ScannerError>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct StubSource {
    symbols: HashMap<String, StubSymbol>,
    spot_requests: AtomicUsize,
    chain_requests: AtomicUsize,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Symbol with a spot price and the given chains
    pub fn with_symbol(mut self, symbol: &str, spot: f64, chains: Vec<SourceChain>) -> Self {
        let entry = self.symbols.entry(symbol.to_string()).or_default();
        entry.spot = Some(spot);
        entry.chains = chains;
        self
    }

    /// Symbol with chains but no resolvable spot price
    pub fn with_chains_no_spot(mut self, symbol: &str, chains: Vec<SourceChain>) -> Self {
        let entry = self.symbols.entry(symbol.to_string()).or_default();
        entry.spot = None;
        entry.chains = chains;
        self
    }

    /// Every request for this symbol fails with `error`
    pub fn with_failure(mut self, symbol: &str, error: ScannerError) -> Self {
        self.symbols.entry(symbol.to_string()).or_default().failure = Some(error);
        self
    }

    /// Only the chain for `expiration` fails
    pub fn with_chain_failure(mut self, symbol: &str, expiration: NaiveDate, error: ScannerError) -> Self {
        self.symbols
            .entry(symbol.to_string())
            .or_default()
            .chain_failures
            .insert(expiration, error);
        self
    }

    /// Every request for this symbol sleeps first
    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.symbols.entry(symbol.to_string()).or_default().delay = Some(delay);
        self
    }

    /// Number of symbol fetches started (spot lookups)
    pub fn fetch_count(&self) -> usize {
        self.spot_requests.load(Ordering::SeqCst)
    }

    /// Number of chain requests served
    pub fn chain_request_count(&self) -> usize {
        self.chain_requests.load(Ordering::SeqCst)
    }

    async fn lookup(&self, symbol: &str) -> ScannerResult<&StubSymbol> {
        let entry = self
            .symbols
            .get(symbol)
            .ok_or_else(|| ScannerError::data_unavailable(symbol, "no options market"))?;
        if let Some(delay) = entry.delay {
            tokio::time::sleep(delay).await;
        }
        match &entry.failure {
            Some(e) => Err(e.clone()),
            None => Ok(entry),
        }
    }
}

#[async_trait]
impl OptionsDataSource for StubSource {
    fn name(&self) -> &str {
        "stub"
    }

    async fn spot_price(&self, symbol: &str) -> ScannerResult<Option<f64>> {
        self.spot_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup(symbol).await?.spot)
    }

    async fn expirations(&self, symbol: &str) -> ScannerResult<Vec<NaiveDate>> {
        let entry = self.lookup(symbol).await?;
        Ok(entry.chains.iter().map(|c| c.expiration).collect())
    }

    async fn chain(&self, symbol: &str, expiration: NaiveDate) -> ScannerResult<SourceChain> {
        self.chain_requests.fetch_add(1, Ordering::SeqCst);
        let entry = self.lookup(symbol).await?;
        if let Some(e) = entry.chain_failures.get(&expiration) {
            return Err(e.clone());
        }
        entry
            .chains
            .iter()
            .find(|c| c.expiration == expiration)
            .cloned()
            .ok_or_else(|| ScannerError::upstream(format!("{} has no chain for {}", symbol, expiration)))
    }
}
